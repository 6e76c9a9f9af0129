use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::USER_AGENT;
use thiserror::Error;

use crate::version::VersionString;

/// Where the launcher learns about the latest release.
///
/// Both calls fail soft: any failure is logged and reported as `None`.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_version(&self) -> Option<VersionString>;
    async fn fetch_changelog(&self) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Plain-text metadata endpoints under one base URL: `<base>/version` and
/// `<base>/changelog`.
#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url)
    }

    async fn get_text(&self, name: &str) -> Result<String, MetadataError> {
        let url = self.endpoint(name);
        debug!("GET {url}");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, crate::CLIENT_NAME)
            .send()
            .await
            .map_err(|source| MetadataError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status { url, status });
        }

        response
            .text()
            .await
            .map_err(|source| MetadataError::Body { url, source })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataClient {
    async fn fetch_version(&self) -> Option<VersionString> {
        match self.get_text("version").await {
            Ok(body) => {
                let version = VersionString::parse(&body);
                if version.is_none() {
                    warn!("Version endpoint returned an empty body");
                }
                version
            }
            Err(error) => {
                warn!("Failed to fetch latest version: {error}");
                None
            }
        }
    }

    async fn fetch_changelog(&self) -> Option<String> {
        self.get_text("changelog")
            .await
            .map_err(|error| warn!("Failed to fetch changelog: {error}"))
            .ok()
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{dead_url, direct_client, serve};
    use super::*;

    fn client(base: &str) -> HttpMetadataClient {
        HttpMetadataClient::with_client(direct_client(), base)
    }

    #[tokio::test]
    async fn fetches_trimmed_version_and_verbatim_changelog() {
        let base = serve(vec![
            ("/api/version", 200, b"2.3.1\n".to_vec()),
            ("/api/changelog", 200, b"- fixed crash\n".to_vec()),
        ])
        .await;
        let client = client(&format!("{base}/api/"));

        assert_eq!(
            client.fetch_version().await,
            VersionString::parse("2.3.1")
        );
        assert_eq!(
            client.fetch_changelog().await.as_deref(),
            Some("- fixed crash\n")
        );
    }

    #[tokio::test]
    async fn error_status_is_unknown() {
        let base = serve(vec![("/version", 500, b"oops".to_vec())]).await;
        let client = client(&base);

        assert_eq!(client.fetch_version().await, None);
        assert_eq!(client.fetch_changelog().await, None);
    }

    #[tokio::test]
    async fn blank_version_body_is_unknown() {
        let base = serve(vec![("/version", 200, b"  \n".to_vec())]).await;

        assert_eq!(client(&base).fetch_version().await, None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unknown() {
        let client = client(&dead_url().await);

        assert_eq!(client.fetch_version().await, None);
        assert_eq!(client.fetch_changelog().await, None);
    }
}
