use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::header::USER_AGENT;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Upper bound for a single read from the package stream.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Called after every written chunk with `(downloaded, total)`. `total` is
/// only known when the server announced a length.
pub type ProgressCallback = dyn Fn(u64, Option<u64>) + Send + Sync;

/// An opened package download.
pub struct PackageStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub total: Option<u64>,
}

/// Where update packages come from.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Open the package stream, or `None` if it cannot be opened (logged).
    async fn open(&self) -> Option<PackageStream>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("package stream could not be opened")]
    Unavailable,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("package stream was empty")]
    Empty,
}

impl FetchError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Package source backed by a single HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpPackageSource {
    client: reqwest::Client,
    url: String,
}

impl HttpPackageSource {
    /// `connect_timeout` bounds connection setup only; the body may take as
    /// long as it needs.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl PackageSource for HttpPackageSource {
    async fn open(&self) -> Option<PackageStream> {
        let response = match self
            .client
            .get(&self.url)
            .header(USER_AGENT, crate::CLIENT_NAME)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!("Download request to {} failed: {error}", self.url);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Download from {} failed with status {}",
                self.url,
                response.status()
            );
            return None;
        }

        let total = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Some(PackageStream {
            reader: Box::new(StreamReader::new(stream)),
            total,
        })
    }
}

/// Streams packages from a [`PackageSource`] into a local file.
pub struct PackageFetcher<S> {
    source: S,
}

impl<S: PackageSource> PackageFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Download the package into `dest`, returning the number of bytes written.
    ///
    /// Nothing is created when the stream cannot be opened. On a read or write
    /// error `dest` keeps whatever was written so far; an empty stream leaves
    /// an empty `dest`.
    pub async fn fetch(&self, dest: &Path, progress: &ProgressCallback) -> Result<u64, FetchError> {
        let Some(PackageStream { mut reader, total }) = self.source.open().await else {
            return Err(FetchError::Unavailable);
        };

        match total {
            Some(total) => info!("Downloading {total} bytes to {}", dest.display()),
            None => info!("Downloading package of unknown size to {}", dest.display()),
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| FetchError::io("failed to create staging file", error))?;

        let copied = copy_chunks(&mut reader, &mut file, total, progress).await;
        // Hand over whatever was written, even when the copy failed midway.
        let flushed = file.flush().await;
        let downloaded = copied?;
        flushed.map_err(|error| FetchError::io("failed to flush staging file", error))?;

        if downloaded == 0 {
            return Err(FetchError::Empty);
        }

        info!("Download complete: {downloaded} bytes");
        Ok(downloaded)
    }
}

async fn copy_chunks(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    file: &mut tokio::fs::File,
    total: Option<u64>,
    progress: &ProgressCallback,
) -> Result<u64, FetchError> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;
    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .map_err(|error| FetchError::io("failed to read package stream", error))?;
        if read == 0 {
            return Ok(downloaded);
        }

        file.write_all(&chunk[..read])
            .await
            .map_err(|error| FetchError::io("failed to write staging file", error))?;

        downloaded += read as u64;
        debug!("Downloaded {downloaded} bytes");
        progress(downloaded, total);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;
    use crate::metadata::test_server::{dead_url, direct_client, serve};

    struct BytesSource {
        bytes: Option<Vec<u8>>,
        announce_length: bool,
    }

    #[async_trait]
    impl PackageSource for BytesSource {
        async fn open(&self) -> Option<PackageStream> {
            let bytes = self.bytes.clone()?;
            let total = self.announce_length.then_some(bytes.len() as u64);
            Some(PackageStream {
                reader: Box::new(Cursor::new(bytes)),
                total,
            })
        }
    }

    /// Yields its prefix, then fails.
    struct BrokenReader {
        prefix: Cursor<Vec<u8>>,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if (self.prefix.position() as usize) < self.prefix.get_ref().len() {
                return Pin::new(&mut self.prefix).poll_read(cx, buf);
            }
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl PackageSource for BrokenSource {
        async fn open(&self) -> Option<PackageStream> {
            Some(PackageStream {
                reader: Box::new(BrokenReader {
                    prefix: Cursor::new(b"partial".to_vec()),
                }),
                total: None,
            })
        }
    }

    fn no_progress() -> Box<ProgressCallback> {
        Box::new(|_, _| {})
    }

    #[tokio::test]
    async fn writes_whole_stream_and_reports_progress() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("staged.zip");
        let payload = vec![7u8; 4096];
        let fetcher = PackageFetcher::new(BytesSource {
            bytes: Some(payload.clone()),
            announce_length: true,
        });

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let progress = move |done: u64, total: Option<u64>| sink.lock().unwrap().push((done, total));

        let written = fetcher.fetch(&dest, &progress).await.unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
        let reports = reports.lock().unwrap();
        assert_eq!(reports.last(), Some(&(4096, Some(4096))));
    }

    #[tokio::test]
    async fn truncates_stale_staging_file() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("staged.zip");
        std::fs::write(&dest, vec![1u8; 10_000]).unwrap();
        let fetcher = PackageFetcher::new(BytesSource {
            bytes: Some(b"new".to_vec()),
            announce_length: false,
        });

        fetcher.fetch(&dest, &*no_progress()).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn unavailable_stream_creates_no_file() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("staged.zip");
        let fetcher = PackageFetcher::new(BytesSource {
            bytes: None,
            announce_length: false,
        });

        let result = fetcher.fetch(&dest, &*no_progress()).await;

        assert!(matches!(result, Err(FetchError::Unavailable)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn empty_stream_fails_and_leaves_empty_file() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("staged.zip");
        let fetcher = PackageFetcher::new(BytesSource {
            bytes: Some(Vec::new()),
            announce_length: true,
        });

        let result = fetcher.fetch(&dest, &*no_progress()).await;

        assert!(matches!(result, Err(FetchError::Empty)));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn read_error_keeps_partial_file() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("staged.zip");
        let fetcher = PackageFetcher::new(BrokenSource);

        let result = fetcher.fetch(&dest, &*no_progress()).await;

        assert!(matches!(result, Err(FetchError::Io { .. })));
        assert_eq!(std::fs::read(&dest).unwrap(), b"partial");
    }

    #[tokio::test]
    async fn http_source_streams_body_with_length() {
        let base = serve(vec![("/game.zip", 200, b"zip-bytes".to_vec())]).await;
        let source = HttpPackageSource::with_client(direct_client(), &format!("{base}/game.zip"));

        let mut stream = source.open().await.unwrap();
        let mut body = Vec::new();
        stream.reader.read_to_end(&mut body).await.unwrap();

        assert_eq!(stream.total, Some(9));
        assert_eq!(body, b"zip-bytes");
    }

    #[tokio::test]
    async fn http_source_unavailable_on_error_status_or_no_server() {
        let base = serve(Vec::new()).await;
        let missing = HttpPackageSource::with_client(direct_client(), &format!("{base}/game.zip"));
        assert!(missing.open().await.is_none());

        let dead = HttpPackageSource::with_client(direct_client(), &dead_url().await);
        assert!(dead.open().await.is_none());
    }
}
