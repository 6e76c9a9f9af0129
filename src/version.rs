use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

/// Opaque release identifier. Only ever compared for equality.
///
/// Always trimmed and non-empty; a missing or blank version is represented by
/// `None` wherever a `VersionString` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionString(String);

impl VersionString {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the installed build matches the latest published one.
///
/// An unknown version on either side never matches, not even another unknown.
pub fn is_up_to_date(installed: Option<&VersionString>, latest: Option<&VersionString>) -> bool {
    matches!((installed, latest), (Some(installed), Some(latest)) if installed == latest)
}

/// Single-line record of the last successfully installed version.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the installed version. Absence, blank content, and I/O errors all
    /// read as unknown.
    pub async fn read_installed(&self) -> Option<VersionString> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!("No version record at {}", self.path.display());
                return None;
            }
            Err(error) => {
                warn!(
                    "Failed to read version record {}: {error}",
                    self.path.display()
                );
                return None;
            }
        };

        let version = VersionString::parse(&contents);
        if version.is_none() {
            warn!("Version record {} is empty", self.path.display());
        }
        version
    }

    /// Replace the record with `version`.
    ///
    /// The new content is written beside the record and renamed over it, so a
    /// reader sees either the old line or the new one.
    pub async fn write_installed(&self, version: &VersionString) -> io::Result<()> {
        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, version.as_str()).await?;

        if let Err(error) = tokio::fs::rename(&tmp_path, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                debug!(
                    "Failed to remove {} after rename error: {cleanup}",
                    tmp_path.display()
                );
            }
            return Err(error);
        }

        info!("Recorded installed version {version}");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "version".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
