use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_derive::Deserialize;

use crate::process::DEFAULT_GAME_EXECUTABLE;

pub const DEFAULT_CONFIG_FILE: &str = "launcher.toml";

fn default_game_executable() -> PathBuf {
    PathBuf::from(DEFAULT_GAME_EXECUTABLE)
}

fn default_staging_file() -> PathBuf {
    PathBuf::from("game-update.zip")
}

fn default_version_file() -> PathBuf {
    PathBuf::from("version")
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Contents of `launcher.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LauncherConfig {
    /// Base URL serving `/version` and `/changelog`.
    pub api_url: String,
    pub download_url: String,
    pub install_dir: Option<PathBuf>,
    #[serde(default = "default_game_executable")]
    pub game_executable: PathBuf,
    #[serde(default = "default_staging_file")]
    pub staging_file: PathBuf,
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LauncherConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        anyhow::ensure!(!config.api_url.trim().is_empty(), "api_url is empty");
        anyhow::ensure!(
            !config.download_url.trim().is_empty(),
            "download_url is empty"
        );
        Ok(config)
    }

    /// The configured install directory, or `launcher_dir` when unset.
    /// Relative install directories are taken relative to `launcher_dir`.
    pub fn install_dir(&self, launcher_dir: &Path) -> PathBuf {
        match &self.install_dir {
            Some(dir) => launcher_dir.join(dir),
            None => launcher_dir.to_path_buf(),
        }
    }

    pub fn resolve(&self, launcher_dir: &Path) -> ResolvedPaths {
        let install_dir = self.install_dir(launcher_dir);
        ResolvedPaths {
            game_executable: install_dir.join(&self.game_executable),
            staging_file: install_dir.join(&self.staging_file),
            version_file: install_dir.join(&self.version_file),
            install_dir,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Absolute locations derived from a [`LauncherConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub install_dir: PathBuf,
    pub game_executable: PathBuf,
    pub staging_file: PathBuf,
    pub version_file: PathBuf,
}
