use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};

use crate::download::{PackageFetcher, PackageSource};
use crate::install::Installer;
use crate::metadata::MetadataSource;
use crate::observable::{Presentation, DEFAULT_VERSION_TEXT};
use crate::process::GameLauncher;
use crate::version::{is_up_to_date, VersionStore, VersionString};

/// Shown when the changelog could not be fetched.
pub const CHANGELOG_FALLBACK: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    Init,
    FetchingMetadata,
    UpToDate,
    NeedsUpdate,
    Updating,
    Failed,
    Launching,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Installed and remote versions matched.
    Skipped,
    Installed,
    /// The attempt failed; the existing installation is launched as is.
    Failed,
}

/// What a launcher run did, returned once the game has been started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub installed_before: Option<VersionString>,
    pub latest: Option<VersionString>,
    pub update: UpdateOutcome,
    pub launched: bool,
}

/// Checks for a new game build, applies it, and starts the game.
pub struct Launcher<M, P, G> {
    metadata: M,
    fetcher: PackageFetcher<P>,
    installer: Installer,
    store: VersionStore,
    staging_file: PathBuf,
    game: G,
    presentation: Arc<Presentation>,
}

impl<M, P, G> Launcher<M, P, G>
where
    M: MetadataSource,
    P: PackageSource,
    G: GameLauncher,
{
    pub fn new(
        metadata: M,
        source: P,
        installer: Installer,
        store: VersionStore,
        staging_file: impl Into<PathBuf>,
        game: G,
        presentation: Arc<Presentation>,
    ) -> Self {
        Self {
            metadata,
            fetcher: PackageFetcher::new(source),
            installer,
            store,
            staging_file: staging_file.into(),
            game,
            presentation,
        }
    }

    pub fn presentation(&self) -> &Arc<Presentation> {
        &self.presentation
    }

    /// Run one full update cycle and start the game.
    ///
    /// Every step is attempted exactly once. Nothing here fails the run: a
    /// failed update still launches whatever is installed.
    pub async fn run(&self) -> RunReport {
        self.enter(LauncherState::Init, "Checking installed version...");
        let installed_before = self.store.read_installed().await;
        match &installed_before {
            Some(version) => info!("Currently installed version: {version}"),
            None => info!("No installed version recorded"),
        }

        self.enter(LauncherState::FetchingMetadata, "Checking for updates...");
        let latest = self.fetch_metadata().await;

        let update = if is_up_to_date(installed_before.as_ref(), latest.as_ref()) {
            self.enter(LauncherState::UpToDate, "Up to date");
            UpdateOutcome::Skipped
        } else {
            self.enter(LauncherState::NeedsUpdate, "Update available");
            self.apply_update(latest.as_ref()).await
        };

        self.enter(LauncherState::Launching, "Launching...");
        let launched = match self.game.launch() {
            Ok(()) => true,
            Err(error) => {
                error!("Failed to launch game: {error}");
                false
            }
        };
        self.enter(LauncherState::Done, "");

        RunReport {
            installed_before,
            latest,
            update,
            launched,
        }
    }

    /// Fetch version and changelog together, publishing each as it arrives.
    async fn fetch_metadata(&self) -> Option<VersionString> {
        let version = async {
            let latest = self.metadata.fetch_version().await;
            let text = latest
                .as_ref()
                .map_or(DEFAULT_VERSION_TEXT, VersionString::as_str);
            self.presentation.version.set(text.to_string());
            latest
        };
        let changelog = async {
            let changelog = self
                .metadata
                .fetch_changelog()
                .await
                .unwrap_or_else(|| CHANGELOG_FALLBACK.to_string());
            self.presentation.changelog.set(changelog);
        };

        let (latest, ()) = tokio::join!(version, changelog);
        latest
    }

    async fn apply_update(&self, latest: Option<&VersionString>) -> UpdateOutcome {
        self.enter(LauncherState::Updating, "Downloading... (0%)");
        self.presentation.download_progress.set(0.0);

        let presentation = Arc::clone(&self.presentation);
        let progress = move |downloaded: u64, total: Option<u64>| {
            let Some(percent) = percent(downloaded, total) else {
                return;
            };
            if percent != presentation.download_progress.get() {
                presentation.download_progress.set(percent);
                presentation
                    .status
                    .set(format!("Downloading... ({percent}%)"));
            }
        };

        if let Err(error) = self.fetcher.fetch(&self.staging_file, &progress).await {
            error!("Failed to download update package: {error}");
            self.discard_staging().await;
            self.enter(LauncherState::Failed, "Update failed");
            return UpdateOutcome::Failed;
        }

        self.presentation.status.set("Installing...".to_string());
        match self.installer.install(&self.staging_file, latest, true).await {
            Ok(()) => {
                self.presentation.download_progress.set(100.0);
                match latest {
                    Some(version) => info!("Successfully installed version {version}"),
                    None => info!("Successfully installed latest game files"),
                }
                UpdateOutcome::Installed
            }
            Err(error) => {
                error!("Failed to install update package: {error}");
                self.enter(LauncherState::Failed, "Update failed");
                UpdateOutcome::Failed
            }
        }
    }

    async fn discard_staging(&self) {
        match tokio::fs::remove_file(&self.staging_file).await {
            Ok(()) => info!(
                "Discarded partial download {}",
                self.staging_file.display()
            ),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                "Failed to discard partial download {}: {error}",
                self.staging_file.display()
            ),
        }
    }

    fn enter(&self, state: LauncherState, status: &str) {
        info!("Launcher state: {state:?}");
        self.presentation.state.set(state);
        self.presentation.status.set(status.to_string());
    }
}

fn percent(downloaded: u64, total: Option<u64>) -> Option<f32> {
    let total = total.filter(|total| *total > 0)?;
    let ratio = downloaded as f64 * 100.0 / total as f64;
    Some(ratio.clamp(0.0, 100.0).floor() as f32)
}

#[cfg(test)]
mod tests {
    use super::percent;

    #[test]
    fn percent_needs_a_known_length() {
        assert_eq!(percent(10, None), None);
        assert_eq!(percent(10, Some(0)), None);
    }

    #[test]
    fn percent_is_clamped_and_floored() {
        assert_eq!(percent(0, Some(200)), Some(0.0));
        assert_eq!(percent(199, Some(200)), Some(99.0));
        assert_eq!(percent(200, Some(200)), Some(100.0));
        assert_eq!(percent(500, Some(200)), Some(100.0));
    }
}
