use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::version::{VersionStore, VersionString};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Archive {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("extraction task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
    #[error("files extracted but the new version is unknown, not recording it")]
    UnknownVersion,
    #[error("files extracted but recording version {version} failed: {source}")]
    Commit {
        version: VersionString,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    fn archive(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Archive { context, source }
    }
}

/// Applies staged packages to an installation directory.
#[derive(Debug, Clone)]
pub struct Installer {
    install_dir: PathBuf,
    store: VersionStore,
}

impl Installer {
    pub fn new(install_dir: impl Into<PathBuf>, store: VersionStore) -> Self {
        Self {
            install_dir: install_dir.into(),
            store,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Extract `staged` over the installation directory, delete it, then
    /// optionally record `new_version`.
    ///
    /// Extraction is not rolled back on failure. A failed commit still leaves
    /// the extracted files in place, so the next run simply installs again.
    pub async fn install(
        &self,
        staged: &Path,
        new_version: Option<&VersionString>,
        commit_version: bool,
    ) -> Result<(), InstallError> {
        info!(
            "Extracting {} into {}",
            staged.display(),
            self.install_dir.display()
        );

        let archive = staged.to_path_buf();
        let dest = self.install_dir.clone();
        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
            .await
            .map_err(InstallError::Task)??;

        if let Err(error) = tokio::fs::remove_file(staged).await {
            warn!(
                "Failed to remove staged package {}: {error}",
                staged.display()
            );
        }

        if commit_version {
            let version = new_version.ok_or(InstallError::UnknownVersion)?;
            self.store
                .write_installed(version)
                .await
                .map_err(|source| InstallError::Commit {
                    version: version.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        InstallError::io_with_path("failed to open staged package", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::archive("failed to read package archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::archive("failed to read archive entry", error))?;
        let Some(name) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io_with_path("failed to create directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                InstallError::io_with_path("failed to create parent directory", parent, &error)
            })?;
        }
        remove_existing_file(&out_path).map_err(|error| {
            InstallError::io_with_path("failed to replace existing file", &out_path, &error)
        })?;
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            InstallError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            InstallError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                if let Err(error) =
                    std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                {
                    warn!(
                        "Failed to set mode {mode:o} on {}: {error}",
                        out_path.display()
                    );
                }
            }
        }
    }

    debug!("Extracted {} entries to {}", archive.len(), dest.display());
    Ok(())
}

/// Delete a previously installed file so a read-only copy cannot block the
/// overwrite. Directories are left alone.
fn remove_existing_file(path: &Path) -> std::io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    };
    if metadata.is_dir() {
        return Ok(());
    }

    #[cfg(windows)]
    {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            permissions.set_readonly(false);
            std::fs::set_permissions(path, permissions)?;
        }
    }

    std::fs::remove_file(path)
}
