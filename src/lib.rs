//! Game launcher core: checks a release endpoint for a new build, streams and
//! applies the update package, records the installed version, and starts the
//! game. Front ends observe progress through [`observable::Presentation`].

pub mod config;
pub mod download;
pub mod install;
pub mod logging;
pub mod metadata;
pub mod observable;
pub mod process;
pub mod update;
pub mod version;

/// `User-Agent` sent with every request.
pub(crate) const CLIENT_NAME: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub use download::{FetchError, HttpPackageSource, PackageFetcher, PackageSource, PackageStream};
pub use install::{InstallError, Installer};
pub use metadata::{HttpMetadataClient, MetadataSource};
pub use observable::{Observable, Presentation};
pub use process::{DetachedProcess, GameLauncher};
pub use update::{Launcher, LauncherState, RunReport, UpdateOutcome};
pub use version::{VersionStore, VersionString};
