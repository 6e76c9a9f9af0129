use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{error, info};

use rustlaunch::config::{LauncherConfig, DEFAULT_CONFIG_FILE};
use rustlaunch::logging::init_logging;
use rustlaunch::process::DEFAULT_GAME_EXECUTABLE;
use rustlaunch::{
    DetachedProcess, GameLauncher, HttpMetadataClient, HttpPackageSource, Installer, Launcher,
    Presentation, UpdateOutcome, VersionStore,
};

#[derive(Parser, Debug)]
#[command(version, about = "Keeps the game client up to date, then starts it")]
struct Args {
    /// Launcher configuration, relative to the launcher's directory
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log debug output to the terminal
    #[arg(long)]
    verbose: bool,

    /// Run the update check but do not start the game
    #[arg(long)]
    no_launch: bool,
}

struct SkipLaunch;

impl GameLauncher for SkipLaunch {
    fn launch(&self) -> std::io::Result<()> {
        info!("Not starting the game (--no-launch)");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let launcher_dir = launcher_dir()?;
    let config_path = launcher_dir.join(&args.config);

    let config = match LauncherConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            init_logging(&launcher_dir, args.verbose);
            error!("{err:#}");
            start_without_update(
                &launcher_dir.join(DEFAULT_GAME_EXECUTABLE),
                &launcher_dir,
                args.no_launch,
            );
            return Ok(());
        }
    };

    let paths = config.resolve(&launcher_dir);
    if let Err(err) = std::fs::create_dir_all(&paths.install_dir) {
        init_logging(&launcher_dir, args.verbose);
        error!(
            "Failed to create install directory {}: {err}",
            paths.install_dir.display()
        );
        start_without_update(&paths.game_executable, &paths.install_dir, args.no_launch);
        return Ok(());
    }
    init_logging(&paths.install_dir, args.verbose);
    info!("Using configuration {}", config_path.display());

    let clients = HttpMetadataClient::new(&config.api_url, config.request_timeout()).and_then(
        |metadata| {
            HttpPackageSource::new(&config.download_url, config.request_timeout())
                .map(|source| (metadata, source))
        },
    );
    let (metadata, source) = match clients {
        Ok(clients) => clients,
        Err(err) => {
            error!("Failed to set up HTTP client: {err}");
            start_without_update(&paths.game_executable, &paths.install_dir, args.no_launch);
            return Ok(());
        }
    };

    let presentation = Arc::new(Presentation::new());
    attach_console(&presentation);

    let store = VersionStore::new(&paths.version_file);
    let installer = Installer::new(&paths.install_dir, store.clone());

    let game: Box<dyn GameLauncher> = if args.no_launch {
        Box::new(SkipLaunch)
    } else {
        Box::new(DetachedProcess::new(
            &paths.game_executable,
            &paths.install_dir,
        ))
    };

    let report = Launcher::new(
        metadata,
        source,
        installer,
        store,
        &paths.staging_file,
        game,
        presentation,
    )
    .run()
    .await;

    match report.update {
        UpdateOutcome::Skipped => println!("> up to date"),
        UpdateOutcome::Installed => println!("{}", "> update installed".green()),
        UpdateOutcome::Failed => println!("{}", "> update failed, see launcher.log".red()),
    }
    info!("Launcher finished: {report:?}");
    Ok(())
}

/// Start whatever is installed, skipping the update check.
fn start_without_update(executable: &Path, working_dir: &Path, no_launch: bool) {
    println!("{}", "> update check unavailable, starting installed game".yellow());
    if no_launch {
        info!("Not starting the game (--no-launch)");
        return;
    }
    let game = DetachedProcess::new(executable, working_dir);
    if let Err(err) = game.launch() {
        error!("Failed to launch game: {err}");
    }
}

fn launcher_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("failed to locate launcher executable")?;
    Ok(exe
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf))
}

/// Print presentation signals the way a window would show them.
fn attach_console(presentation: &Presentation) {
    presentation.version.subscribe(|version| {
        println!("> latest version: {}", format!("v{version}").bold());
    });
    presentation.changelog.subscribe(|changelog| {
        println!("{}", "> changelog:".bold());
        for line in changelog.lines() {
            println!("  {}", line.dimmed());
        }
    });
    presentation.status.subscribe(|status| {
        if !status.is_empty() {
            println!("> {}", status.cyan());
        }
    });
}
