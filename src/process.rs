use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::info;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        use std::os::windows::process::CommandExt;

        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

        pub const DEFAULT_GAME_EXECUTABLE: &str = "Intersect Client.exe";
    } else {
        use std::os::unix::process::CommandExt;

        pub const DEFAULT_GAME_EXECUTABLE: &str = "Intersect Client";
    }
}

/// Starts the game once the update decision is made.
pub trait GameLauncher: Send + Sync {
    fn launch(&self) -> io::Result<()>;
}

impl<T: GameLauncher + ?Sized> GameLauncher for Box<T> {
    fn launch(&self) -> io::Result<()> {
        (**self).launch()
    }
}

/// Spawns the game as an independent process and forgets about it.
#[derive(Debug, Clone)]
pub struct DetachedProcess {
    executable: PathBuf,
    working_dir: PathBuf,
}

impl DetachedProcess {
    pub fn new(executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl GameLauncher for DetachedProcess {
    fn launch(&self) -> io::Result<()> {
        let mut command = Command::new(&self.executable);
        command
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
            } else {
                command.process_group(0);
            }
        }

        let child = command.spawn()?;
        info!(
            "Started {} (pid {})",
            self.executable.display(),
            child.id()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_reports_error() {
        let temp = tempfile::tempdir().unwrap();
        let game = DetachedProcess::new(temp.path().join("no-such-game"), temp.path());

        assert!(game.launch().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn launches_executable_in_working_dir() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("game.sh");
        std::fs::write(&script, "#!/bin/sh\ntouch started\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        DetachedProcess::new(&script, temp.path()).launch().unwrap();

        let marker = temp.path().join("started");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists());
    }
}
