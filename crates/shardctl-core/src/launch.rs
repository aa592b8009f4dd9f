//! Spawn argument contract for role binaries.
//!
//! Gates and games receive `-gid=<id> -log <level>`, plus `-restore`
//! when rejoining a frozen world; the dispatcher takes no arguments.
//! Spawned processes are fire-and-forget: the controller records the
//! pid and drops the handle, re-finding the process by classification
//! later.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Flag appended when a game resumes from persisted state.
pub const RESTORE_FLAG: &str = "-restore";

/// Errors from spawning a role binary.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The OS refused to spawn the process.
    #[error("cannot spawn {}: {source}", exe.display())]
    Spawn {
        /// Binary that failed to start.
        exe: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Everything needed to start one role process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Binary to execute.
    pub exe: PathBuf,
    /// Instance id; `None` for the dispatcher, which takes no args.
    pub gid: Option<u32>,
    /// Log level forwarded to the child.
    pub log_level: String,
    /// Resume from persisted state.
    pub restore: bool,
    /// Detach the child into its own session with I/O discarded.
    pub detached: bool,
}

impl LaunchSpec {
    /// Arguments per the launch contract.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let Some(gid) = self.gid else {
            return Vec::new();
        };
        let mut argv = vec![
            format!("-gid={gid}"),
            "-log".to_string(),
            self.log_level.clone(),
        ];
        if self.restore {
            argv.push(RESTORE_FLAG.to_string());
        }
        argv
    }

    /// Spawn the process and return its pid.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Spawn`] if the OS cannot start it.
    pub fn spawn(&self) -> Result<u32, LaunchError> {
        let argv = self.argv();
        debug!(exe = %self.exe.display(), args = ?argv, detached = self.detached, "spawning");

        let mut command = Command::new(&self.exe);
        command.args(&argv).stdin(Stdio::null());
        if self.detached {
            command.stdout(Stdio::null()).stderr(Stdio::null());
            // New session so the child survives the controller's
            // terminal going away.
            unsafe {
                use std::os::unix::process::CommandExt;
                command.pre_exec(|| {
                    nix::unistd::setsid().map(drop).map_err(std::io::Error::from)
                });
            }
        }

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            exe: self.exe.clone(),
            source,
        })?;
        Ok(child.id())
    }
}
