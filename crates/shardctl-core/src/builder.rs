//! Delegated builds of component binaries.
//!
//! Builds are not performed in-process: the configured build command
//! runs inside the target's directory and its exit status decides the
//! outcome.

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::info;

use crate::layout::{LayoutError, ProjectLayout};

/// Errors from a delegated build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The build command exited non-zero.
    #[error("build failed in {}: {status}", dir.display())]
    Failed {
        /// Directory the command ran in.
        dir: PathBuf,
        /// Exit status of the build command.
        status: std::process::ExitStatus,
    },

    /// The build command could not be started.
    #[error("cannot run build in {}: {source}", dir.display())]
    Io {
        /// Directory the command was to run in.
        dir: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configured build command is blank.
    #[error("build command is empty")]
    EmptyCommand,

    /// Resolving the target's directory failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    /// Both engine components, dispatcher then gate.
    Engine,
    /// The dispatcher component.
    Dispatcher,
    /// The gate component.
    Gate,
    /// One game by name, bare or `<dir>/<name>` qualified.
    Game(String),
}

impl BuildTarget {
    /// Map a build token onto a target. Anything that is not an engine
    /// keyword is a game name.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "engine" => Self::Engine,
            "dispatcher" => Self::Dispatcher,
            "gate" => Self::Gate,
            game => Self::Game(game.to_string()),
        }
    }
}

/// Seam between the controller and the actual build machinery.
pub trait BuildRunner {
    /// Build one target to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] describing what failed.
    fn build(&self, target: &BuildTarget) -> Result<(), BuildError>;
}

/// Runs the configured shell command in the target's directory.
#[derive(Debug)]
pub struct ShellBuilder<'a> {
    layout: &'a ProjectLayout,
    command: &'a str,
}

impl<'a> ShellBuilder<'a> {
    /// Builder over a verified layout with the configured command.
    #[must_use]
    pub fn new(layout: &'a ProjectLayout, command: &'a str) -> Self {
        Self { layout, command }
    }

    fn run_in(&self, dir: PathBuf) -> Result<(), BuildError> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(BuildError::EmptyCommand);
        };
        info!(dir = %dir.display(), command = self.command, "building");

        let status = Command::new(program)
            .args(parts)
            .current_dir(&dir)
            .status()
            .map_err(|source| BuildError::Io {
                dir: dir.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(BuildError::Failed { dir, status })
        }
    }
}

impl BuildRunner for ShellBuilder<'_> {
    fn build(&self, target: &BuildTarget) -> Result<(), BuildError> {
        match target {
            BuildTarget::Engine => {
                self.run_in(self.layout.component_dir("dispatcher"))?;
                self.run_in(self.layout.component_dir("gate"))
            }
            BuildTarget::Dispatcher => self.run_in(self.layout.component_dir("dispatcher")),
            BuildTarget::Gate => self.run_in(self.layout.component_dir("gate")),
            BuildTarget::Game(name) => {
                let qualified = self.layout.find_game(name)?;
                self.run_in(self.layout.game_dir(&qualified))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::layout::PROJECT_MARKER;

    use super::*;

    fn project() -> (TempDir, ProjectLayout) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(PROJECT_MARKER);
        for component in ["dispatcher", "gate"] {
            fs::create_dir_all(root.join("components").join(component)).unwrap();
        }
        fs::create_dir_all(root.join("mygame").join("mygame")).unwrap();
        let layout = ProjectLayout::at(root).unwrap();
        (tmp, layout)
    }

    #[test]
    fn target_parsing() {
        assert_eq!(BuildTarget::parse("engine"), BuildTarget::Engine);
        assert_eq!(BuildTarget::parse("gate"), BuildTarget::Gate);
        assert_eq!(
            BuildTarget::parse("mygame"),
            BuildTarget::Game("mygame".to_string())
        );
    }

    #[test]
    fn successful_build_runs_in_the_component_dir() {
        let (_tmp, layout) = project();
        // `test -d .` exits zero in any directory that exists.
        let builder = ShellBuilder::new(&layout, "test -d .");
        builder.build(&BuildTarget::Dispatcher).unwrap();
        builder.build(&BuildTarget::Game("mygame".to_string())).unwrap();
    }

    #[test]
    fn failing_command_reports_the_directory() {
        let (_tmp, layout) = project();
        let builder = ShellBuilder::new(&layout, "false");
        let err = builder.build(&BuildTarget::Gate).unwrap_err();
        assert!(matches!(err, BuildError::Failed { dir, .. } if dir.ends_with("components/gate")));
    }

    #[test]
    fn unknown_game_is_a_layout_error() {
        let (_tmp, layout) = project();
        let builder = ShellBuilder::new(&layout, "true");
        let err = builder.build(&BuildTarget::Game("missing".to_string())).unwrap_err();
        assert!(matches!(err, BuildError::Layout(LayoutError::GameNotFound { .. })));
    }

    #[test]
    fn empty_command_is_rejected() {
        let (_tmp, layout) = project();
        let builder = ShellBuilder::new(&layout, "   ");
        assert!(matches!(
            builder.build(&BuildTarget::Dispatcher).unwrap_err(),
            BuildError::EmptyCommand
        ));
    }
}
