//! Working-directory contract and on-disk binary resolution.
//!
//! Every operation runs from the project root, a directory whose base
//! name is the project marker. Engine binaries live under fixed
//! component paths; game binaries live one level down inside arbitrary
//! per-title directories.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::observe::ClusterSnapshot;

/// Project root directory base name, doubling as the exe-path marker
/// used by classification.
pub const PROJECT_MARKER: &str = "shardworld";

/// Top-level directories that can never hold a game.
pub const RESERVED_DIRS: [&str; 2] = ["components", "engine"];

/// Errors from layout discovery and binary resolution.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The working directory is not the project root.
    #[error("not a {PROJECT_MARKER} project root: {found}")]
    NotProjectRoot {
        /// The directory that failed the check.
        found: String,
    },

    /// A required engine binary has not been built.
    #[error("engine binary missing: {} (build it first)", path.display())]
    EngineBinaryMissing {
        /// Expected binary path.
        path: PathBuf,
    },

    /// No top-level directory holds the named game.
    #[error("game not found: {name}")]
    GameNotFound {
        /// The requested game name.
        name: String,
    },

    /// The game directory exists but the binary inside it does not.
    #[error("game binary missing for {name}: {} (build it first)", path.display())]
    GameBinaryMissing {
        /// The requested game name.
        name: String,
        /// Expected binary path.
        path: PathBuf,
    },

    /// No running game process to infer the current game from.
    #[error("no running game to infer the current game from")]
    NoCurrentGame,

    /// Running game processes disagree on their binary.
    #[error("running games use different binaries: {first} vs {second}")]
    MixedGameBinaries {
        /// First observed binary path.
        first: String,
        /// A conflicting binary path.
        second: String,
    },

    /// A running game binary resolves outside the project root.
    #[error("running game binary is outside the project root: {}", exe.display())]
    GameOutsideRoot {
        /// The offending executable path.
        exe: PathBuf,
    },

    /// Filesystem inspection failed.
    #[error("cannot inspect {}: {source}", path.display())]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A verified project root and the path conventions under it.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Verify the current working directory as the project root.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NotProjectRoot`] if the directory's base
    /// name is not the project marker, or [`LayoutError::Io`] if the
    /// working directory cannot be resolved.
    pub fn discover() -> Result<Self, LayoutError> {
        let cwd = std::env::current_dir().map_err(|source| LayoutError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::at(cwd)
    }

    /// Verify an explicit directory as the project root.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NotProjectRoot`] if the directory's base
    /// name is not the project marker.
    pub fn at(root: PathBuf) -> Result<Self, LayoutError> {
        let base = root.file_name().and_then(|name| name.to_str());
        if base != Some(PROJECT_MARKER) {
            return Err(LayoutError::NotProjectRoot {
                found: root.display().to_string(),
            });
        }
        Ok(Self { root })
    }

    /// The verified project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fixed path of the dispatcher binary.
    #[must_use]
    pub fn dispatcher_exe(&self) -> PathBuf {
        self.root.join("components").join("dispatcher").join("dispatcher")
    }

    /// Fixed path of the gate binary.
    #[must_use]
    pub fn gate_exe(&self) -> PathBuf {
        self.root.join("components").join("gate").join("gate")
    }

    /// Directory of one engine component, for delegated builds.
    #[must_use]
    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.root.join("components").join(component)
    }

    /// Directory of one game, `<dir>/<name>` relative to the root.
    #[must_use]
    pub fn game_dir(&self, game: &str) -> PathBuf {
        self.root.join(game)
    }

    /// Check that the dispatcher and gate binaries exist on disk.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::EngineBinaryMissing`] naming the first
    /// absent binary.
    pub fn verify_engine_binaries(&self) -> Result<(), LayoutError> {
        for path in [self.dispatcher_exe(), self.gate_exe()] {
            if !path.is_file() {
                return Err(LayoutError::EngineBinaryMissing { path });
            }
        }
        Ok(())
    }

    /// Resolve a game name to its `<dir>/<name>` form.
    ///
    /// A name containing `/` is taken as already qualified and only
    /// checked for existence. A bare name is searched for across the
    /// non-reserved top-level directories in sorted order; the first
    /// directory holding a `<dir>/<name>` subdirectory wins.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::GameNotFound`] if no directory matches
    /// and [`LayoutError::Io`] if the root cannot be listed.
    pub fn find_game(&self, name: &str) -> Result<String, LayoutError> {
        if let Some((dir, base)) = name.rsplit_once('/') {
            if self.root.join(dir).join(base).is_dir() {
                return Ok(name.to_string());
            }
            return Err(LayoutError::GameNotFound {
                name: name.to_string(),
            });
        }

        let mut dirs = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|source| LayoutError::Io {
            path: self.root.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| LayoutError::Io {
                path: self.root.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(dir) = file_name.to_str() else {
                continue;
            };
            if RESERVED_DIRS.contains(&dir) || dir.starts_with('.') {
                continue;
            }
            if entry.path().is_dir() {
                dirs.push(dir.to_string());
            }
        }
        dirs.sort_unstable();

        for dir in &dirs {
            if self.root.join(dir).join(name).is_dir() {
                return Ok(format!("{dir}/{name}"));
            }
        }
        Err(LayoutError::GameNotFound {
            name: name.to_string(),
        })
    }

    /// Binary path for a qualified `<dir>/<name>` game: the binary is
    /// named after the game inside its own directory.
    #[must_use]
    pub fn game_exe(&self, qualified: &str) -> PathBuf {
        let base = qualified.rsplit('/').next().unwrap_or(qualified);
        self.root.join(qualified).join(base)
    }

    /// Check that a qualified game's binary exists on disk.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::GameBinaryMissing`] if it does not.
    pub fn verify_game_binary(&self, qualified: &str) -> Result<(), LayoutError> {
        let path = self.game_exe(qualified);
        if path.is_file() {
            Ok(())
        } else {
            Err(LayoutError::GameBinaryMissing {
                name: qualified.to_string(),
                path,
            })
        }
    }

    /// Infer the running game identity from a snapshot.
    ///
    /// All running game processes must share one binary; the identity
    /// is that binary's directory relative to the project root.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NoCurrentGame`] on an empty game set,
    /// [`LayoutError::MixedGameBinaries`] if two games disagree, and
    /// [`LayoutError::GameOutsideRoot`] if the binary does not live
    /// under the root.
    pub fn current_game(&self, snapshot: &ClusterSnapshot) -> Result<String, LayoutError> {
        let Some(first) = snapshot.games.first() else {
            return Err(LayoutError::NoCurrentGame);
        };
        for other in &snapshot.games[1..] {
            if other.exe != first.exe {
                return Err(LayoutError::MixedGameBinaries {
                    first: first.exe.display().to_string(),
                    second: other.exe.display().to_string(),
                });
            }
        }

        let outside = || LayoutError::GameOutsideRoot {
            exe: first.exe.clone(),
        };
        let dir = first.exe.parent().ok_or_else(outside)?;
        let relative = dir.strip_prefix(&self.root).map_err(|_| outside())?;
        let name = relative.to_str().ok_or_else(outside)?;
        if name.is_empty() {
            return Err(outside());
        }
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::observe::ObservedProcess;

    use super::*;

    /// Build a real project tree: engine binaries under components/,
    /// one game under mygame/mygame.
    fn project() -> (TempDir, ProjectLayout) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(PROJECT_MARKER);
        for component in ["dispatcher", "gate"] {
            let dir = root.join("components").join(component);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(component), b"#!binary").unwrap();
        }
        let game_dir = root.join("mygame").join("mygame");
        fs::create_dir_all(&game_dir).unwrap();
        fs::write(game_dir.join("mygame"), b"#!binary").unwrap();
        let layout = ProjectLayout::at(root).unwrap();
        (tmp, layout)
    }

    fn game_process(exe: &Path) -> ObservedProcess {
        ObservedProcess {
            pid: 1000,
            exe: exe.to_path_buf(),
            cmdline: vec!["game".into(), "-gid=0".into()],
        }
    }

    #[test]
    fn rejects_wrong_directory_name() {
        let err = ProjectLayout::at(PathBuf::from("/srv/elsewhere")).unwrap_err();
        assert!(matches!(err, LayoutError::NotProjectRoot { .. }));
    }

    #[test]
    fn engine_binary_paths_are_fixed() {
        let (_tmp, layout) = project();
        assert!(layout.dispatcher_exe().ends_with("components/dispatcher/dispatcher"));
        assert!(layout.gate_exe().ends_with("components/gate/gate"));
        layout.verify_engine_binaries().unwrap();
    }

    #[test]
    fn missing_engine_binary_is_reported() {
        let (_tmp, layout) = project();
        fs::remove_file(layout.gate_exe()).unwrap();
        let err = layout.verify_engine_binaries().unwrap_err();
        assert!(matches!(err, LayoutError::EngineBinaryMissing { path } if path.ends_with("gate/gate")));
    }

    #[test]
    fn bare_game_name_is_searched_in_sorted_order() {
        let (_tmp, layout) = project();
        // A second directory sorting before "mygame" that also holds the
        // game wins the search.
        let earlier = layout.root().join("alt").join("mygame");
        fs::create_dir_all(&earlier).unwrap();

        assert_eq!(layout.find_game("mygame").unwrap(), "alt/mygame");
    }

    #[test]
    fn qualified_game_name_is_checked_not_searched() {
        let (_tmp, layout) = project();
        assert_eq!(layout.find_game("mygame/mygame").unwrap(), "mygame/mygame");
        assert!(matches!(
            layout.find_game("alt/mygame").unwrap_err(),
            LayoutError::GameNotFound { .. }
        ));
    }

    #[test]
    fn reserved_directories_are_never_searched() {
        let (_tmp, layout) = project();
        let hidden = layout.root().join("components").join("sneaky");
        fs::create_dir_all(hidden).unwrap();
        assert!(matches!(
            layout.find_game("sneaky").unwrap_err(),
            LayoutError::GameNotFound { .. }
        ));
    }

    #[test]
    fn game_binary_verification() {
        let (_tmp, layout) = project();
        layout.verify_game_binary("mygame/mygame").unwrap();
        fs::remove_file(layout.game_exe("mygame/mygame")).unwrap();
        assert!(matches!(
            layout.verify_game_binary("mygame/mygame").unwrap_err(),
            LayoutError::GameBinaryMissing { .. }
        ));
    }

    #[test]
    fn current_game_resolves_from_a_uniform_snapshot() {
        let (_tmp, layout) = project();
        let exe = layout.game_exe("mygame/mygame");
        let mut snapshot = ClusterSnapshot::default();
        snapshot.games.push(game_process(&exe));
        snapshot.games.push(game_process(&exe));

        assert_eq!(layout.current_game(&snapshot).unwrap(), "mygame/mygame");
    }

    #[test]
    fn current_game_needs_at_least_one_game() {
        let (_tmp, layout) = project();
        assert!(matches!(
            layout.current_game(&ClusterSnapshot::default()).unwrap_err(),
            LayoutError::NoCurrentGame
        ));
    }

    #[test]
    fn mixed_game_binaries_are_rejected() {
        let (_tmp, layout) = project();
        let mut snapshot = ClusterSnapshot::default();
        snapshot.games.push(game_process(&layout.root().join("a/g/g")));
        snapshot.games.push(game_process(&layout.root().join("b/g/g")));

        assert!(matches!(
            layout.current_game(&snapshot).unwrap_err(),
            LayoutError::MixedGameBinaries { .. }
        ));
    }

    #[test]
    fn game_outside_root_is_rejected() {
        let (_tmp, layout) = project();
        let mut snapshot = ClusterSnapshot::default();
        snapshot.games.push(game_process(Path::new("/opt/foreign/g/g")));

        assert!(matches!(
            layout.current_game(&snapshot).unwrap_err(),
            LayoutError::GameOutsideRoot { .. }
        ));
    }
}
