//! Cluster topology configuration.
//!
//! Parses `shardworld.toml` from the project root: the gate and game
//! instance ids, the delegated build command, and controller settings.
//! The resulting [`Topology`] is read-only for the rest of the
//! invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Topology configuration file name, expected in the project root.
pub const CONFIG_FILE: &str = "shardworld.toml";

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content is invalid.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An instance id appears more than once within a role.
    #[error("duplicate {role} id {id} in configuration")]
    DuplicateId {
        /// Role whose id set is invalid.
        role: &'static str,
        /// The offending id.
        id: u32,
    },
}

/// Top-level `shardworld.toml` contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterConfig {
    /// Gate and game instance ids.
    #[serde(default)]
    pub cluster: TopologySection,

    /// Delegated build settings.
    #[serde(default)]
    pub build: BuildSection,

    /// Controller tuning.
    #[serde(default)]
    pub controller: ControllerSection,
}

/// `[cluster]` section: instance ids per role.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologySection {
    /// Gate instance ids.
    #[serde(default)]
    pub gates: Vec<u32>,

    /// Game instance ids.
    #[serde(default)]
    pub games: Vec<u32>,
}

/// `[build]` section: how component binaries get built.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Command run inside a component directory to build it.
    #[serde(default = "default_build_command")]
    pub command: String,
}

fn default_build_command() -> String {
    "make".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: default_build_command(),
        }
    }
}

/// `[controller]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSection {
    /// Interval between termination-waiter polls.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

const fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the id sets into an ordered [`Topology`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateId`] if an id repeats within a
    /// role.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Topology::new(self.cluster.gates.clone(), self.cluster.games.clone())
    }
}

/// Ordered, validated instance ids. Read-only after construction; built
/// once per controller invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    gates: Vec<u32>,
    games: Vec<u32>,
}

impl Topology {
    /// Sort and validate the per-role id sets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateId`] if an id repeats within a
    /// role.
    pub fn new(gates: Vec<u32>, games: Vec<u32>) -> Result<Self, ConfigError> {
        Ok(Self {
            gates: validated("gate", gates)?,
            games: validated("game", games)?,
        })
    }

    /// Gate instance ids, ascending.
    #[must_use]
    pub fn gates(&self) -> &[u32] {
        &self.gates
    }

    /// Game instance ids, ascending.
    #[must_use]
    pub fn games(&self) -> &[u32] {
        &self.games
    }
}

fn validated(role: &'static str, mut ids: Vec<u32>) -> Result<Vec<u32>, ConfigError> {
    ids.sort_unstable();
    if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(ConfigError::DuplicateId { role, id: pair[0] });
    }
    Ok(ids)
}
