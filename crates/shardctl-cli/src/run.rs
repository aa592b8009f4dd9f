//! Wires a parsed operation sequence to the host cluster.

use shardctl_core::builder::ShellBuilder;
use shardctl_core::config::CONFIG_FILE;
use shardctl_core::{
    ClusterConfig, ConfigError, ControlError, Controller, HostCluster, Invocation, LayoutError,
    Op, ProjectLayout,
};
use thiserror::Error;
use tracing::debug;

/// Operational failures; all exit with the operational code.
#[derive(Debug, Error)]
pub enum RunError {
    /// Topology configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The working directory is not a usable project root.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// An operation failed.
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Execute the sequence against the live host.
pub fn run(ops: &[Op], log_level: &str, detached: bool) -> Result<(), RunError> {
    let layout = ProjectLayout::discover()?;

    // A pure build sequence may legitimately run before any binary
    // exists; everything else needs the engine binaries on disk.
    let build_only = ops.iter().all(|op| matches!(op, Op::Build { .. }));
    if !build_only {
        layout.verify_engine_binaries()?;
    }

    let config = ClusterConfig::from_file(&layout.root().join(CONFIG_FILE))?;
    let topology = config.topology()?;
    debug!(
        gates = topology.gates().len(),
        games = topology.games().len(),
        "topology loaded"
    );

    let invocation = Invocation {
        topology,
        layout,
        log_level: log_level.to_string(),
        detached,
        poll_interval: config.controller.poll_interval,
    };
    let builder = ShellBuilder::new(&invocation.layout, &config.build.command);
    let mut cluster = HostCluster::new();

    Controller::new(&mut cluster, &builder, &invocation).run(ops)?;
    Ok(())
}
