//! The lifecycle controller: ordering protocols over live processes.
//!
//! Operations never track child handles. Every decision starts from a
//! fresh [`ClusterSnapshot`], and completion of a teardown phase means
//! the affected role has vanished from the process table, however the
//! processes were originally started.

use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{info, warn};

use crate::builder::{BuildError, BuildRunner, BuildTarget};
use crate::config::Topology;
use crate::launch::{LaunchError, LaunchSpec};
use crate::layout::{LayoutError, ProjectLayout, PROJECT_MARKER};
use crate::observe::{ClusterSnapshot, ObservedProcess, ProcScanner, RoleKind};
use crate::report::{ExpectedCounts, StatusReport};

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Start requested while cluster processes are already live.
    #[error("cluster already has {found} live process(es), stop it first")]
    AlreadyRunning {
        /// Live processes observed.
        found: usize,
    },

    /// Stop requested with nothing running.
    #[error("no cluster processes are running")]
    NotRunning,

    /// Restore requires exactly one live dispatcher.
    #[error("restore needs exactly one dispatcher, found {found}")]
    RestoreNeedsDispatcher {
        /// Dispatchers observed.
        found: usize,
    },

    /// Restore requires the game set to be fully down.
    #[error("{found} game process(es) still running, freeze first")]
    GamesStillRunning {
        /// Games observed.
        found: usize,
    },

    /// Freeze requested with no games up.
    #[error("no game processes to freeze")]
    NothingToFreeze,

    /// Reload could not infer which game is running.
    #[error("cannot infer the running game: {reason}")]
    CurrentGameUnresolved {
        /// Why inference failed.
        reason: String,
    },

    /// Binary or game resolution failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// A role process failed to spawn.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A delegated build failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Teardown signal choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGINT; games persist state before exiting.
    Interrupt,
    /// SIGTERM; the polite stop for games.
    Terminate,
    /// SIGKILL; gates and the dispatcher hold no state worth saving.
    Kill,
}

impl StopSignal {
    /// Conventional signal name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    const fn to_nix(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One parsed command-line operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Print the expected-vs-observed table.
    Status,
    /// Bring up the full cluster running the named game.
    Start {
        /// Game name, bare or `<dir>/<name>` qualified.
        game: String,
    },
    /// Tear down with SIGTERM to games.
    Stop,
    /// Tear down with SIGKILL to games.
    Kill,
    /// Stop games with SIGINT so they persist state.
    Freeze,
    /// Bring games back from persisted state.
    Restore {
        /// Game name, bare or `<dir>/<name>` qualified.
        game: String,
    },
    /// Freeze then restore the currently running game.
    Reload,
    /// Build one or more targets.
    Build {
        /// Targets, in command-line order.
        targets: Vec<BuildTarget>,
    },
    /// Pause between operations in a sequence.
    Sleep {
        /// How long to pause.
        duration: Duration,
    },
}

/// Immutable per-invocation context; built once, never mutated.
#[derive(Debug)]
pub struct Invocation {
    /// Configured instance ids.
    pub topology: Topology,
    /// Verified project root.
    pub layout: ProjectLayout,
    /// Log level forwarded to spawned processes.
    pub log_level: String,
    /// Detach spawned processes into their own sessions.
    pub detached: bool,
    /// Termination-waiter poll interval.
    pub poll_interval: Duration,
}

/// Seam between the controller and the host OS, so the ordering
/// protocols are testable against a scripted cluster.
pub trait ClusterOps {
    /// Fresh classification pass over the process table.
    fn snapshot(&mut self) -> ClusterSnapshot;

    /// Start one role process.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the process cannot be started.
    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32, LaunchError>;

    /// Deliver a signal to one observed process.
    fn signal(&mut self, process: &ObservedProcess, signal: StopSignal);

    /// Block for the given duration.
    fn sleep(&mut self, duration: Duration);
}

/// [`ClusterOps`] over the real host: procfs scans, `fork`/`exec`,
/// POSIX signals.
#[derive(Debug)]
pub struct HostCluster {
    scanner: ProcScanner,
}

impl HostCluster {
    /// Host cluster using the system `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scanner: ProcScanner::new(PROJECT_MARKER),
        }
    }
}

impl Default for HostCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterOps for HostCluster {
    fn snapshot(&mut self) -> ClusterSnapshot {
        self.scanner.snapshot()
    }

    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        spec.spawn()
    }

    fn signal(&mut self, process: &ObservedProcess, signal: StopSignal) {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid::from_raw(process.pid as i32);
        match kill(pid, signal.to_nix()) {
            Ok(()) => {}
            // Exited between snapshot and delivery; the waiter will
            // observe it gone.
            Err(Errno::ESRCH) => {}
            Err(err) => warn!(pid = process.pid, %signal, %err, "signal delivery failed"),
        }
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Executes operation sequences against a cluster, enforcing the
/// bring-up and teardown ordering protocols.
pub struct Controller<'a, C, B> {
    cluster: &'a mut C,
    builder: &'a B,
    inv: &'a Invocation,
    // Resolved once from the snapshot taken at construction, before
    // any operation disturbs the game set.
    current_game: Result<String, LayoutError>,
}

impl<'a, C: ClusterOps, B: BuildRunner> Controller<'a, C, B> {
    /// Build a controller, inferring the running game identity from
    /// the initial process table.
    pub fn new(cluster: &'a mut C, builder: &'a B, inv: &'a Invocation) -> Self {
        let snapshot = cluster.snapshot();
        let current_game = inv.layout.current_game(&snapshot);
        Self {
            cluster,
            builder,
            inv,
            current_game,
        }
    }

    /// Run an operation sequence, aborting at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first operation's [`ControlError`]; later
    /// operations do not run.
    pub fn run(&mut self, ops: &[Op]) -> Result<(), ControlError> {
        for op in ops {
            self.run_one(op)?;
        }
        Ok(())
    }

    fn run_one(&mut self, op: &Op) -> Result<(), ControlError> {
        match op {
            Op::Status => {
                self.report(ExpectedCounts::running(&self.inv.topology));
                Ok(())
            }
            Op::Start { game } => self.start(game),
            Op::Stop => self.stop(StopSignal::Terminate),
            Op::Kill => self.stop(StopSignal::Kill),
            Op::Freeze => self.freeze(),
            Op::Restore { game } => self.restore(game),
            Op::Reload => self.reload(),
            Op::Build { targets } => {
                for target in targets {
                    self.builder.build(target)?;
                }
                Ok(())
            }
            Op::Sleep { duration } => {
                self.cluster.sleep(*duration);
                Ok(())
            }
        }
    }

    /// Bring-up order: dispatcher, then games ascending, then gates
    /// ascending. Gates go last so no client traffic is accepted
    /// before the world is ready behind them.
    fn start(&mut self, game: &str) -> Result<(), ControlError> {
        let inv = self.inv;
        let snapshot = self.cluster.snapshot();
        if snapshot.total() > 0 {
            self.print(&StatusReport::new(
                ExpectedCounts::running(&inv.topology),
                &snapshot,
            ));
            return Err(ControlError::AlreadyRunning {
                found: snapshot.total(),
            });
        }

        let qualified = inv.layout.find_game(game)?;
        inv.layout.verify_game_binary(&qualified)?;
        info!(game = %qualified, "starting cluster");

        self.spawn_one(inv.layout.dispatcher_exe(), None, false)?;
        let game_exe = inv.layout.game_exe(&qualified);
        for &gid in inv.topology.games() {
            self.spawn_one(game_exe.clone(), Some(gid), false)?;
        }
        for &gid in inv.topology.gates() {
            self.spawn_one(inv.layout.gate_exe(), Some(gid), false)?;
        }

        self.report(ExpectedCounts::running(&inv.topology));
        Ok(())
    }

    /// Teardown order: gates first so clients stop arriving, then
    /// games with the caller's signal, then the dispatcher. Each phase
    /// waits for its role to vanish before the next begins.
    fn stop(&mut self, game_signal: StopSignal) -> Result<(), ControlError> {
        let snapshot = self.cluster.snapshot();
        if snapshot.total() == 0 {
            self.print(&StatusReport::new(ExpectedCounts::stopped(), &snapshot));
            return Err(ControlError::NotRunning);
        }

        self.signal_role(&snapshot, RoleKind::Gate, StopSignal::Kill);
        self.wait_until_gone(RoleKind::Gate);

        let snapshot = self.cluster.snapshot();
        self.signal_role(&snapshot, RoleKind::Game, game_signal);
        self.wait_until_gone(RoleKind::Game);

        let snapshot = self.cluster.snapshot();
        self.signal_role(&snapshot, RoleKind::Dispatcher, StopSignal::Kill);
        self.wait_until_gone(RoleKind::Dispatcher);

        self.report(ExpectedCounts::stopped());
        Ok(())
    }

    /// SIGINT the games so they persist state, then wait them out.
    /// Dispatcher and gates stay up.
    fn freeze(&mut self) -> Result<(), ControlError> {
        let snapshot = self.cluster.snapshot();
        if snapshot.count(RoleKind::Game) == 0 {
            self.print(&StatusReport::new(
                ExpectedCounts::running(&self.inv.topology),
                &snapshot,
            ));
            return Err(ControlError::NothingToFreeze);
        }
        self.signal_role(&snapshot, RoleKind::Game, StopSignal::Interrupt);
        self.wait_until_gone(RoleKind::Game);
        Ok(())
    }

    /// Spawn the full game set with the restore flag. Legal only with
    /// exactly one dispatcher up and no games left.
    fn restore(&mut self, game: &str) -> Result<(), ControlError> {
        let inv = self.inv;
        let snapshot = self.cluster.snapshot();
        let dispatchers = snapshot.count(RoleKind::Dispatcher);
        let games = snapshot.count(RoleKind::Game);
        if dispatchers != 1 || games > 0 {
            // The frozen state is what restore expects to find.
            self.print(&StatusReport::new(
                ExpectedCounts::frozen(&inv.topology),
                &snapshot,
            ));
            if dispatchers != 1 {
                return Err(ControlError::RestoreNeedsDispatcher { found: dispatchers });
            }
            return Err(ControlError::GamesStillRunning { found: games });
        }

        let qualified = inv.layout.find_game(game)?;
        inv.layout.verify_game_binary(&qualified)?;
        info!(game = %qualified, "restoring games");

        let game_exe = inv.layout.game_exe(&qualified);
        for &gid in inv.topology.games() {
            self.spawn_one(game_exe.clone(), Some(gid), true)?;
        }
        Ok(())
    }

    /// Hot-swap the running game binary: freeze, then restore the
    /// identity inferred at construction time.
    fn reload(&mut self) -> Result<(), ControlError> {
        let current = match &self.current_game {
            Ok(game) => game.clone(),
            Err(err) => {
                return Err(ControlError::CurrentGameUnresolved {
                    reason: err.to_string(),
                })
            }
        };
        self.freeze()?;
        self.restore(&current)
    }

    fn spawn_one(
        &mut self,
        exe: PathBuf,
        gid: Option<u32>,
        restore: bool,
    ) -> Result<(), ControlError> {
        let spec = LaunchSpec {
            exe,
            gid,
            log_level: self.inv.log_level.clone(),
            restore,
            detached: self.inv.detached,
        };
        let pid = self.cluster.spawn(&spec)?;
        info!(pid, exe = %spec.exe.display(), gid, "started");
        Ok(())
    }

    fn signal_role(&mut self, snapshot: &ClusterSnapshot, role: RoleKind, signal: StopSignal) {
        for process in snapshot.role(role) {
            info!(pid = process.pid, %role, %signal, "stopping");
            self.cluster.signal(process, signal);
        }
    }

    /// Poll until the role has no live processes. No timeout: a wedged
    /// process is an operator problem, and Ctrl-C ends the wait.
    fn wait_until_gone(&mut self, role: RoleKind) {
        loop {
            if self.cluster.snapshot().count(role) == 0 {
                return;
            }
            self.cluster.sleep(self.inv.poll_interval);
        }
    }

    fn report(&mut self, expected: ExpectedCounts) {
        let snapshot = self.cluster.snapshot();
        self.print(&StatusReport::new(expected, &snapshot));
    }

    #[allow(clippy::unused_self)]
    fn print(&self, report: &StatusReport) {
        print!("{report}");
    }
}
