//! Live process-table observation and role classification.
//!
//! No authoritative PID registry exists for the cluster, so role
//! membership is recovered from executable identity and the shared
//! launch-argument convention. Snapshots are produced fresh on every
//! query and never cached: the live set can change between two
//! consecutive scans.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Executable base name of the dispatcher binary.
pub const DISPATCHER_EXE: &str = "dispatcher";

/// Executable base name of the gate binary.
pub const GATE_EXE: &str = "gate";

/// Launch-argument convention shared by gate and game binaries.
pub const GID_FLAG: &str = "-gid=";

/// Cluster role recovered for an observed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// The singleton coordination process; must exist before gates or
    /// games.
    Dispatcher,
    /// A client-facing edge process; first to start accepting traffic,
    /// first to stop.
    Gate,
    /// A per-shard game-logic process.
    Game,
}

impl RoleKind {
    /// All roles, in dispatcher/gate/game order.
    pub const ALL: [Self; 3] = [Self::Dispatcher, Self::Gate, Self::Game];

    /// Role name as it appears in status tables and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatcher => "dispatcher",
            Self::Gate => "gate",
            Self::Game => "game",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A live OS process at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedProcess {
    /// OS process id.
    pub pid: u32,
    /// Resolved executable path.
    pub exe: PathBuf,
    /// Command-line arguments, argv[0] included.
    pub cmdline: Vec<String>,
}

/// One classifier pass over the process table, partitioned by role.
///
/// Unrelated processes are discarded during the scan. Ephemeral:
/// recomputed on demand, never carried across operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// Observed dispatcher processes.
    pub dispatchers: Vec<ObservedProcess>,
    /// Observed gate processes.
    pub gates: Vec<ObservedProcess>,
    /// Observed game processes.
    pub games: Vec<ObservedProcess>,
}

impl ClusterSnapshot {
    /// Processes observed for one role.
    #[must_use]
    pub fn role(&self, role: RoleKind) -> &[ObservedProcess] {
        match role {
            RoleKind::Dispatcher => &self.dispatchers,
            RoleKind::Gate => &self.gates,
            RoleKind::Game => &self.games,
        }
    }

    /// Observed instance count for one role.
    #[must_use]
    pub fn count(&self, role: RoleKind) -> usize {
        self.role(role).len()
    }

    /// Total observed processes across all three roles.
    #[must_use]
    pub fn total(&self) -> usize {
        self.dispatchers.len() + self.gates.len() + self.games.len()
    }

    /// Record a classified process.
    pub fn push(&mut self, role: RoleKind, process: ObservedProcess) {
        match role {
            RoleKind::Dispatcher => self.dispatchers.push(process),
            RoleKind::Gate => self.gates.push(process),
            RoleKind::Game => self.games.push(process),
        }
    }
}

/// Classify one process; `None` means unrelated to the cluster.
///
/// Matching rules, first match wins:
///
/// 1. dispatcher: exe base name equals [`DISPATCHER_EXE`] exactly;
/// 2. gate: base name equals [`GATE_EXE`] AND the exe path contains
///    `marker` AND some argument contains [`GID_FLAG`];
/// 3. game: base name is anything else, with the same marker and
///    `-gid=` conditions.
///
/// Game binaries carry arbitrary per-title names, so rule 3 matches by
/// the launch convention and excludes what rule 2 already claimed. A
/// game binary that is itself named `gate` would be claimed by rule 2;
/// the heuristic cannot tell them apart and the naming convention is
/// what keeps this from happening in practice.
#[must_use]
pub fn classify(exe: &Path, cmdline: &[String], marker: &str) -> Option<RoleKind> {
    let base = exe.file_name().and_then(|name| name.to_str())?;
    if base == DISPATCHER_EXE {
        return Some(RoleKind::Dispatcher);
    }

    let in_project = exe.to_string_lossy().contains(marker);
    let has_gid = cmdline.iter().any(|arg| arg.contains(GID_FLAG));
    if !in_project || !has_gid {
        return None;
    }

    if base == GATE_EXE {
        Some(RoleKind::Gate)
    } else {
        Some(RoleKind::Game)
    }
}

/// Procfs-backed process scanner.
///
/// The procfs root is injectable so tests can classify against a fake
/// process table built in a temporary directory.
#[derive(Debug, Clone)]
pub struct ProcScanner {
    proc_root: PathBuf,
    marker: String,
}

impl ProcScanner {
    /// Scanner over the system `/proc`.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self::with_proc_root(PathBuf::from("/proc"), marker)
    }

    /// Scanner over an arbitrary procfs root.
    #[must_use]
    pub fn with_proc_root(proc_root: PathBuf, marker: impl Into<String>) -> Self {
        Self {
            proc_root,
            marker: marker.into(),
        }
    }

    /// Scan and classify every live process.
    ///
    /// Per-process inspection failures (the process exited mid-scan,
    /// permission denied) drop that process from the snapshot; the scan
    /// itself never fails.
    #[must_use]
    pub fn snapshot(&self) -> ClusterSnapshot {
        let mut snapshot = ClusterSnapshot::default();
        let Ok(entries) = fs::read_dir(&self.proc_root) else {
            return snapshot;
        };

        for entry in entries {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
                continue;
            };

            let pid_dir = self.proc_root.join(&name);
            let Ok(exe) = fs::read_link(pid_dir.join("exe")) else {
                continue;
            };
            let Ok(raw_cmdline) = fs::read(pid_dir.join("cmdline")) else {
                continue;
            };
            let cmdline = split_cmdline(&raw_cmdline);

            if let Some(role) = classify(&exe, &cmdline, &self.marker) {
                snapshot.push(role, ObservedProcess { pid, exe, cmdline });
            }
        }

        snapshot
    }
}

/// Split a raw `/proc/<pid>/cmdline` buffer on NUL separators.
fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&byte| byte == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use tempfile::TempDir;

    use super::*;

    const MARKER: &str = "shardworld";

    /// Plant a fake `/proc/<pid>` entry with an exe symlink and a
    /// NUL-separated cmdline file.
    fn plant(proc_root: &Path, pid: u32, exe_target: &str, args: &[&str]) {
        let dir = proc_root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        symlink(exe_target, dir.join("exe")).unwrap();
        let mut cmdline = Vec::new();
        for arg in args {
            cmdline.extend_from_slice(arg.as_bytes());
            cmdline.push(0);
        }
        fs::write(dir.join("cmdline"), cmdline).unwrap();
    }

    fn scan(proc_root: &Path) -> ClusterSnapshot {
        ProcScanner::with_proc_root(proc_root.to_path_buf(), MARKER).snapshot()
    }

    #[test]
    fn dispatcher_matches_on_exact_base_name() {
        let tmp = TempDir::new().unwrap();
        plant(tmp.path(), 100, "/opt/elsewhere/dispatcher", &["dispatcher"]);

        let snapshot = scan(tmp.path());
        assert_eq!(snapshot.count(RoleKind::Dispatcher), 1);
        assert_eq!(snapshot.dispatchers[0].pid, 100);
        assert_eq!(snapshot.total(), 1);
    }

    #[test]
    fn gate_requires_name_marker_and_gid() {
        let tmp = TempDir::new().unwrap();
        plant(
            tmp.path(),
            200,
            "/srv/shardworld/components/gate/gate",
            &["gate", "-gid=1", "-log", "info"],
        );

        let snapshot = scan(tmp.path());
        assert_eq!(snapshot.count(RoleKind::Gate), 1);
        assert_eq!(snapshot.count(RoleKind::Game), 0);
    }

    #[test]
    fn gate_binary_without_gid_is_excluded_entirely() {
        // Rule 2 and rule 3 are conjunctive: a gate-named binary with no
        // -gid= argument is neither gate nor game.
        let tmp = TempDir::new().unwrap();
        plant(tmp.path(), 201, "/srv/shardworld/components/gate/gate", &["gate"]);

        let snapshot = scan(tmp.path());
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn game_matches_by_marker_and_gid_convention() {
        let tmp = TempDir::new().unwrap();
        plant(
            tmp.path(),
            300,
            "/srv/shardworld/mygame/mygame",
            &["mygame", "-gid=0", "-log", "debug"],
        );

        let snapshot = scan(tmp.path());
        assert_eq!(snapshot.count(RoleKind::Game), 1);
        assert_eq!(snapshot.games[0].exe, PathBuf::from("/srv/shardworld/mygame/mygame"));
    }

    #[test]
    fn gid_without_marker_is_unrelated() {
        let tmp = TempDir::new().unwrap();
        plant(tmp.path(), 301, "/opt/other/mygame", &["mygame", "-gid=0"]);

        assert_eq!(scan(tmp.path()).total(), 0);
    }

    #[test]
    fn unrelated_and_unreadable_entries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        plant(tmp.path(), 400, "/usr/bin/bash", &["bash"]);
        // Non-numeric entry, like /proc/self.
        fs::create_dir_all(tmp.path().join("self")).unwrap();
        // Vanished process: pid directory without exe/cmdline.
        fs::create_dir_all(tmp.path().join("401")).unwrap();

        assert_eq!(scan(tmp.path()).total(), 0);
    }

    #[test]
    fn classify_precedence_dispatcher_wins() {
        // Rule 1 needs no marker or arguments.
        let role = classify(Path::new("/x/dispatcher"), &[], MARKER);
        assert_eq!(role, Some(RoleKind::Dispatcher));
    }

    #[test]
    fn split_cmdline_drops_empty_parts() {
        let raw = b"gate\0-gid=2\0\0";
        assert_eq!(split_cmdline(raw), vec!["gate".to_string(), "-gid=2".to_string()]);
    }
}
