//! Expected-vs-observed status tables.

use std::fmt;

use crate::config::Topology;
use crate::observe::{ClusterSnapshot, RoleKind};

/// Expected instance counts per role for one cluster state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedCounts {
    /// Expected dispatcher count.
    pub dispatchers: usize,
    /// Expected gate count.
    pub gates: usize,
    /// Expected game count.
    pub games: usize,
}

impl ExpectedCounts {
    /// Everything expected down.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            dispatchers: 0,
            gates: 0,
            games: 0,
        }
    }

    /// Full cluster per the configured topology.
    #[must_use]
    pub fn running(topology: &Topology) -> Self {
        Self {
            dispatchers: 1,
            gates: topology.gates().len(),
            games: topology.games().len(),
        }
    }

    /// Dispatcher and gates up, games down. The frozen state.
    #[must_use]
    pub fn frozen(topology: &Topology) -> Self {
        Self {
            games: 0,
            ..Self::running(topology)
        }
    }

    fn for_role(&self, role: RoleKind) -> usize {
        match role {
            RoleKind::Dispatcher => self.dispatchers,
            RoleKind::Gate => self.gates,
            RoleKind::Game => self.games,
        }
    }
}

/// One row of the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    /// Role this row describes.
    pub role: RoleKind,
    /// Expected instance count.
    pub expected: usize,
    /// Observed instance count.
    pub found: usize,
}

impl StatusLine {
    /// Whether observed matches expected.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.expected == self.found
    }
}

/// A three-row comparison of expected against observed counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    lines: [StatusLine; 3],
}

impl StatusReport {
    /// Compare a snapshot against expected counts, one row per role.
    #[must_use]
    pub fn new(expected: ExpectedCounts, snapshot: &ClusterSnapshot) -> Self {
        let lines = RoleKind::ALL.map(|role| StatusLine {
            role,
            expected: expected.for_role(role),
            found: snapshot.count(role),
        });
        Self { lines }
    }

    /// Rows in dispatcher/gate/game order.
    #[must_use]
    pub fn lines(&self) -> &[StatusLine; 3] {
        &self.lines
    }

    /// Whether every role matches its expectation.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.lines.iter().all(StatusLine::ok)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            let verdict = if line.ok() { "ok" } else { "FAIL" };
            writeln!(
                f,
                "{:<16} expect {} found {} {}",
                line.role, line.expected, line.found, verdict
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::observe::ObservedProcess;

    use super::*;

    fn topology() -> Topology {
        Topology::new(vec![1, 2], vec![0]).unwrap()
    }

    fn process(pid: u32) -> ObservedProcess {
        ObservedProcess {
            pid,
            exe: "/srv/shardworld/components/gate/gate".into(),
            cmdline: vec![],
        }
    }

    #[test]
    fn matching_counts_are_ok() {
        let mut snapshot = ClusterSnapshot::default();
        snapshot.dispatchers.push(process(1));
        snapshot.gates.push(process(2));
        snapshot.gates.push(process(3));
        snapshot.games.push(process(4));

        let report = StatusReport::new(ExpectedCounts::running(&topology()), &snapshot);
        assert!(report.all_ok());
    }

    #[test]
    fn mismatch_fails_only_the_affected_role() {
        let mut snapshot = ClusterSnapshot::default();
        snapshot.dispatchers.push(process(1));

        let report = StatusReport::new(ExpectedCounts::running(&topology()), &snapshot);
        assert!(!report.all_ok());
        assert!(report.lines()[0].ok());
        assert!(!report.lines()[1].ok());
        assert!(!report.lines()[2].ok());
    }

    #[test]
    fn rendering_is_fixed_width_per_role() {
        let report = StatusReport::new(ExpectedCounts::stopped(), &ClusterSnapshot::default());
        let text = report.to_string();
        assert_eq!(
            text,
            "dispatcher       expect 0 found 0 ok\n\
             gate             expect 0 found 0 ok\n\
             game             expect 0 found 0 ok\n"
        );
    }

    #[test]
    fn frozen_expects_no_games() {
        let expected = ExpectedCounts::frozen(&topology());
        assert_eq!(expected.dispatchers, 1);
        assert_eq!(expected.gates, 2);
        assert_eq!(expected.games, 0);
    }
}
