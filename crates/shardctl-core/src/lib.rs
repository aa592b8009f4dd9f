//! Process-lifecycle orchestration for a shardworld cluster.
//!
//! A cluster is three role kinds — one dispatcher, N gates, M games —
//! running as plain OS processes with no authoritative PID registry.
//! This crate rediscovers the cluster from the live process table,
//! enforces the bring-up/tear-down ordering protocol, and implements
//! the freeze/restore cycle used for hot-swapping game binaries while
//! the dispatcher and gates stay up.
//!
//! The pieces map onto the orchestration flow:
//!
//! - [`observe`] — classify the process table into cluster roles
//! - [`config`] — topology ids and controller settings from `shardworld.toml`
//! - [`layout`] — working-directory contract and on-disk binary resolution
//! - [`launch`] — the spawn argument contract for role binaries
//! - [`control`] — the lifecycle controller and termination waiter
//! - [`report`] — expected-vs-observed status tables
//! - [`builder`] — delegated builds of component binaries

pub mod builder;
pub mod config;
pub mod control;
pub mod launch;
pub mod layout;
pub mod observe;
pub mod report;

pub use config::{ClusterConfig, ConfigError, Topology};
pub use control::{ClusterOps, ControlError, Controller, HostCluster, Invocation, Op, StopSignal};
pub use layout::{LayoutError, ProjectLayout, PROJECT_MARKER};
pub use observe::{ClusterSnapshot, ObservedProcess, ProcScanner, RoleKind};
pub use report::{ExpectedCounts, StatusReport};
