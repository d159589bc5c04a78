//! Namespace probing by re-execution
//!
//! This crate runs one probe per Linux namespace kind, each inside a child
//! process created with the matching clone flag:
//! - Network namespace - lists the (empty) set of interfaces
//! - PID namespace - shows the child is PID 1
//! - UTS namespace - changes the hostname without touching the host's
//! - Mount namespace - mounts a tmpfs invisible to the parent

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod host;
pub mod probes;
pub mod registry;

pub use config::{DispatchConfig, ProbeConfig};
pub use dispatcher::{ChildOutcome, ChildReport, DispatchOutcome, Dispatcher, RunSummary};
pub use executor::{ChildExit, ChildInvocation, CloneLauncher, Launcher};
pub use host::{Host, HostOp, LinuxHost, MockHost};
pub use probes::{HostnameProbe, InterfacesProbe, MountProbe, Probe, ProcessIdProbe};
pub use registry::{NamespaceSpec, Registry};
