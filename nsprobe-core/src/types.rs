//! Core type definitions with strong typing and validation

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Exit status of a successful probe or run
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status of a failed probe, an unknown selector or a strict run with failures
pub const EXIT_FAILURE: i32 = 1;

/// The closed set of namespace kinds nsprobe knows how to exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Network namespace (`CLONE_NEWNET`)
    Net,
    /// PID namespace (`CLONE_NEWPID`)
    Pid,
    /// UTS namespace (`CLONE_NEWUTS`)
    Uts,
    /// Mount namespace (`CLONE_NEWNS`)
    Mount,
}

impl NamespaceKind {
    /// Every kind, in the order parent mode launches them
    pub const ALL: [Self; 4] = [Self::Net, Self::Pid, Self::Uts, Self::Mount];

    /// Identifier used on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Net => "net",
            Self::Pid => "pid",
            Self::Uts => "uts",
            Self::Mount => "mount",
        }
    }

    /// Clone flag that places a new process in a fresh namespace of this kind
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Mount => CloneFlags::CLONE_NEWNS,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamespaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownSelector {
                selector: s.to_string(),
            })
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID as seen from this process's PID namespace
    #[must_use]
    pub fn current() -> Self {
        nix::unistd::getpid().into()
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}
