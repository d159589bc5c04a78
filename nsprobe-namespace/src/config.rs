//! Dispatcher and probe configuration

use nsprobe_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Path the parent re-executes to obtain a fresh child process
pub const SELF_EXE: &str = "/proc/self/exe";

/// Hostname the UTS probe sets inside its namespace
pub const DEFAULT_HOSTNAME: &str = "container-hostname";

/// Directory the mount probe creates and mounts a tmpfs onto
pub const DEFAULT_SCRATCH_DIR: &str = "/nsprobe-scratch";

/// Smallest stack accepted for the clone child
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Parent-mode configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Executable each child re-runs
    pub self_exe: PathBuf,

    /// Launch every child at once instead of one after another
    pub parallel: bool,

    /// Exit non-zero when any child failed
    pub strict: bool,

    /// Stack size handed to clone(2) for the child
    pub stack_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            self_exe: PathBuf::from(SELF_EXE),
            parallel: false,
            strict: false,
            stack_size: 1024 * 1024,
        }
    }
}

impl DispatchConfig {
    /// Create a new dispatcher configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-execute a different binary
    #[must_use]
    pub fn with_self_exe(mut self, path: impl Into<PathBuf>) -> Self {
        self.self_exe = path.into();
        self
    }

    /// Run children concurrently
    #[must_use]
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Turn child failures into a failing exit code
    #[must_use]
    pub fn with_strict(mut self, enable: bool) -> Self {
        self.strict = enable;
        self
    }

    /// Set the clone stack size
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Check the configuration before any child is launched
    pub fn validate(&self) -> Result<()> {
        if self.self_exe.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                message: "self executable path cannot be empty".to_string(),
            });
        }

        if self.stack_size < MIN_STACK_SIZE {
            return Err(Error::InvalidConfig {
                message: format!(
                    "clone stack too small ({} bytes, min {MIN_STACK_SIZE})",
                    self.stack_size
                ),
            });
        }

        Ok(())
    }
}

/// Literals the probes work with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Hostname set by the UTS probe
    pub hostname: String,

    /// Scratch directory used by the mount probe
    pub scratch_dir: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
        }
    }
}

impl ProbeConfig {
    /// Set the hostname for the UTS probe
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the scratch directory for the mount probe
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}
