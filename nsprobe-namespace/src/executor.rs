//! Re-executing the binary inside a new namespace
//!
//! This module uses `unsafe` for clone(2). The namespace flags only take
//! effect on a process at creation time, so the child is cloned with the
//! flags set and immediately execs the binary again.

#![allow(unsafe_code)]

use nix::errno::Errno;
use nix::sched::{CloneFlags, clone};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use nsprobe_core::{Error, NamespaceKind, Result};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;
use tracing::{debug, info, warn};

use crate::registry::NamespaceSpec;

/// Status a cloned child exits with when exec fails
const EXEC_FAILED: isize = 127;

/// Everything needed to start one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInvocation {
    /// Namespace the child is placed in
    pub namespace: NamespaceKind,
    /// Program to execute
    pub program: PathBuf,
    /// Sole argument: the namespace identifier
    pub argument: String,
    /// Isolation flag applied at creation time
    pub flag: CloneFlags,
}

impl ChildInvocation {
    /// Invocation that re-runs `program` for `spec`
    #[must_use]
    pub fn for_spec(spec: &NamespaceSpec, program: impl Into<PathBuf>) -> Self {
        Self {
            namespace: spec.kind(),
            program: program.into(),
            argument: spec.identifier().to_string(),
            flag: spec.flag(),
        }
    }

    /// Command line as shown to the user
    #[must_use]
    pub fn command_line(&self) -> String {
        format!("{} {}", self.program.display(), self.argument)
    }
}

/// How a child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChildExit {
    /// Exited normally with a code
    Exited {
        /// Exit code
        code: i32,
    },
    /// Killed by a signal
    Signaled {
        /// Signal number
        signal: i32,
    },
}

impl ChildExit {
    /// Whether the child exited with status 0
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// Shell-style exit code: the code itself, or 128 + signal
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited { code } => code,
            Self::Signaled { signal } => 128 + signal,
        }
    }
}

/// Starts a child and waits for it
pub trait Launcher: Send + Sync {
    /// Run `invocation` to completion
    ///
    /// # Errors
    /// Returns [`Error::Launch`] if the child cannot be created or waited on
    fn launch(&self, invocation: &ChildInvocation) -> Result<ChildExit>;
}

/// Launcher built on clone(2) + execv(2) + waitpid(2)
#[derive(Debug, Clone)]
pub struct CloneLauncher {
    stack_size: usize,
}

impl CloneLauncher {
    /// Create a launcher that gives each child a `stack_size` byte stack
    #[must_use]
    pub const fn new(stack_size: usize) -> Self {
        Self { stack_size }
    }
}

impl Launcher for CloneLauncher {
    fn launch(&self, invocation: &ChildInvocation) -> Result<ChildExit> {
        let launch_error = |message: String| Error::Launch {
            namespace: invocation.argument.clone(),
            message,
        };

        // The child must not allocate: the parent is multithreaded and
        // clone(2) skips the atfork handlers that would reset the allocator.
        let program = CString::new(invocation.program.as_os_str().as_bytes())
            .map_err(|e| launch_error(format!("invalid program path: {e}")))?;
        let argument = CString::new(invocation.argument.as_bytes())
            .map_err(|e| launch_error(format!("invalid argument: {e}")))?;
        let argv: [*const libc::c_char; 3] = [program.as_ptr(), argument.as_ptr(), ptr::null()];
        let mut stack = vec![0_u8; self.stack_size];

        let child_main = Box::new(|| {
            // SAFETY: `program` and the NUL-terminated `argv` point into
            // CStrings that stay alive until after the child has exec'd or exited.
            unsafe { libc::execv(program.as_ptr(), argv.as_ptr()) };
            // Only reached on failure
            EXEC_FAILED
        });

        debug!(
            namespace = %invocation.namespace,
            flags = ?invocation.flag,
            "Cloning child"
        );

        // SAFETY: the child only calls execv(2) on pointers prepared above and
        // returns without allocating; the stack outlives the child's use of it
        // because the child either execs (new address space) or exits.
        let child = unsafe {
            clone(
                child_main,
                &mut stack,
                invocation.flag,
                Some(libc::SIGCHLD),
            )
        }
        .map_err(|e| launch_error(format!("clone failed: {e}")))?;

        info!(namespace = %invocation.namespace, pid = %child, "Child started");

        wait_for_child(child).map_err(|e| launch_error(format!("wait failed: {e}")))
    }
}

/// Block until `child` exits or is killed
fn wait_for_child(child: Pid) -> std::result::Result<ChildExit, Errno> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                debug!(pid = %child, code, "Child exited");
                return Ok(ChildExit::Exited { code });
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                warn!(pid = %child, ?signal, "Child terminated by signal");
                return Ok(ChildExit::Signaled {
                    signal: signal as i32,
                });
            }
            Ok(status) => {
                debug!(?status, "Child status");
                // Continue waiting for exit
            }
            Err(Errno::EINTR) => {
                debug!("Wait interrupted by signal, continuing...");
            }
            Err(e) => return Err(e),
        }
    }
}
