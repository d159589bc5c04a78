//! Parent/child mode dispatch
//!
//! Without a selector the dispatcher runs in parent mode: it re-executes the
//! binary once per registry entry, each time inside a fresh namespace of that
//! entry's kind. With a selector it runs in child mode and executes the
//! matching probe in-process.

use nsprobe_core::{EXIT_FAILURE, EXIT_SUCCESS, NamespaceKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::executor::{ChildExit, ChildInvocation, CloneLauncher, Launcher};
use crate::registry::Registry;

/// How one child run ended, as seen by the parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChildOutcome {
    /// The child exited with a code
    Exited {
        /// Exit code
        code: i32,
    },
    /// The child was killed by a signal
    Signaled {
        /// Signal number
        signal: i32,
    },
    /// The child could not be started or waited on
    LaunchFailed {
        /// Error message
        message: String,
    },
}

impl ChildOutcome {
    /// Whether the child ran and exited with status 0
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl From<Result<ChildExit>> for ChildOutcome {
    fn from(result: Result<ChildExit>) -> Self {
        match result {
            Ok(ChildExit::Exited { code }) => Self::Exited { code },
            Ok(ChildExit::Signaled { signal }) => Self::Signaled { signal },
            Err(e) => Self::LaunchFailed {
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for ChildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exit status {code}"),
            Self::Signaled { signal } => write!(f, "signal: {signal}"),
            Self::LaunchFailed { message } => f.write_str(message),
        }
    }
}

/// Result of one child run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildReport {
    /// Namespace the child was isolated in
    pub namespace: NamespaceKind,
    /// How the child ended
    #[serde(flatten)]
    pub outcome: ChildOutcome,
}

/// Everything parent mode launched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// One report per registry entry, in registry order
    pub children: Vec<ChildReport>,
}

impl RunSummary {
    /// Reports of children that did not exit cleanly
    pub fn failures(&self) -> impl Iterator<Item = &ChildReport> {
        self.children.iter().filter(|r| !r.outcome.success())
    }

    /// Whether every child exited with status 0
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Parent exit code: child failures only count when `strict` is set
    #[must_use]
    pub fn exit_code(&self, strict: bool) -> i32 {
        if strict && !self.all_succeeded() {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

/// What a dispatcher run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Status the process should exit with
    pub exit_code: i32,
    /// Child reports, present only in parent mode
    pub summary: Option<RunSummary>,
}

/// Entry point selecting parent or child mode
pub struct Dispatcher {
    registry: Arc<Registry>,
    launcher: Arc<dyn Launcher>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Dispatcher that launches children with clone(2)
    #[must_use]
    pub fn new(registry: Registry, config: DispatchConfig) -> Self {
        let launcher = Arc::new(CloneLauncher::new(config.stack_size));
        Self {
            registry: Arc::new(registry),
            launcher,
            config,
        }
    }

    /// Replace the launcher
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Run in child mode if `selector` is given, parent mode otherwise
    pub async fn run(&self, selector: Option<&str>, out: &mut dyn Write) -> DispatchOutcome {
        if let Some(selector) = selector {
            return DispatchOutcome {
                exit_code: self.run_child(selector, out),
                summary: None,
            };
        }

        match self.run_parent(out).await {
            Ok(summary) => DispatchOutcome {
                exit_code: summary.exit_code(self.config.strict),
                summary: Some(summary),
            },
            Err(e) => {
                error!(error = %e, "Parent run aborted");
                let _ = writeln!(out, "{e}");
                DispatchOutcome {
                    exit_code: EXIT_FAILURE,
                    summary: None,
                }
            }
        }
    }

    /// Look up `selector` and run its probe once
    ///
    /// Returns the probe's status, or [`EXIT_FAILURE`] without running
    /// anything if the selector is not registered.
    pub fn run_child(&self, selector: &str, out: &mut dyn Write) -> i32 {
        let spec = match self.registry.lookup(selector) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(selector, "Unknown namespace selector");
                let _ = writeln!(out, "{e}");
                return EXIT_FAILURE;
            }
        };

        info!(namespace = %spec.kind(), "Running probe");

        let status = spec.probe().run(out);
        let _ = out.flush();

        info!(namespace = %spec.kind(), status, "Probe finished");
        status
    }

    /// Launch one child per registry entry and collect their outcomes
    ///
    /// A child that fails to start or exits non-zero is reported and the
    /// remaining entries still run.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, `out` cannot be
    /// written, or a launch task panics
    pub async fn run_parent(&self, out: &mut dyn Write) -> Result<RunSummary> {
        self.config.validate()?;

        info!(
            children = self.registry.entries().len(),
            parallel = self.config.parallel,
            "Starting parent run"
        );

        let mut summary = RunSummary::default();

        if self.config.parallel {
            let mut pending = Vec::new();
            for invocation in self.invocations() {
                let command_line = invocation.command_line();
                let namespace = invocation.namespace;

                writeln!(out, "Running {command_line}")?;
                out.flush()?;

                pending.push((command_line, namespace, self.spawn(invocation)));
            }

            for (command_line, namespace, handle) in pending {
                let outcome = ChildOutcome::from(handle.await?);
                Self::report(out, &command_line, &outcome)?;
                summary.children.push(ChildReport { namespace, outcome });
            }
        } else {
            for invocation in self.invocations() {
                let command_line = invocation.command_line();
                let namespace = invocation.namespace;

                writeln!(out, "Running {command_line}")?;
                out.flush()?;

                let outcome = ChildOutcome::from(self.spawn(invocation).await?);
                Self::report(out, &command_line, &outcome)?;
                summary.children.push(ChildReport { namespace, outcome });
            }
        }

        let failed = summary.failures().count();
        if failed == 0 {
            info!("All children succeeded");
        } else {
            warn!(failed, "Some children failed");
        }

        Ok(summary)
    }

    fn invocations(&self) -> Vec<ChildInvocation> {
        self.registry
            .entries()
            .iter()
            .map(|spec| ChildInvocation::for_spec(spec, &self.config.self_exe))
            .collect()
    }

    /// Launch on the blocking pool; waitpid blocks the calling thread
    fn spawn(&self, invocation: ChildInvocation) -> JoinHandle<Result<ChildExit>> {
        let launcher = Arc::clone(&self.launcher);
        tokio::task::spawn_blocking(move || launcher.launch(&invocation))
    }

    fn report(out: &mut dyn Write, command_line: &str, outcome: &ChildOutcome) -> Result<()> {
        if !outcome.success() {
            warn!(command = command_line, %outcome, "Subprocess failed");
            writeln!(out, "Error running subprocess '{command_line}': {outcome}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsprobe_core::Error;

    #[test]
    fn test_outcome_from_launch_result() {
        assert_eq!(
            ChildOutcome::from(Ok(ChildExit::Exited { code: 0 })),
            ChildOutcome::Exited { code: 0 }
        );

        let failed = ChildOutcome::from(Err(Error::Launch {
            namespace: "net".to_string(),
            message: "clone failed: EPERM".to_string(),
        }));
        assert!(!failed.success());
        assert!(failed.to_string().contains("EPERM"));
    }

    #[test]
    fn test_summary_exit_code() {
        let summary = RunSummary {
            children: vec![
                ChildReport {
                    namespace: NamespaceKind::Net,
                    outcome: ChildOutcome::Exited { code: 0 },
                },
                ChildReport {
                    namespace: NamespaceKind::Uts,
                    outcome: ChildOutcome::Signaled { signal: 9 },
                },
            ],
        };

        assert!(!summary.all_succeeded());
        assert_eq!(summary.failures().count(), 1);
        assert_eq!(summary.exit_code(false), 0);
        assert_eq!(summary.exit_code(true), 1);
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = RunSummary {
            children: vec![ChildReport {
                namespace: NamespaceKind::Mount,
                outcome: ChildOutcome::Exited { code: 1 },
            }],
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["children"][0]["namespace"], "mount");
        assert_eq!(json["children"][0]["outcome"], "exited");
        assert_eq!(json["children"][0]["code"], 1);
    }
}
