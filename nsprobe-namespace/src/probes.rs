//! Probes that report the state of one namespace from the inside
//!
//! Each probe writes human-readable lines to the given writer. Failures are
//! first-attempt-terminal: the error text is written out and the probe
//! reports [`EXIT_FAILURE`].

use nsprobe_core::{EXIT_FAILURE, EXIT_SUCCESS, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::host::Host;

/// A routine run once inside a freshly created namespace
pub trait Probe: Send + Sync {
    /// Run the probe, writing its report to `out`
    fn execute(&self, out: &mut dyn Write) -> Result<()>;

    /// Run the probe and turn the outcome into a process exit status
    fn run(&self, out: &mut dyn Write) -> i32 {
        match self.execute(out) {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                error!(error = %e, "Probe failed");
                let _ = writeln!(out, "{e}");
                EXIT_FAILURE
            }
        }
    }
}

/// Lists the network interfaces visible in the namespace
pub struct InterfacesProbe {
    host: Arc<dyn Host>,
}

impl InterfacesProbe {
    /// Create a probe over `host`
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Probe for InterfacesProbe {
    fn execute(&self, out: &mut dyn Write) -> Result<()> {
        let interfaces = self.host.interfaces()?;
        debug!(count = interfaces.len(), "Listed interfaces");

        for name in &interfaces {
            writeln!(out, "Found interface {name}")?;
        }

        Ok(())
    }
}

/// Prints the PID of the process as seen from inside its PID namespace
pub struct ProcessIdProbe {
    host: Arc<dyn Host>,
}

impl ProcessIdProbe {
    /// Create a probe over `host`
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Probe for ProcessIdProbe {
    fn execute(&self, out: &mut dyn Write) -> Result<()> {
        let pid = self.host.pid()?;
        writeln!(out, "Current process ID is {pid}")?;
        Ok(())
    }
}

/// Sets the hostname, then reads it back
pub struct HostnameProbe {
    host: Arc<dyn Host>,
    hostname: String,
}

impl HostnameProbe {
    /// Create a probe that sets `hostname` on `host`
    #[must_use]
    pub fn new(host: Arc<dyn Host>, hostname: impl Into<String>) -> Self {
        Self {
            host,
            hostname: hostname.into(),
        }
    }
}

impl Probe for HostnameProbe {
    fn execute(&self, out: &mut dyn Write) -> Result<()> {
        self.host.set_hostname(&self.hostname)?;
        let current = self.host.hostname()?;
        writeln!(out, "Current hostname is {current}")?;
        Ok(())
    }
}

/// Mounts a tmpfs on a scratch directory and shows the mount table around it
///
/// The directory is created by the probe and removed again before it
/// returns. It must not exist beforehand.
pub struct MountProbe {
    host: Arc<dyn Host>,
    scratch_dir: PathBuf,
}

impl MountProbe {
    /// Create a probe that uses `scratch_dir` as its mount point
    #[must_use]
    pub fn new(host: Arc<dyn Host>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Mount point used by this probe
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    fn print_mounts(&self, out: &mut dyn Write) -> Result<()> {
        let table = self.host.mount_table()?;
        write!(out, "{table}")?;
        if !table.ends_with('\n') {
            writeln!(out)?;
        }
        Ok(())
    }

    fn show_after(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "After mounting:")?;
        self.print_mounts(out)
    }

    /// Best-effort removal of what an aborted run left behind
    fn discard(&self, mounted: bool) {
        let dir = self.scratch_dir();

        if mounted {
            if let Err(e) = self.host.unmount(dir) {
                warn!(dir = %dir.display(), error = %e, "Cleanup: could not unmount scratch dir");
                return;
            }
        }

        if let Err(e) = self.host.remove_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "Cleanup: could not remove scratch dir");
        }
    }
}

impl Probe for MountProbe {
    fn execute(&self, out: &mut dyn Write) -> Result<()> {
        let dir = self.scratch_dir();

        writeln!(out, "Before mounting:")?;
        self.print_mounts(out)?;

        // keep the scratch mount out of the parent's namespace on shared-propagation hosts
        self.host.make_root_private()?;
        self.host.create_dir(dir)?;

        if let Err(e) = self.host.mount_tmpfs(dir) {
            self.discard(false);
            return Err(e);
        }

        if let Err(e) = self.show_after(out) {
            self.discard(true);
            return Err(e);
        }

        self.host.unmount(dir)?;
        self.host.remove_dir(dir)?;

        debug!(dir = %dir.display(), "Scratch mount removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostOp, MockHost};

    fn output(probe: &dyn Probe) -> (i32, String) {
        let mut buf: Vec<u8> = Vec::new();
        let status = probe.run(&mut buf);
        (status, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_interfaces_probe_lists_every_interface() {
        let host = MockHost::new().with_interfaces(["lo", "eth0"]);
        let (status, text) = output(&InterfacesProbe::new(Arc::new(host)));

        assert_eq!(status, 0);
        assert_eq!(text, "Found interface lo\nFound interface eth0\n");
    }

    #[test]
    fn test_pid_probe() {
        let host = MockHost::new().with_pid(1);
        let (status, text) = output(&ProcessIdProbe::new(Arc::new(host)));

        assert_eq!(status, 0);
        assert_eq!(text, "Current process ID is 1\n");
    }

    #[test]
    fn test_hostname_probe_failure_prints_error() {
        let host = MockHost::new();
        host.fail_on(HostOp::SetHostname);

        let (status, text) = output(&HostnameProbe::new(Arc::new(host), "box"));
        assert_eq!(status, 1);
        assert!(text.contains("sethostname failed"));
    }

    #[test]
    fn test_mount_probe_cleans_up_after_failed_listing() {
        let host = MockHost::new();
        // the listing taken once the tmpfs is mounted
        host.fail_on_call(HostOp::MountTable, 2);

        let (status, text) = output(&MountProbe::new(Arc::new(host.clone()), "/scratch"));
        assert_eq!(status, 1);
        assert!(text.starts_with("Before mounting:\n"));
        assert!(text.contains("After mounting:\n"));
        assert!(text.contains("read mount table failed: injected failure"));

        assert!(!host.is_mounted(Path::new("/scratch")));
        assert!(!host.has_dir(Path::new("/scratch")));
    }

    #[test]
    fn test_mount_probe_removes_dir_when_mount_fails() {
        let host = MockHost::new();
        host.fail_on(HostOp::MountTmpfs);

        let (status, _) = output(&MountProbe::new(Arc::new(host.clone()), "/scratch"));
        assert_eq!(status, 1);
        assert!(!host.has_dir(Path::new("/scratch")));
    }
}
