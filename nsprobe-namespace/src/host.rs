//! Host trait for pluggable OS access
//!
//! Probes never call the kernel directly. They go through a [`Host`], which
//! lets the same probe code run against:
//! - [`LinuxHost`] - the real system calls
//! - [`MockHost`] - an in-memory host with fault injection for tests

use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nsprobe_core::{Error, ProcessId, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Where the kernel publishes the calling process's mount table
const MOUNTS_PATH: &str = "/proc/self/mounts";

/// OS operations the probes rely on
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the registry shares one host
/// between all probes.
pub trait Host: Send + Sync {
    /// Names of the network interfaces visible to this process
    fn interfaces(&self) -> Result<Vec<String>>;

    /// PID of this process in its own PID namespace
    fn pid(&self) -> Result<ProcessId>;

    /// Set the UTS hostname
    fn set_hostname(&self, name: &str) -> Result<()>;

    /// Read the UTS hostname
    fn hostname(&self) -> Result<String>;

    /// Raw mount table of this process
    fn mount_table(&self) -> Result<String>;

    /// Stop mount events propagating from this mount namespace to its peers
    fn make_root_private(&self) -> Result<()>;

    /// Create a directory that must not already exist
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Mount an empty tmpfs on `target`
    fn mount_tmpfs(&self, target: &Path) -> Result<()>;

    /// Lazily detach the mount at `target`
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// Host backed by the running kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxHost;

impl Host for LinuxHost {
    fn interfaces(&self) -> Result<Vec<String>> {
        let interfaces =
            nix::net::if_::if_nameindex().map_err(|e| Error::probe("if_nameindex", e))?;

        Ok(interfaces
            .iter()
            .map(|iface| iface.name().to_string_lossy().into_owned())
            .collect())
    }

    fn pid(&self) -> Result<ProcessId> {
        Ok(ProcessId::current())
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        tracing::debug!(hostname = %name, "Setting hostname");
        nix::unistd::sethostname(name).map_err(|e| Error::probe("sethostname", e))
    }

    fn hostname(&self) -> Result<String> {
        let name = nix::unistd::gethostname().map_err(|e| Error::probe("gethostname", e))?;
        Ok(name.to_string_lossy().into_owned())
    }

    fn mount_table(&self) -> Result<String> {
        fs::read_to_string(MOUNTS_PATH).map_err(|e| Error::probe(format!("read {MOUNTS_PATH}"), e))
    }

    fn make_root_private(&self) -> Result<()> {
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| Error::probe("make / private", e))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::DirBuilder::new()
            .mode(0o755)
            .create(path)
            .map_err(|e| Error::probe(format!("mkdir {}", path.display()), e))
    }

    fn mount_tmpfs(&self, target: &Path) -> Result<()> {
        tracing::debug!(target = %target.display(), "Mounting tmpfs");
        mount(
            Some("tmpfs"),
            target,
            Some("tmpfs"),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(|e| Error::probe(format!("mount tmpfs on {}", target.display()), e))
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        tracing::debug!(target = %target.display(), "Unmounting");
        umount2(target, MntFlags::MNT_DETACH)
            .map_err(|e| Error::probe(format!("umount {}", target.display()), e))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| Error::probe(format!("rmdir {}", path.display()), e))
    }
}

/// Host operations that [`MockHost`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    /// [`Host::interfaces`]
    Interfaces,
    /// [`Host::pid`]
    Pid,
    /// [`Host::set_hostname`]
    SetHostname,
    /// [`Host::hostname`]
    Hostname,
    /// [`Host::mount_table`]
    MountTable,
    /// [`Host::make_root_private`]
    MakeRootPrivate,
    /// [`Host::create_dir`]
    CreateDir,
    /// [`Host::mount_tmpfs`]
    MountTmpfs,
    /// [`Host::unmount`]
    Unmount,
    /// [`Host::remove_dir`]
    RemoveDir,
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interfaces => "if_nameindex",
            Self::Pid => "getpid",
            Self::SetHostname => "sethostname",
            Self::Hostname => "gethostname",
            Self::MountTable => "read mount table",
            Self::MakeRootPrivate => "make / private",
            Self::CreateDir => "mkdir",
            Self::MountTmpfs => "mount tmpfs",
            Self::Unmount => "umount",
            Self::RemoveDir => "rmdir",
        };
        f.write_str(name)
    }
}

/// In-memory host for testing (doesn't touch the system)
///
/// # Example
/// ```
/// use nsprobe_namespace::{Host, HostOp, MockHost};
///
/// let host = MockHost::new();
/// host.set_hostname("box").unwrap();
/// assert_eq!(host.hostname().unwrap(), "box");
///
/// host.fail_on(HostOp::Hostname);
/// assert!(host.hostname().is_err());
/// ```
#[derive(Clone)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    interfaces: Vec<String>,
    pid: ProcessId,
    hostname: String,
    base_mounts: Vec<String>,
    dirs: BTreeSet<PathBuf>,
    mounts: Vec<PathBuf>,
    root_private: bool,
    failures: HashSet<HostOp>,
    failing_calls: HashSet<(HostOp, usize)>,
    op_calls: HashMap<HostOp, usize>,
    call_count: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            interfaces: vec!["lo".to_string()],
            pid: ProcessId::from_raw(1),
            hostname: "host".to_string(),
            base_mounts: vec![
                "/dev/root / ext4 rw,relatime 0 0".to_string(),
                "proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0".to_string(),
            ],
            dirs: BTreeSet::new(),
            mounts: Vec::new(),
            root_private: false,
            failures: HashSet::new(),
            failing_calls: HashSet::new(),
            op_calls: HashMap::new(),
            call_count: 0,
        }
    }
}

impl MockHost {
    /// Create a healthy mock host with a single loopback interface and PID 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Replace the visible interfaces
    #[must_use]
    pub fn with_interfaces<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().interfaces = names.into_iter().map(Into::into).collect();
        self
    }

    /// Report a different PID
    #[must_use]
    pub fn with_pid(self, pid: i32) -> Self {
        self.lock().pid = ProcessId::from_raw(pid);
        self
    }

    /// Pretend a directory already exists
    #[must_use]
    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.lock().dirs.insert(path.into());
        self
    }

    /// Make every later call to `op` fail
    pub fn fail_on(&self, op: HostOp) {
        self.lock().failures.insert(op);
    }

    /// Make only the `nth` call to `op` fail, counting from 1
    pub fn fail_on_call(&self, op: HostOp, nth: usize) {
        self.lock().failing_calls.insert((op, nth));
    }

    /// Number of host calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().call_count
    }

    /// Whether `path` currently exists
    #[must_use]
    pub fn has_dir(&self, path: &Path) -> bool {
        self.lock().dirs.contains(path)
    }

    /// Whether a tmpfs is mounted on `path`
    #[must_use]
    pub fn is_mounted(&self, path: &Path) -> bool {
        self.lock().mounts.iter().any(|m| m == path)
    }

    /// Whether root propagation was made private
    #[must_use]
    pub fn root_is_private(&self) -> bool {
        self.lock().root_private
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply any injected failure
    fn enter(&self, op: HostOp) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.call_count += 1;
        let nth = {
            let calls = state.op_calls.entry(op).or_insert(0);
            *calls += 1;
            *calls
        };

        if state.failures.contains(&op) || state.failing_calls.contains(&(op, nth)) {
            tracing::debug!(%op, "Mock: injected failure");
            return Err(Error::probe(op.to_string(), "injected failure"));
        }

        Ok(state)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHost").finish_non_exhaustive()
    }
}

impl Host for MockHost {
    fn interfaces(&self) -> Result<Vec<String>> {
        Ok(self.enter(HostOp::Interfaces)?.interfaces.clone())
    }

    fn pid(&self) -> Result<ProcessId> {
        Ok(self.enter(HostOp::Pid)?.pid)
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        self.enter(HostOp::SetHostname)?.hostname = name.to_string();
        Ok(())
    }

    fn hostname(&self) -> Result<String> {
        Ok(self.enter(HostOp::Hostname)?.hostname.clone())
    }

    fn mount_table(&self) -> Result<String> {
        let state = self.enter(HostOp::MountTable)?;

        let mut table = String::new();
        for line in &state.base_mounts {
            table.push_str(line);
            table.push('\n');
        }
        for target in &state.mounts {
            table.push_str(&format!("tmpfs {} tmpfs rw,relatime 0 0\n", target.display()));
        }

        Ok(table)
    }

    fn make_root_private(&self) -> Result<()> {
        self.enter(HostOp::MakeRootPrivate)?.root_private = true;
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.enter(HostOp::CreateDir)?;
        if !state.dirs.insert(path.to_path_buf()) {
            return Err(Error::probe(
                format!("mkdir {}", path.display()),
                "EEXIST: File exists",
            ));
        }
        Ok(())
    }

    fn mount_tmpfs(&self, target: &Path) -> Result<()> {
        let mut state = self.enter(HostOp::MountTmpfs)?;
        if !state.dirs.contains(target) {
            return Err(Error::probe(
                format!("mount tmpfs on {}", target.display()),
                "ENOENT: No such file or directory",
            ));
        }
        state.mounts.push(target.to_path_buf());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        let mut state = self.enter(HostOp::Unmount)?;
        let Some(index) = state.mounts.iter().rposition(|m| m == target) else {
            return Err(Error::probe(
                format!("umount {}", target.display()),
                "EINVAL: Invalid argument",
            ));
        };
        state.mounts.remove(index);
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.enter(HostOp::RemoveDir)?;
        if state.mounts.iter().any(|m| m == path) {
            return Err(Error::probe(
                format!("rmdir {}", path.display()),
                "EBUSY: Device or resource busy",
            ));
        }
        if !state.dirs.remove(path) {
            return Err(Error::probe(
                format!("rmdir {}", path.display()),
                "ENOENT: No such file or directory",
            ));
        }
        Ok(())
    }
}
