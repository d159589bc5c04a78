//! Namespace registry: which flag creates each namespace and which probe runs inside it

use nix::sched::CloneFlags;
use nsprobe_core::{NamespaceKind, Result};
use std::fmt;
use std::sync::Arc;

use crate::config::ProbeConfig;
use crate::host::{Host, LinuxHost};
use crate::probes::{HostnameProbe, InterfacesProbe, MountProbe, ProcessIdProbe, Probe};

/// One registry entry
#[derive(Clone)]
pub struct NamespaceSpec {
    kind: NamespaceKind,
    flag: CloneFlags,
    probe: Arc<dyn Probe>,
}

impl NamespaceSpec {
    /// Pair `kind` with a probe; the isolation flag is derived from the kind
    #[must_use]
    pub fn new(kind: NamespaceKind, probe: Arc<dyn Probe>) -> Self {
        Self {
            kind,
            flag: kind.clone_flag(),
            probe,
        }
    }

    /// Namespace kind of this entry
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }

    /// Identifier passed to the child on the command line
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Flag applied when the child process is created
    #[must_use]
    pub const fn flag(&self) -> CloneFlags {
        self.flag
    }

    /// Probe to run inside the namespace
    #[must_use]
    pub fn probe(&self) -> &dyn Probe {
        self.probe.as_ref()
    }
}

impl fmt::Debug for NamespaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceSpec")
            .field("identifier", &self.identifier())
            .field("flag", &self.flag)
            .finish_non_exhaustive()
    }
}

/// Build the stock probe for `kind`
#[must_use]
pub fn builtin_probe(
    kind: NamespaceKind,
    host: Arc<dyn Host>,
    config: &ProbeConfig,
) -> Arc<dyn Probe> {
    match kind {
        NamespaceKind::Net => Arc::new(InterfacesProbe::new(host)),
        NamespaceKind::Pid => Arc::new(ProcessIdProbe::new(host)),
        NamespaceKind::Uts => Arc::new(HostnameProbe::new(host, config.hostname.clone())),
        NamespaceKind::Mount => Arc::new(MountProbe::new(host, config.scratch_dir.clone())),
    }
}

/// Immutable table of every namespace kind, built once at startup
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<NamespaceSpec>,
}

impl Registry {
    /// Registry with the stock probes running against the real kernel
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_host(Arc::new(LinuxHost), &ProbeConfig::default())
    }

    /// Registry with the stock probes running against `host`
    #[must_use]
    pub fn with_host(host: Arc<dyn Host>, config: &ProbeConfig) -> Self {
        Self::from_probes(|kind| builtin_probe(kind, Arc::clone(&host), config))
    }

    /// Registry whose probe for each kind is produced by `make_probe`
    #[must_use]
    pub fn from_probes<F>(mut make_probe: F) -> Self
    where
        F: FnMut(NamespaceKind) -> Arc<dyn Probe>,
    {
        let entries = NamespaceKind::ALL
            .into_iter()
            .map(|kind| NamespaceSpec::new(kind, make_probe(kind)))
            .collect();

        Self { entries }
    }

    /// Find the entry for `identifier`
    ///
    /// # Errors
    /// Returns [`nsprobe_core::Error::UnknownSelector`] if no entry matches
    pub fn lookup(&self, identifier: &str) -> Result<&NamespaceSpec> {
        let kind: NamespaceKind = identifier.parse()?;
        tracing::debug!(namespace = %kind, "Registry lookup");
        Ok(self.get(kind))
    }

    /// Entry for `kind`; every kind is always present
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> &NamespaceSpec {
        // ALL order is also the construction order
        &self.entries[kind as usize]
    }

    /// All entries in launch order
    #[must_use]
    pub fn entries(&self) -> &[NamespaceSpec] {
        &self.entries
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
