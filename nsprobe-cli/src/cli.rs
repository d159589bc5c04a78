//! CLI argument definitions

use clap::Parser;

#[derive(Parser)]
#[command(name = "nsprobe")]
#[command(
    about = "Probe Linux namespace isolation by re-executing into fresh namespaces",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Namespace to probe in this process (net, pid, uts, mount).
    /// Without it, one child is launched per namespace.
    #[arg(value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Launch all children at once
    #[arg(long)]
    pub parallel: bool,

    /// Exit with status 1 if any child failed
    #[arg(long)]
    pub strict: bool,

    /// Print a JSON summary of the children after the run
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Whether any parent-only flag was given
    pub fn has_parent_flags(&self) -> bool {
        self.parallel || self.strict || self.json
    }
}
