//! nsprobe CLI
//!
//! Demonstrates Linux namespace isolation: the binary re-executes itself once
//! per namespace kind, each child created inside a brand-new namespace.

use anyhow::{Context, Result};
use clap::Parser;
use nsprobe_core::EXIT_FAILURE;
use nsprobe_namespace::{DispatchConfig, Dispatcher, Registry};
use std::io;
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    // Parse command-line arguments; usage errors share the exit status of an unknown namespace
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(EXIT_FAILURE);
        }
    };

    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            EXIT_FAILURE
        }
    };

    process::exit(code);
}

/// Log to stderr so probe output on stdout stays clean; `RUST_LOG` wins
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.namespace.as_deref() {
        Some(selector) if cli.has_parent_flags() => {
            debug!(selector, "Parent-only flags are ignored in child mode");
        }
        None if !nix::unistd::geteuid().is_root() => {
            warn!("Not running as root: creating namespaces will likely be refused");
        }
        _ => {}
    }

    let config = DispatchConfig::new()
        .with_parallel(cli.parallel)
        .with_strict(cli.strict);
    let dispatcher = Dispatcher::new(Registry::builtin(), config);

    let mut stdout = io::stdout();
    let outcome = dispatcher.run(cli.namespace.as_deref(), &mut stdout).await;

    if cli.json {
        if let Some(summary) = &outcome.summary {
            let json =
                serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
            println!("{json}");
        }
    }

    Ok(outcome.exit_code)
}
