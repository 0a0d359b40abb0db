//! assist-router binary entry point.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use assist_router::cli::{Cli, execute};

#[allow(clippy::print_stdout)]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = execute(&cli).context("command failed")?;
    print!("{output}");
    Ok(())
}

/// Logs to stderr, filtered by `ASSIST_LOG` then `RUST_LOG`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "assist_router=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("ASSIST_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
