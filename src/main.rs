mod backend;
mod cli;
mod model;
mod orchestrator;
mod session;
mod text_summary;
mod timerange;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Log to stderr so stdout stays clean for results. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_json = args.json;
    init_tracing(args.verbose);

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // In JSON mode the result document already carries the error.
            if is_json {
                eprintln!("{e:#}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
