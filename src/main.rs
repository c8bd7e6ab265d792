//! envdeps CLI entry point
//!
//! Parses arguments, installs the tracing subscriber, runs the command and
//! renders errors with suggestions:
//! - `resolve` - Resolve a template's dependency closure
//! - `graph` - Show the build order or dependency tree
//! - `analyze` - Summarise dependency status
//! - `validate` - Fail unless a template is buildable

use anyhow::Result;
use clap::Parser;
use envdeps::cli::Cli;
use envdeps::core::user_friendly_error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber.
///
/// `--verbose` selects debug logging, `--quiet` disables logging, and
/// otherwise `RUST_LOG` applies with `envdeps=info` as the default.
fn init_tracing(cli: &Cli) {
    let Some(directive) = cli.log_filter() else {
        return;
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("envdeps=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
