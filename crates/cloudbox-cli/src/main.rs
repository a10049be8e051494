//! Cloudbox CLI - Command-line client for a self-hosted private cloud
//!
//! Browse, upload, share and manage files stored on a Cloudbox server.
//!
//! ## Quick Start
//!
//! ```bash
//! # Sign in and keep the token
//! cloudbox login alice --remember
//!
//! # Upload three files at a time, in order
//! cloudbox upload ./photos/*.jpg
//!
//! # Share a file for three days
//! cloudbox share create 42 --days 3
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::struct_excessive_bools)]

use std::process::ExitCode;

use clap::Parser;

mod commands;
pub mod ui;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(hint) = suggestion(&e) {
                eprintln!();
                eprintln!("  {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn suggestion(error: &anyhow::Error) -> Option<String> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<cloudbox_core::Error>())
        .and_then(cloudbox_core::Error::suggestion)
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "warn,cloudbox=debug,cloudbox_core=debug"
    } else {
        "warn,cloudbox=info,cloudbox_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
