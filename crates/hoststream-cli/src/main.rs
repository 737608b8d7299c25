//! `hoststream`: decode captured data streams and run a few operations
//! against a host.
//!
//! ```bash
//! # Explain a captured frame
//! hoststream decode 0000001c0000e009000000000000000100087003 0102030405060708
//!
//! # Sign on and list a directory
//! HOSTSTREAM_PASSWORD=secret hoststream --host as400 --user bob ls /home/bob
//! ```

use std::{io::Write, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod decode;
mod error;

use crate::{commands::Cli, error::CliError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "hoststream=debug,hoststream_client=debug" } else { "warn" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        },
    }
}

fn report(err: &CliError) {
    tracing::debug!(error = ?err, "command failed");
    let _ = writeln!(std::io::stderr().lock(), "hoststream: {err}");
}
