//! CLI entry point for the napkin tool.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use napkin_core::{ApiError, ClientConfig, ConfigError, ErrorKind, NapkinClient, ValidationError};
use tracing::debug;

mod app;
mod cli;
mod commands;

use cli::{Args, Command};

/// Exit status for invalid input or configuration.
const EXIT_INVALID: u8 = 2;
/// Exit status for a rejected credential.
const EXIT_AUTH: u8 = 3;
/// Exit status for a job that failed, expired, or does not exist.
const EXIT_JOB: u8 = 4;
/// Exit status for timeouts, exhausted retries, and rate limiting.
const EXIT_UNAVAILABLE: u8 = 5;
/// Exit status for a failure while writing files.
const EXIT_DOWNLOAD: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(exit_code(&error))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ClientConfig::from_env()?;
    let client = NapkinClient::new(config)?;
    let show_spinner = !args.quiet && io::stderr().is_terminal();

    match &args.command {
        Command::Generate(generate) => {
            commands::run_generate_command(&client, generate, show_spinner).await
        }
        Command::Status(status) => commands::run_status_command(&client, status).await,
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(api) = error.downcast_ref::<ApiError>() {
        return match api.kind() {
            ErrorKind::InvalidRequest | ErrorKind::UnexpectedResponse => EXIT_INVALID,
            ErrorKind::Authentication => EXIT_AUTH,
            ErrorKind::JobFailed | ErrorKind::Expired | ErrorKind::NotFound => EXIT_JOB,
            ErrorKind::PollTimeout | ErrorKind::Transient | ErrorKind::RateLimited => {
                EXIT_UNAVAILABLE
            }
            ErrorKind::Download => EXIT_DOWNLOAD,
        };
    }
    if error.is::<ConfigError>() || error.is::<ValidationError>() {
        return EXIT_INVALID;
    }
    1
}
