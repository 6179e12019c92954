//! Kasa-Link CLI - register, discover and switch Kasa smart plugs on the
//! local network.
//!
//! The registry lives in a local SQLite file; every network command makes at
//! most one attempt per device and is bounded by the configured timeout.

mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use kasa_link_core::PowerCommand;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::{exit_codes, CliError};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and --version go to stdout and succeed; keep clap's usage
            // errors off the Unreachable exit code.
            let code = if e.use_stderr() {
                exit_codes::INVALID_ARGS
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("Error [{}]: {}", e.kind_label(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Version needs neither configuration nor the registry.
    if let Commands::Version = cli.command {
        return commands::run_version(cli.json);
    }

    let settings = config::load(&cli)?;
    let dispatcher = commands::open_dispatcher(&settings)?;
    let json = cli.json;

    match cli.command {
        Commands::Register(args) => commands::run_register(&dispatcher, args, json),
        Commands::List(args) => commands::run_list(&dispatcher, args, json),
        Commands::Show(args) => commands::run_show(&dispatcher, args, json),
        Commands::PowerOn(args) => {
            commands::run_power(&dispatcher, args, PowerCommand::PowerOn, json).await
        }
        Commands::PowerOff(args) => {
            commands::run_power(&dispatcher, args, PowerCommand::PowerOff, json).await
        }
        Commands::Refresh(args) => {
            commands::run_power(&dispatcher, args, PowerCommand::Refresh, json).await
        }
        Commands::Remove(args) => commands::run_remove(&dispatcher, args, json).await,
        Commands::Sweep(args) => commands::run_sweep(&dispatcher, &settings, args, json).await,
        Commands::Version => commands::run_version(json),
    }
}
