// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ledgerwerk operator CLI for the tamper-evident audit store.
//
// Entry point. Initialises logging, opens the store, and runs one command.
// Exit status: 0 all chains intact, 1 integrity violation found, 2 error.

mod services;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgerwerk_core::LedgerError;
use ledgerwerk_core::error::Result;
use ledgerwerk_core::operator_errors::operator_message;
use ledgerwerk_store::{ChainCheckpoint, ChainVerification};

use services::app_services::AppServices;
use services::data_dir;

/// Ledgerwerk: tamper-evident encrypted audit store
#[derive(Parser)]
#[command(name = "ledgerwerk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding ledgerwerk.json and the record database
    #[arg(long, global = true, env = "LEDGERWERK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Master secret of the local key manager, 64 hex characters
    #[arg(long, env = "LEDGERWERK_MASTER_KEY", hide_env_values = true)]
    master_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify chain integrity for one process or all of them
    Verify {
        /// Only verify this process
        #[arg(short, long)]
        process: Option<String>,

        /// Report every inherited break instead of a summary line
        #[arg(long)]
        full_messages: bool,

        /// Also check the chain against a checkpoint file
        #[arg(long, value_name = "FILE", requires = "process")]
        against: Option<PathBuf>,
    },

    /// List processes in order of first appearance
    Processes,

    /// Print a tail checkpoint of a process as JSON
    Checkpoint {
        process: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the periodic chain validator until interrupted
    Watch {
        /// Append alerts as JSON lines to this file instead of logging them
        #[arg(long, value_name = "FILE")]
        outbox: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            let msg = operator_message(&e);
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}\n  {}", msg.message, msg.suggestion);
            ExitCode::from(2)
        }
    }
}

/// Run one command.  `Ok(false)` means an integrity violation was found.
fn run(cli: Cli) -> Result<bool> {
    let dir = data_dir::data_dir(cli.data_dir);
    let services = AppServices::init(dir, &cli.master_key)?;

    match cli.command {
        Commands::Verify {
            process,
            full_messages,
            against,
        } => verify(&services, process, !full_messages, against.as_deref()),
        Commands::Processes => {
            let store = services.store();
            let processes = store.list_processes()?;
            for pid in &processes {
                println!("{pid}");
            }
            eprintln!("{} processes, {} records", processes.len(), store.count()?);
            Ok(true)
        }
        Commands::Checkpoint { process, out } => {
            let checkpoint = services.store().checkpoint(&process)?;
            let json = serde_json::to_string_pretty(&checkpoint)?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
            Ok(true)
        }
        Commands::Watch { outbox } => watch(&services, outbox),
    }
}

fn verify(
    services: &AppServices,
    process: Option<String>,
    collapse: bool,
    against: Option<&Path>,
) -> Result<bool> {
    let store = services.store();
    let processes = match process {
        Some(pid) => vec![pid],
        None => store.list_processes()?,
    };

    let mut all_valid = true;
    for pid in &processes {
        let verification = match against {
            Some(path) => {
                let checkpoint: ChainCheckpoint =
                    serde_json::from_str(&std::fs::read_to_string(path)?)?;
                if checkpoint.process_id != *pid {
                    return Err(LedgerError::InvalidArgument(format!(
                        "checkpoint is for process {}, not {pid}",
                        checkpoint.process_id
                    )));
                }
                store.verify_against_checkpoint(&checkpoint)?
            }
            None => store.verify_chain(pid)?,
        };
        all_valid &= report(&verification, collapse);
    }

    if processes.is_empty() {
        println!("no processes recorded");
    }
    Ok(all_valid)
}

fn report(verification: &ChainVerification, collapse: bool) -> bool {
    let ok = verification.is_valid();
    let mark = if ok { "ok  " } else { "FAIL" };
    for line in verification.messages(collapse) {
        println!("{mark} {}: {line}", verification.process_id);
    }
    if let Err(e) = verification.ensure_intact() {
        println!("     {}", operator_message(&e).suggestion);
    }
    ok
}

fn watch(services: &AppServices, outbox: Option<PathBuf>) -> Result<bool> {
    let settings = services.config().validator.clone();
    if !settings.enabled {
        println!("validator disabled in {}", services.data_dir().display());
        return Ok(true);
    }

    let validator = std::sync::Arc::new(services.validator(outbox));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let handle = validator.spawn(settings.interval(), settings.run_on_start);
        tracing::info!(interval_secs = settings.interval().as_secs(), "watching, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        handle.shutdown().await
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn against_requires_process() {
        let parsed = Cli::try_parse_from([
            "ledgerwerk",
            "--master-key",
            "00",
            "verify",
            "--against",
            "cp.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn full_messages_flag_parses() {
        let cli = Cli::try_parse_from([
            "ledgerwerk",
            "--master-key",
            "00",
            "verify",
            "--process",
            "P1",
            "--full-messages",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Verify {
                full_messages: true,
                ref process,
                ..
            } if process.as_deref() == Some("P1")
        ));
    }
}
