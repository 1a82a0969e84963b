//! `portal` command-line entry point.
//!
//! # Responsibility
//! - Load configuration and start logging before any command runs.
//! - Run the ETL, print reports, answer questions, or serve HTTP.
//! - Map failures to a non-zero exit status.

mod server;

use clap::{Parser, Subcommand};
use log::{error, warn};
use portal_core::db::open_db;
use portal_core::reasoning::HttpReasoningClient;
use portal_core::repo::unified_repo::SqliteUnifiedRepository;
use portal_core::service::load_service::UnificationLoader;
use portal_core::{
    core_version, default_log_level, init_logging, run_etl, PortalConfig, PortalFacade,
    UnifiedStore,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "portal", version, about = "Unified department portal")]
struct Cli {
    /// Path to a TOML config file (defaults to ./portal.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the unified store from the upstream feeds.
    Etl,
    /// Print the blocked-task report as JSON.
    Report,
    /// Answer a natural-language question over the unified store.
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Serve the portal over HTTP.
    Serve {
        /// Overrides `server.bind` from config.
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Print the core version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Command::Version = cli.command {
        println!("portal_core version={}", core_version());
        return ExitCode::SUCCESS;
    }

    let config = match PortalConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("portal: {err}");
            return ExitCode::from(2);
        }
    };

    let level = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &config.logging.dir, true) {
        eprintln!("portal: logging disabled: {err}");
    }

    let result = match cli.command {
        Command::Etl => run_etl_command(&config),
        Command::Report => print_json(&build_facade(&config).blocked_task_report()),
        Command::Ask { question } => print_json(&build_facade(&config).ask(&question.join(" "))),
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(&bind, &build_facade(&config))
        }
        Command::Version => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("portal: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_etl_command(config: &PortalConfig) -> Result<(), String> {
    let sources = config.domain_sources().map_err(|err| err.to_string())?;
    let mut conn = open_db(&config.database_path).map_err(|err| err.to_string())?;
    let repo = SqliteUnifiedRepository::try_new(&mut conn).map_err(|err| err.to_string())?;
    let mut loader = UnificationLoader::new(repo);

    match run_etl(&sources, &mut loader) {
        Ok(summary) => print_json(&summary),
        Err(err) => Err(format!("{} ({})", err, err.code())),
    }
}

fn build_facade(config: &PortalConfig) -> PortalFacade<HttpReasoningClient> {
    let reasoning = match HttpReasoningClient::new(config.reasoning_client_config()) {
        Ok(client) => Some(client),
        Err(err) => {
            warn!("event=reasoning_init module=cli status=error error={err}");
            None
        }
    };
    PortalFacade::new(UnifiedStore::new(&config.database_path), reasoning)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|err| {
        error!("event=cli_output module=cli status=error error={err}");
        err.to_string()
    })?;
    println!("{text}");
    Ok(())
}
