mod cli;
mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use sched_settings::{load_settings, load_settings_from_path};
use sched_telemetry::{init_telemetry, LogQuery, TelemetryConfig};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;

    let log_db_path = Some(settings.logging.log_db_path.as_str())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    let telemetry = init_telemetry(TelemetryConfig {
        log_level: settings.logging.level.clone(),
        log_db_path,
        json: !cli.plain_logs,
    });

    tracing::debug!(?settings, "settings loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => commands::serve(settings, &telemetry).await,
        Command::Broadcast => commands::broadcast(settings, &telemetry).await,
        Command::Seed { file } => commands::seed(&settings, &file),
        Command::Messages { command } => commands::messages(&settings, command),
        Command::Contacts { command } => commands::contacts(&settings, command),
        Command::Logs {
            level,
            phone,
            tick,
            limit,
        } => commands::logs(
            &telemetry,
            LogQuery {
                level,
                phone,
                tick_id: tick,
                limit: Some(limit),
            },
        ),
    }
}
