use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};

use sched_core::ids::MessageId;
use sched_core::security::{GatewayCredentials, WebhookKey};
use sched_core::SmsGateway;
use sched_engine::{BroadcastScheduler, RandomSelector, SchedulerConfig, TickOutcome};
use sched_gateway::{TelerivetClient, TelerivetConfig};
use sched_server::{AppState, ServerConfig, ShutdownCoordinator};
use sched_settings::SchedSettings;
use sched_store::{ContactRepo, Database, MessageRepo};
use sched_telemetry::{LogQuery, MetricsRecorder, TelemetryGuard};

use crate::cli::{ContactsCommand, MessagesCommand};

fn open_database(settings: &SchedSettings) -> anyhow::Result<Database> {
    Database::open_url(&settings.database_url)
        .with_context(|| format!("failed to open database {}", settings.database_url))
}

fn build_gateway(settings: &SchedSettings) -> anyhow::Result<Arc<dyn SmsGateway>> {
    settings.require_gateway()?;
    let config = TelerivetConfig::new(GatewayCredentials::new(
        settings.gateway.project_id.clone(),
        settings.gateway.secret_key.clone(),
    ))
    .with_base_url(settings.gateway.base_url.clone())
    .with_timeout(Duration::from_secs(settings.gateway.timeout_secs));
    let client = TelerivetClient::new(config).context("invalid gateway configuration")?;
    Ok(Arc::new(client))
}

fn build_scheduler(
    settings: &SchedSettings,
    db: &Database,
    metrics: Arc<MetricsRecorder>,
) -> anyhow::Result<Arc<BroadcastScheduler>> {
    let gateway = build_gateway(settings)?;
    let selector = Arc::new(RandomSelector::new(MessageRepo::new(db.clone())));
    Ok(Arc::new(BroadcastScheduler::new(
        ContactRepo::new(db.clone()),
        selector,
        gateway,
        metrics,
        SchedulerConfig::from(&settings.broadcast),
    )))
}

/// Webhook server plus broadcast loop until ctrl+c.
pub(crate) async fn serve(settings: SchedSettings, telemetry: &TelemetryGuard) -> anyhow::Result<()> {
    settings.require_webhook()?;
    let db = open_database(&settings)?;
    let metrics = telemetry.metrics();
    let scheduler = build_scheduler(&settings, &db, metrics.clone())?;

    let coordinator = ShutdownCoordinator::new();
    let state = AppState::new(
        db.clone(),
        WebhookKey::new(settings.webhook.key.clone()),
        metrics,
    );
    let server = sched_server::start(
        ServerConfig::from(&settings.server),
        state,
        coordinator.token(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to bind {}:{}",
            settings.server.host, settings.server.port
        )
    })?;

    info!(
        addr = %server.addr,
        interval_hours = settings.broadcast.interval_hours,
        mode = ?settings.broadcast.mode,
        "sched ready"
    );

    coordinator.track("webhook-server", server.into_task());
    coordinator.track("broadcast-scheduler", scheduler.spawn(coordinator.token()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    info!("shutdown requested");

    let aborted = coordinator
        .shutdown(Some(Duration::from_secs(settings.server.shutdown_timeout_secs)))
        .await;
    if !aborted.is_empty() {
        warn!(tasks = ?aborted, "tasks aborted during shutdown");
    }
    drop(db);
    info!("shutdown complete");
    Ok(())
}

/// Run a single broadcast tick and print its summary.
pub(crate) async fn broadcast(settings: SchedSettings, telemetry: &TelemetryGuard) -> anyhow::Result<()> {
    let db = open_database(&settings)?;
    let scheduler = build_scheduler(&settings, &db, telemetry.metrics())?;

    match scheduler.tick().await? {
        TickOutcome::Completed(summary) => {
            println!(
                "tick {}: {} contacts, {} delivered, {} failed, {} skipped",
                summary.tick_id, summary.contacts, summary.delivered, summary.failed, summary.skipped
            );
        }
        TickOutcome::Overlapped => bail!("a broadcast is already running"),
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SeedReport {
    pub inserted: usize,
    pub rejected: usize,
}

/// Insert one message per non-empty line. Lines the pool refuses are
/// reported and skipped.
pub(crate) fn seed_messages(repo: &MessageRepo, content: &str) -> SeedReport {
    let mut report = SeedReport::default();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match repo.insert(line) {
            Ok(_) => report.inserted += 1,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping seed line");
                report.rejected += 1;
            }
        }
    }
    report
}

pub(crate) fn seed(settings: &SchedSettings, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let repo = MessageRepo::new(open_database(settings)?);
    let report = seed_messages(&repo, &content);
    println!(
        "seeded {} messages ({} rejected)",
        report.inserted, report.rejected
    );
    Ok(())
}

pub(crate) fn messages(settings: &SchedSettings, command: MessagesCommand) -> anyhow::Result<()> {
    let repo = MessageRepo::new(open_database(settings)?);
    match command {
        MessagesCommand::List => {
            for row in repo.list()? {
                println!("{}\t{}", row.id, row.text.replace('\n', " "));
            }
        }
        MessagesCommand::Add { text } => {
            let row = repo.insert(&text)?;
            println!("{}", row.id);
        }
        MessagesCommand::Remove { id } => {
            repo.remove(&MessageId::from_raw(id))?;
        }
    }
    Ok(())
}

pub(crate) fn contacts(settings: &SchedSettings, command: ContactsCommand) -> anyhow::Result<()> {
    let repo = ContactRepo::new(open_database(settings)?);
    match command {
        ContactsCommand::List => {
            for row in repo.list_all()? {
                println!("{}\t{}\t{}", row.id, row.phone, row.created_at);
            }
        }
    }
    Ok(())
}

pub(crate) fn logs(telemetry: &TelemetryGuard, query: LogQuery) -> anyhow::Result<()> {
    let Some(sink) = telemetry.logs() else {
        bail!("log persistence is disabled (SCHED_LOG_DB is empty)");
    };
    for record in sink.query(&query)? {
        let mut line = format!(
            "{} {:<5} {} {}",
            record.timestamp, record.level, record.target, record.message
        );
        if let Some(phone) = &record.phone {
            line.push_str(&format!(" phone={phone}"));
        }
        if let Some(tick_id) = &record.tick_id {
            line.push_str(&format!(" tick={tick_id}"));
        }
        if let Some(fields) = &record.fields {
            line.push(' ');
            line.push_str(fields);
        }
        println!("{line}");
    }
    Ok(())
}
