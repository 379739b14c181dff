//! Periodic broadcast: every period, send one message to every contact.
//!
//! Each firing snapshots the directory, picks a text (per contact or once per
//! tick) and hands it to the gateway. Failures for one contact are logged and
//! counted, then the tick moves on. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use sched_core::SmsGateway;
use sched_settings::{BroadcastMode, BroadcastSettings};
use sched_store::ContactRepo;
use sched_telemetry::MetricsRecorder;

use crate::error::{EngineError, SelectError};
use crate::selector::MessageSelector;

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(8760 * 3600);

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub mode: BroadcastMode,
}

impl SchedulerConfig {
    pub fn new(interval: Duration, mode: BroadcastMode) -> Self {
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            mode,
        }
    }
}

impl From<&BroadcastSettings> for SchedulerConfig {
    fn from(settings: &BroadcastSettings) -> Self {
        Self::new(settings.interval(), settings.mode)
    }
}

/// Counts for one completed tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick_id: String,
    pub contacts: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickSummary),
    /// Another tick held the run-lock; nothing was sent.
    Overlapped,
}

/// Spawned tick that is aborted when dropped, so aborting the loop task
/// also stops a broadcast it started.
struct TickTask(JoinHandle<()>);

impl TickTask {
    fn is_running(&self) -> bool {
        !self.0.is_finished()
    }
}

impl Drop for TickTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct BroadcastScheduler {
    contacts: ContactRepo,
    selector: Arc<dyn MessageSelector>,
    gateway: Arc<dyn SmsGateway>,
    metrics: Arc<MetricsRecorder>,
    config: SchedulerConfig,
    run_lock: Mutex<()>,
}

impl BroadcastScheduler {
    pub fn new(
        contacts: ContactRepo,
        selector: Arc<dyn MessageSelector>,
        gateway: Arc<dyn SmsGateway>,
        metrics: Arc<MetricsRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            contacts,
            selector,
            gateway,
            metrics,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one broadcast now.
    ///
    /// Returns `Overlapped` without sending anything when another tick is in
    /// progress. `Err` only when the contact list could not be read.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("broadcast already in progress, skipping tick");
            self.metrics.increment("broadcast.overlapped", &[], 1);
            return Ok(TickOutcome::Overlapped);
        };

        let tick_id = Uuid::now_v7().to_string();
        let span = info_span!("broadcast_tick", tick_id = %tick_id);
        let summary = self.run_tick(tick_id).instrument(span).await?;
        Ok(TickOutcome::Completed(summary))
    }

    async fn run_tick(&self, tick_id: String) -> Result<TickSummary, EngineError> {
        let started = std::time::Instant::now();
        self.metrics.increment("broadcast.ticks", &[], 1);

        let contacts = self.contacts.list_all().map_err(|e| {
            error!(error = %e, "failed to load contacts");
            self.metrics.increment("broadcast.errors", &[], 1);
            e
        })?;
        self.metrics
            .set_gauge("broadcast.contacts", &[], contacts.len() as i64);

        let mut summary = TickSummary {
            tick_id,
            contacts: contacts.len(),
            ..TickSummary::default()
        };
        if contacts.is_empty() {
            debug!("no contacts, nothing to send");
            return Ok(summary);
        }

        let shared_text = match self.config.mode {
            BroadcastMode::PerContact => None,
            BroadcastMode::PerTick => match self.selector.select() {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(
                        reason = e.reason(),
                        error = %e,
                        contact_count = contacts.len(),
                        "no message available, skipping every contact"
                    );
                    self.count_skipped(&e, contacts.len());
                    summary.skipped = contacts.len();
                    return Ok(summary);
                }
            },
        };

        for contact in &contacts {
            let text = match &shared_text {
                Some(text) => text.clone(),
                None => match self.selector.select() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(phone = %contact.phone, reason = e.reason(), error = %e, "no message for contact, skipping");
                        self.count_skipped(&e, 1);
                        summary.skipped += 1;
                        continue;
                    }
                },
            };

            let span = info_span!("deliver", phone = %contact.phone);
            match self.gateway.send(&contact.phone, &text).instrument(span).await {
                Ok(delivery) => {
                    debug!(phone = %contact.phone, provider_id = ?delivery.provider_id, "message delivered");
                    self.metrics.increment("broadcast.delivered", &[], 1);
                    summary.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        phone = %contact.phone,
                        kind = e.error_kind(),
                        status = ?e.status(),
                        error = %e,
                        "delivery failed"
                    );
                    self.metrics
                        .increment("broadcast.failed", &[("kind", e.error_kind())], 1);
                    summary.failed += 1;
                }
            }
        }

        info!(
            contact_count = summary.contacts,
            delivered = summary.delivered,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            gateway = self.gateway.name(),
            "broadcast tick finished"
        );
        Ok(summary)
    }

    fn count_skipped(&self, err: &SelectError, n: usize) {
        self.metrics
            .increment("broadcast.skipped", &[("reason", err.reason())], n as u64);
    }

    /// Start the periodic loop on the runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Fire every `interval`, first one period after start, until cancelled.
    ///
    /// A firing that arrives while the previous tick is still sending is
    /// skipped. On cancellation the in-flight tick, if any, runs to completion
    /// before this returns. Dropping this future aborts that tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            mode = ?self.config.mode,
            "broadcast scheduler started"
        );

        let mut in_flight: Option<TickTask> = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if in_flight.as_ref().is_some_and(TickTask::is_running) {
                        warn!("previous broadcast still running, skipping tick");
                        self.metrics.increment("broadcast.overlapped", &[], 1);
                        continue;
                    }
                    let this = Arc::clone(&self);
                    in_flight = Some(TickTask(tokio::spawn(async move {
                        if let Err(e) = this.tick().await {
                            error!(error = %e, "broadcast tick failed");
                        }
                    })));
                }
            }
        }

        if let Some(mut task) = in_flight {
            if task.is_running() {
                info!("waiting for in-flight broadcast to finish");
            }
            if let Err(e) = (&mut task.0).await {
                error!(error = %e, "broadcast task panicked");
            }
        }
        info!("broadcast scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use sched_core::{GatewayError, Phone};
    use sched_gateway::{FailingGateway, RecordingGateway};
    use sched_store::{Database, MessageRepo};

    use crate::selector::{RandomSelector, RotatingSelector};

    const HOUR: Duration = Duration::from_secs(3600);

    struct Fixture {
        contacts: ContactRepo,
        messages: MessageRepo,
        metrics: Arc<MetricsRecorder>,
    }

    impl Fixture {
        fn new(phones: &[&str]) -> Self {
            let db = Database::in_memory().unwrap();
            let contacts = ContactRepo::new(db.clone());
            for p in phones {
                contacts.add(&Phone::parse(p).unwrap()).unwrap();
            }
            Self {
                contacts,
                messages: MessageRepo::new(db),
                metrics: Arc::new(MetricsRecorder::new()),
            }
        }

        fn scheduler(
            &self,
            selector: Arc<dyn MessageSelector>,
            gateway: Arc<dyn SmsGateway>,
            mode: BroadcastMode,
        ) -> Arc<BroadcastScheduler> {
            Arc::new(BroadcastScheduler::new(
                self.contacts.clone(),
                selector,
                gateway,
                self.metrics.clone(),
                SchedulerConfig::new(HOUR, mode),
            ))
        }

        fn random(&self) -> Arc<dyn MessageSelector> {
            Arc::new(RandomSelector::new(self.messages.clone()))
        }
    }

    fn completed(outcome: TickOutcome) -> TickSummary {
        match outcome {
            TickOutcome::Completed(summary) => summary,
            TickOutcome::Overlapped => panic!("tick unexpectedly overlapped"),
        }
    }

    #[tokio::test]
    async fn every_contact_gets_one_message_from_pool() {
        let fx = Fixture::new(&["+1001", "+1002", "+1003"]);
        let pool: HashSet<String> = ["um", "dois"].iter().map(|s| s.to_string()).collect();
        for text in &pool {
            fx.messages.insert(text).unwrap();
        }
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let summary = completed(scheduler.tick().await.unwrap());

        assert_eq!(summary.contacts, 3);
        assert_eq!(summary.delivered, 3);
        let sent = gateway.sent();
        assert_eq!(sent.len(), 3);
        let phones: HashSet<_> = sent.iter().map(|m| m.phone.as_str()).collect();
        assert_eq!(phones, HashSet::from(["+1001", "+1002", "+1003"]));
        assert!(sent.iter().all(|m| pool.contains(&m.text)));
        assert_eq!(fx.metrics.counter("broadcast.delivered", &[]), 3);
        assert_eq!(fx.metrics.gauge("broadcast.contacts", &[]), Some(3));
    }

    #[tokio::test]
    async fn empty_pool_sends_nothing() {
        let fx = Fixture::new(&["+1001", "+1002"]);
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let summary = completed(scheduler.tick().await.unwrap());

        assert_eq!(summary.skipped, 2);
        assert_eq!(gateway.attempts(), 0);
        assert_eq!(
            fx.metrics.counter("broadcast.skipped", &[("reason", "empty_pool")]),
            2
        );
    }

    #[tokio::test]
    async fn empty_pool_in_per_tick_mode_skips_everyone() {
        let fx = Fixture::new(&["+1001", "+1002"]);
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerTick);

        let summary = completed(scheduler.tick().await.unwrap());

        assert_eq!(summary.skipped, 2);
        assert_eq!(gateway.attempts(), 0);
    }

    #[tokio::test]
    async fn no_contacts_is_a_quiet_tick() {
        let fx = Fixture::new(&[]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let summary = completed(scheduler.tick().await.unwrap());
        assert_eq!(summary, TickSummary { tick_id: summary.tick_id.clone(), ..Default::default() });
        assert_eq!(fx.metrics.counter("broadcast.ticks", &[]), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_tick() {
        let fx = Fixture::new(&["+1001", "+1002", "+1003"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new().failing_for(["+1002"]));
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let summary = completed(scheduler.tick().await.unwrap());

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(gateway.sent_to("+1001"), vec!["olá".to_string()]);
        assert_eq!(gateway.sent_to("+1003"), vec!["olá".to_string()]);
        assert_eq!(
            fx.metrics.counter("broadcast.failed", &[("kind", "server_rejected")]),
            1
        );
    }

    #[tokio::test]
    async fn gateway_outage_is_counted_per_contact() {
        let fx = Fixture::new(&["+1001", "+1002"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(FailingGateway::new(GatewayError::Timeout(Duration::from_secs(10))));
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let summary = completed(scheduler.tick().await.unwrap());

        assert_eq!(summary.failed, 2);
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(fx.metrics.counter("broadcast.failed", &[("kind", "timeout")]), 2);
    }

    #[tokio::test]
    async fn per_tick_mode_sends_same_text_to_everyone() {
        let fx = Fixture::new(&["+1001", "+1002", "+1003"]);
        let gateway = Arc::new(RecordingGateway::new());
        let selector = Arc::new(RotatingSelector::new(["a", "b", "c"]));
        let scheduler = fx.scheduler(selector, gateway.clone(), BroadcastMode::PerTick);

        completed(scheduler.tick().await.unwrap());

        let texts: HashSet<String> = gateway.sent().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, HashSet::from(["a".to_string()]));
    }

    #[tokio::test]
    async fn per_contact_mode_selects_for_each_contact() {
        let fx = Fixture::new(&["+1001", "+1002", "+1003"]);
        let gateway = Arc::new(RecordingGateway::new());
        let selector = Arc::new(RotatingSelector::new(["a", "b", "c"]));
        let scheduler = fx.scheduler(selector, gateway.clone(), BroadcastMode::PerContact);

        completed(scheduler.tick().await.unwrap());

        let texts: HashSet<String> = gateway.sent().into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ticks_do_not_overlap() {
        let fx = Fixture::new(&["+1001"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new().with_delay(Duration::from_secs(30)));
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);

        let (first, second) = tokio::join!(scheduler.tick(), scheduler.tick());

        assert!(matches!(first.unwrap(), TickOutcome::Completed(_)));
        assert_eq!(second.unwrap(), TickOutcome::Overlapped);
        assert_eq!(gateway.attempts(), 1);
        assert_eq!(fx.metrics.counter("broadcast.overlapped", &[]), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_firing_is_one_period_after_start() {
        let fx = Fixture::new(&["+1001"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);
        let cancel = CancellationToken::new();
        let handle = scheduler.spawn(cancel.clone());

        tokio::time::sleep(HOUR - Duration::from_secs(60)).await;
        assert_eq!(gateway.attempts(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(gateway.attempts(), 1);

        tokio::time::sleep(HOUR).await;
        assert_eq!(gateway.attempts(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tick_causes_next_firing_to_be_skipped() {
        let fx = Fixture::new(&["+1001"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new().with_delay(Duration::from_secs(90 * 60)));
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);
        let cancel = CancellationToken::new();
        let handle = scheduler.spawn(cancel.clone());

        tokio::time::sleep(2 * HOUR + Duration::from_secs(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(gateway.attempts(), 1);
        assert_eq!(gateway.sent().len(), 1, "in-flight tick finishes after cancel");
        assert_eq!(fx.metrics.counter("broadcast.overlapped", &[]), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborting_the_loop_aborts_the_in_flight_tick() {
        let fx = Fixture::new(&["+1001"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new().with_delay(Duration::from_secs(90 * 60)));
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);
        let cancel = CancellationToken::new();
        let handle = scheduler.spawn(cancel.clone());

        tokio::time::sleep(HOUR + Duration::from_secs(60)).await;
        assert_eq!(gateway.attempts(), 1);

        // Grace period ran out: the loop is stuck awaiting the tick.
        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        tokio::time::sleep(2 * HOUR).await;
        assert!(gateway.sent().is_empty());
        assert_eq!(fx.metrics.counter("broadcast.delivered", &[]), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_firing_sends_nothing() {
        let fx = Fixture::new(&["+1001"]);
        fx.messages.insert("olá").unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = fx.scheduler(fx.random(), gateway.clone(), BroadcastMode::PerContact);
        let cancel = CancellationToken::new();
        let handle = scheduler.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(gateway.attempts(), 0);
    }

    #[test]
    fn config_from_settings() {
        let settings = BroadcastSettings {
            interval_hours: 6,
            mode: BroadcastMode::PerTick,
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.mode, BroadcastMode::PerTick);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = SchedulerConfig::new(Duration::ZERO, BroadcastMode::PerContact);
        assert_eq!(config.interval, MIN_INTERVAL);
    }

    #[test]
    fn huge_interval_is_capped_at_a_year() {
        let config = SchedulerConfig::new(Duration::from_secs(u64::MAX), BroadcastMode::PerContact);
        assert_eq!(config.interval, MAX_INTERVAL);
    }
}
