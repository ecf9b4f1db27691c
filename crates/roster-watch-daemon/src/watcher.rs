//! Watch cycle orchestration: fetch, diff, format, deliver, persist.
//!
//! One cycle runs at a time. The loop awaits each cycle before waiting for
//! the next tick, so the baseline is never read and written concurrently.

use std::sync::Arc;
use std::time::Duration;

use roster_watch::{compute_changes, BaselineStore, ChangeSet, Formatter, Message, Snapshot};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::error::{CycleError, FetchError};
use crate::sink::DeliverySink;
use crate::source::SnapshotSource;

/// What a completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub bootstrap: bool,
    pub members: usize,
    pub joined: usize,
    pub left: usize,
    pub unit_events: u64,
    pub status_changes: usize,
    pub messages: usize,
    pub delivery_failures: usize,
    pub baseline_stored: bool,
}

/// Drives watch cycles against a source, a sink, and a baseline store.
pub struct Watcher<S, D, P> {
    source: S,
    sink: D,
    store: P,
    formatter: Formatter,
    bootstrap_pending: bool,
    bootstrap_notice_sent: bool,
    consecutive_failures: u32,
    failure_alert_after: u32,
}

impl<S, D, P> Watcher<S, D, P>
where
    S: SnapshotSource,
    D: DeliverySink,
    P: BaselineStore,
{
    /// New watcher whose first successful cycle includes the roster summary.
    pub fn new(source: S, sink: D, store: P, formatter: Formatter) -> Self {
        Self {
            source,
            sink,
            store,
            formatter,
            bootstrap_pending: true,
            bootstrap_notice_sent: false,
            consecutive_failures: 0,
            failure_alert_after: 10,
        }
    }

    /// Whether the next successful cycle is treated as the bootstrap cycle.
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap_pending = bootstrap;
        self
    }

    /// Alert the chat after this many failed cycles in a row.
    pub fn with_failure_alert_after(mut self, cycles: u32) -> Self {
        self.failure_alert_after = cycles.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one complete cycle.
    ///
    /// The bootstrap cycle posts only the roster summary and replaces the
    /// baseline without diffing. Later cycles announce what changed.
    /// A fetch failure ends the cycle early and leaves the baseline alone.
    /// Delivery and persistence failures are logged and do not fail the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let previous = match self.store.load_baseline() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Could not read baseline, treating as empty: {e}");
                Snapshot::new()
            }
        };

        let current = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.on_fetch_failure(&e).await;
                return Err(CycleError::Fetch(e));
            }
        };

        let bootstrap = self.bootstrap_pending;
        let now = chrono::Local::now().naive_local();

        // The start-up cycle only re-announces the roster. Diffing against a
        // missing or stale baseline would replay every member and vehicle.
        let (changes, messages) = if bootstrap {
            tracing::info!("Bootstrap cycle: posting summary, resetting baseline");
            (ChangeSet::default(), vec![self.formatter.summary(&current, now)])
        } else {
            let changes = compute_changes(&previous, &current);
            for dec in &changes.counter_decreases {
                tracing::warn!(
                    "Towed counter for {} went down from {} to {}, ignoring",
                    dec.name,
                    dec.from,
                    dec.to
                );
            }
            let messages = self.formatter.format(&changes, &current, now, false);
            (changes, messages)
        };

        let delivery_failures = self.deliver_all(&messages).await;

        let baseline_stored = match self.store.store_baseline(&current) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not store baseline: {e}");
                false
            }
        };

        self.consecutive_failures = 0;
        self.bootstrap_pending = false;
        self.bootstrap_notice_sent = false;

        Ok(CycleReport {
            bootstrap,
            members: current.len(),
            joined: changes.joined.len(),
            left: changes.left.len(),
            unit_events: changes.unit_events(),
            status_changes: changes.status_changes.len(),
            messages: messages.len(),
            delivery_failures,
            baseline_stored,
        })
    }

    /// Run cycles on a fixed interval until `shutdown` is notified.
    ///
    /// The first cycle starts immediately. A shutdown during a cycle drops
    /// that cycle; the baseline is only replaced at the very end of one.
    pub async fn run(&mut self, interval: Duration, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Watch loop started: interval={}s", interval.as_secs());

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {}
            }

            tracing::debug!("Starting watch cycle");
            let outcome = tokio::select! {
                _ = shutdown.notified() => None,
                result = self.run_cycle() => Some(result),
            };

            match outcome {
                None => {
                    tracing::info!("Shutdown requested mid-cycle, discarding in-flight cycle");
                    break;
                }
                Some(Ok(report)) => log_report(&report),
                Some(Err(e)) => tracing::warn!(
                    "Watch cycle skipped ({} in a row): {e}",
                    self.consecutive_failures
                ),
            }
        }

        tracing::info!("Watch loop stopped");
    }

    async fn deliver_all(&self, messages: &[Message]) -> usize {
        let mut failures = 0;
        for message in messages {
            if let Err(e) = self.sink.send(message).await {
                failures += 1;
                tracing::warn!("Delivery failed: {e}");
            }
        }
        failures
    }

    async fn on_fetch_failure(&mut self, error: &FetchError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let mut notices = Vec::new();
        if self.bootstrap_pending && !self.bootstrap_notice_sent {
            self.bootstrap_notice_sent = true;
            notices.push(self.formatter.bootstrap_failure());
        }
        if self.consecutive_failures == self.failure_alert_after {
            notices.push(
                self.formatter
                    .fetch_failure_alert(self.consecutive_failures, &error.to_string()),
            );
        }

        self.deliver_all(&notices).await;
    }
}

fn log_report(report: &CycleReport) {
    tracing::info!(
        "Cycle done: members={} joined={} left={} towed_events={} status_changes={} messages={} failed_deliveries={} baseline_stored={}{}",
        report.members,
        report.joined,
        report.left,
        report.unit_events,
        report.status_changes,
        report.messages,
        report.delivery_failures,
        report.baseline_stored,
        if report.bootstrap { " (bootstrap)" } else { "" }
    );
}
