// watcher.rs
//! One polling cycle: fetch, normalize, compare, persist, notify.
//!
//! The watcher owns the retained [`HistoryState`]. A cycle computes the next
//! state from the current one and only swaps it in after it has been written
//! to disk, so an aborted cycle leaves both copies as they were.

use crate::detector::{Alert, ChangeDetector, Silence, Verdict};
use crate::normalize::normalize;
use crate::notify::Notifier;
use crate::rest::RateSource;
use crate::store::{HistoryState, HistoryStore};
use crate::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one successful cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub observed: usize,
    pub alerts: Vec<Alert>,
    pub notified: bool,
}

impl CycleReport {
    pub fn message(&self) -> Option<String> {
        if self.alerts.is_empty() {
            return None;
        }
        Some(
            self.alerts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

pub struct FundingWatcher {
    symbols: Vec<String>,
    source: Box<dyn RateSource>,
    detector: ChangeDetector,
    store: HistoryStore,
    notifier: Box<dyn Notifier>,
    telemetry: Arc<Telemetry>,
    history: HistoryState,
}

impl FundingWatcher {
    /// Loads the retained state from `store`; a missing file starts empty.
    pub fn new(
        symbols: Vec<String>,
        source: Box<dyn RateSource>,
        detector: ChangeDetector,
        store: HistoryStore,
        notifier: Box<dyn Notifier>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let history = store.load()?;
        info!(
            path = %store.path().display(),
            symbols = history.len(),
            threshold = %detector.noise_threshold(),
            "loaded funding history"
        );
        Ok(Self {
            symbols,
            source,
            detector,
            store,
            notifier,
            telemetry,
            history,
        })
    }

    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Runs one cycle. On error nothing was persisted and the in-memory
    /// state is unchanged.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let raw = self.source.fetch(&self.symbols).await.context("fetching funding rates")?;
        self.telemetry
            .record_fetch_rtt_ms(started.elapsed().as_millis() as u64)
            .await;

        let snapshot = normalize(raw);
        let mut alerts = Vec::new();
        for (symbol, verdict) in self.detector.evaluate(&self.history, &snapshot) {
            match verdict {
                Verdict::Alert(alert) => alerts.push(alert),
                Verdict::Silent(Silence::FirstSight) => info!(symbol, "first observation"),
                Verdict::Silent(Silence::MissingRate(side)) => {
                    warn!(symbol, ?side, "funding rate missing, skipped")
                }
                Verdict::Silent(Silence::Malformed) => {
                    warn!(symbol, "funding rate change out of range, skipped")
                }
                Verdict::Silent(reason) => debug!(symbol, ?reason, "no change reported"),
            }
        }

        let next = self.history.succeeded_by(&snapshot);
        self.store.replace_all(&next).context("persisting funding history")?;
        self.history = next;

        let ts_ms = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.store.append_audit(ts_ms, &snapshot) {
            warn!("audit log append failed: {e:#}");
        }

        let mut report = CycleReport {
            observed: snapshot.len(),
            alerts,
            notified: false,
        };
        if let Some(message) = report.message() {
            match self.notifier.send(&message).await {
                Ok(()) => report.notified = true,
                Err(e) => {
                    self.telemetry.notify_failed().await;
                    error!("failed to send alerts: {e:#}");
                }
            }
        }

        self.telemetry.cycle_ok(report.alerts.len()).await;
        debug!(
            observed = report.observed,
            alerts = report.alerts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(report)
    }

    /// Runs a cycle and logs instead of returning the error.
    pub async fn tick(&mut self) -> Option<CycleReport> {
        match self.run_cycle().await {
            Ok(report) => Some(report),
            Err(e) => {
                self.telemetry.cycle_aborted().await;
                warn!("cycle aborted: {e:#}");
                None
            }
        }
    }

    /// Drives cycles every `every` until `shutdown` resolves. A cycle that
    /// overruns the interval delays the next one instead of overlapping it.
    pub async fn run<F>(&mut self, every: Duration, report_every: u64, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut cycles: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                    cycles += 1;
                    if report_every > 0 && cycles % report_every == 0 {
                        self.log_telemetry().await;
                    }
                }
            }
        }
        self.log_telemetry().await;
    }

    async fn log_telemetry(&self) {
        let (rtt, c) = self.telemetry.snapshot().await;
        info!(
            p50_ms = rtt.p50_ms,
            p95_ms = rtt.p95_ms,
            p99_ms = rtt.p99_ms,
            fetches = rtt.count,
            cycles_ok = c.cycles_ok,
            cycles_aborted = c.cycles_aborted,
            alerts = c.alerts,
            notify_failures = c.notify_failures,
            "telemetry"
        );
    }
}
