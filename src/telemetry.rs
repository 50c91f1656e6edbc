//telemetry.rs
use anyhow::Result;
use hdrhistogram::Histogram;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub cycles_ok: u64,
    pub cycles_aborted: u64,
    pub alerts: u64,
    pub notify_failures: u64,
}

pub struct Telemetry {
    fetch_rtt: Mutex<Histogram<u64>>,
    counters: Mutex<Counters>,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fetch_rtt: Mutex::new(Histogram::new_with_max(60_000, 3)?), // up to 60s in ms
            counters: Mutex::new(Counters::default()),
        })
    }

    pub async fn record_fetch_rtt_ms(&self, v_ms: u64) {
        let mut h = self.fetch_rtt.lock().await;
        let _ = h.saturating_record(v_ms);
    }

    pub async fn cycle_ok(&self, alerts: usize) {
        let mut c = self.counters.lock().await;
        c.cycles_ok += 1;
        c.alerts += alerts as u64;
    }

    pub async fn cycle_aborted(&self) {
        self.counters.lock().await.cycles_aborted += 1;
    }

    pub async fn notify_failed(&self) {
        self.counters.lock().await.notify_failures += 1;
    }

    pub async fn counters(&self) -> Counters {
        *self.counters.lock().await
    }

    pub async fn snapshot(&self) -> (LatencySummary, Counters) {
        let h = self.fetch_rtt.lock().await;
        let rtt = LatencySummary {
            p50_ms: h.value_at_quantile(0.50) as f64,
            p95_ms: h.value_at_quantile(0.95) as f64,
            p99_ms: h.value_at_quantile(0.99) as f64,
            count: h.len(),
        };
        drop(h);
        (rtt, self.counters().await)
    }
}
