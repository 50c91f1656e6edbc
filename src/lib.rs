//! Polls perpetual-swap funding rates and reports meaningful changes.
//!
//! Each cycle fetches the latest rate per symbol, compares it against the
//! last retained observation, persists the new state and forwards any alerts.

use clap::Parser;
use std::path::PathBuf;

pub mod config;
pub mod detector;
pub mod logging;
pub mod normalize;
pub mod notify;
pub mod rest;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod watcher;

pub use detector::{Alert, AlertKind, ChangeDetector, PaymentDirection, Silence, Verdict};
pub use store::{HistoryState, HistoryStore};
pub use types::{RateRecord, RawInstrument, Snapshot};
pub use watcher::{CycleReport, FundingWatcher};

#[derive(Parser, Debug)]
#[command(name = "funding-watch", version, about = "Watch funding rates for flips and large moves")]
pub struct Cli {
    /// JSON file holding the last observed rates (created if missing)
    pub db_file: PathBuf,

    /// Config file; defaults to ./config.toml when present
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides poll.interval_secs
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}
