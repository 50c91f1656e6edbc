// config.rs
use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

use crate::detector::DEFAULT_NOISE_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Percentage units.
    pub noise_threshold: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    Log,
    Webhook,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub audit_log: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub save_logs: bool,
    pub log_file_path: String,
    pub rewrite_last_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// 0 disables the periodic summary.
    pub report_every_cycles: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub poll: PollConfig,
    pub detector: DetectorConfig,
    pub notifier: NotifierConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    let b = config::Config::builder()
        .set_default("exchange.base_url", "https://www.bitmex.com")?
        .set_default("exchange.symbols", vec!["XBT", "ETH"])?
        .set_default("poll.interval_secs", 60)?
        .set_default("poll.request_timeout_secs", 10)?
        .set_default("detector.noise_threshold", DEFAULT_NOISE_THRESHOLD.to_string())?
        .set_default("notifier.kind", "log")?
        .set_default("notifier.timeout_secs", 10)?
        .set_default("store.audit_log", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.save_logs", false)?
        .set_default("logging.log_file_path", "logs/funding-watch.log")?
        .set_default("logging.rewrite_last_logs", true)?
        .set_default("telemetry.report_every_cycles", 60)?;
    Ok(b)
}

/// Defaults, then `config.toml` (or `path`, which must exist), then
/// `FUNDING_WATCH__SECTION__KEY` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name("config").required(false),
    };
    let cfg: AppConfig = builder()?
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("FUNDING_WATCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("exchange.symbols")
                .try_parsing(true),
        )
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .context("deserializing configuration")?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.exchange.symbols.is_empty(), "exchange.symbols must not be empty");
        ensure!(self.poll.interval_secs > 0, "poll.interval_secs must be positive");
        ensure!(
            self.detector.noise_threshold >= Decimal::ZERO,
            "detector.noise_threshold must not be negative"
        );
        Ok(())
    }
}
