use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use funding_watch::config::load_config;
use funding_watch::logging::setup_logging;
use funding_watch::rest::RestClient;
use funding_watch::telemetry::Telemetry;
use funding_watch::{notify, ChangeDetector, Cli, FundingWatcher, HistoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_deref())?;
    if let Some(secs) = cli.interval_secs {
        cfg.poll.interval_secs = secs;
        cfg.validate()?;
    }
    setup_logging(&cfg.logging)?;

    let notifier = notify::from_config(&cfg.notifier)?;
    let source = RestClient::new(
        &cfg.exchange.base_url,
        Duration::from_secs(cfg.poll.request_timeout_secs),
    )?;

    let mut store = HistoryStore::new(&cli.db_file);
    if cfg.store.audit_log {
        store = store.with_audit_log();
    }

    let mut watcher = FundingWatcher::new(
        cfg.exchange.symbols.clone(),
        Box::new(source),
        ChangeDetector::new(cfg.detector.noise_threshold),
        store,
        notifier,
        Arc::new(Telemetry::new()?),
    )
    .context("starting funding watcher")?;

    info!(
        symbols = ?cfg.exchange.symbols,
        interval_secs = cfg.poll.interval_secs,
        threshold = %cfg.detector.noise_threshold,
        "funding watch started"
    );

    if cli.once {
        watcher.run_cycle().await?;
        return Ok(());
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    watcher
        .run(
            Duration::from_secs(cfg.poll.interval_secs),
            cfg.telemetry.report_every_cycles,
            shutdown,
        )
        .await;
    Ok(())
}
