// logging.rs
use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{create_dir_all, File};
use std::io::BufWriter;
use tracing_subscriber::{fmt, EnvFilter};

/// File the log goes to when `save_logs` is on.
pub fn log_file_path(cfg: &LoggingConfig) -> String {
    if cfg.rewrite_last_logs {
        cfg.log_file_path.clone()
    } else {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        format!(
            "{}-{}.log",
            cfg.log_file_path.trim_end_matches(".log"),
            timestamp
        )
    }
}

pub fn setup_logging(cfg: &LoggingConfig) -> Result<()> {
    let level = cfg
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if cfg.save_logs {
        if let Some(dir) = std::path::Path::new(&cfg.log_file_path).parent() {
            create_dir_all(dir).context("creating log directory")?;
        }

        let path = log_file_path(cfg);
        let file = File::create(&path).with_context(|| format!("creating log file {path}"))?;

        let writer = move || {
            BufWriter::new(
                file.try_clone()
                    .unwrap_or_else(|e| panic!("log file handle could not be cloned: {e}")),
            )
        };

        fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_writer(writer)
            .init();
    } else {
        fmt().with_env_filter(env_filter).init();
    }
    Ok(())
}
