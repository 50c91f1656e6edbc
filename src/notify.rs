// notify.rs
use crate::config::{NotifierConfig, NotifierKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const WEBHOOK_TOKEN_ENV: &str = "FUNDING_WATCH_WEBHOOK_TOKEN";

/// Receives one message per cycle: the alert texts joined by newlines.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Writes alerts to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        for line in message.lines() {
            tracing::info!(target: "funding_watch::alert", "{line}");
        }
        Ok(())
    }
}

/// POSTs `{"text": message}` to a webhook with a bearer token.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    token: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .context("posting webhook")?
            .error_for_status()?;
        Ok(())
    }
}

/// Builds the configured channel. Credentials are checked here, at startup.
pub fn from_config(cfg: &NotifierConfig) -> Result<Box<dyn Notifier>> {
    from_config_with(cfg, |name| std::env::var(name).ok())
}

fn from_config_with(
    cfg: &NotifierConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn Notifier>> {
    match cfg.kind {
        NotifierKind::Log => Ok(Box::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = cfg
                .webhook_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .context("notifier.webhook_url is required for the webhook notifier")?;
            let token = env(WEBHOOK_TOKEN_ENV)
                .filter(|t| !t.trim().is_empty())
                .with_context(|| format!("{WEBHOOK_TOKEN_ENV} must be set for the webhook notifier"))?;
            let notifier = WebhookNotifier::new(url, token, Duration::from_secs(cfg.timeout_secs))?;
            Ok(Box::new(notifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook_cfg(url: Option<&str>) -> NotifierConfig {
        NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: url.map(str::to_string),
            timeout_secs: 5,
        }
    }

    #[test]
    fn webhook_without_token_fails_fast() {
        let err = from_config_with(&webhook_cfg(Some("https://hooks.example/x")), |_| None)
            .err()
            .expect("missing token must fail");
        assert!(err.to_string().contains(WEBHOOK_TOKEN_ENV));
    }

    #[test]
    fn webhook_without_url_fails_fast() {
        let res = from_config_with(&webhook_cfg(None), |_| Some("secret".into()));
        assert!(res.is_err());
    }

    #[test]
    fn webhook_with_credentials_builds() {
        let res = from_config_with(&webhook_cfg(Some("https://hooks.example/x")), |_| {
            Some("secret".into())
        });
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let n = from_config_with(&NotifierConfig::default(), |_| None).unwrap();
        n.send("Funding increased for XBT\nFunding decreased for ETH").await.unwrap();
    }
}
