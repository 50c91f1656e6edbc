// rest.rs
use crate::types::RawInstrument;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use std::time::Duration;

/// Where funding observations come from. One call returns the raw
/// instrument list for each requested symbol, in request order.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<Vec<RawInstrument>>>;
}

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("funding-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Latest instrument entry for `symbol`. The response must be a JSON
    /// array; BitMEX reports errors as an object, which fails here.
    pub async fn instrument(&self, symbol: &str) -> Result<Vec<RawInstrument>> {
        let url = format!(
            "{}/api/v1/instrument?symbol={}&count=1&reverse=true",
            self.base_url, symbol
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET instrument {symbol}"))?
            .error_for_status()?;
        let json: serde_json::Value = resp.json().await?;
        parse_instruments(symbol, json)
    }
}

pub fn parse_instruments(symbol: &str, json: serde_json::Value) -> Result<Vec<RawInstrument>> {
    if !json.is_array() {
        let body: String = json.to_string().chars().take(200).collect();
        anyhow::bail!("instrument response for {symbol} is not an array: {body}");
    }
    serde_json::from_value(json).with_context(|| format!("decoding instruments for {symbol}"))
}

#[async_trait]
impl RateSource for RestClient {
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<Vec<RawInstrument>>> {
        try_join_all(symbols.iter().map(|s| self.instrument(s))).await
    }
}
