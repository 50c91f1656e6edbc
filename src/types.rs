//types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One instrument object as returned by `/api/v1/instrument`.
///
/// `fundingRate` is a fraction (0.0001 == 0.01%). BitMEX sends it as a JSON
/// number, or `null` for instruments without funding.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstrument {
    pub symbol: String,
    #[serde(default)]
    pub funding_rate: Option<serde_json::Value>,
    #[serde(default)]
    pub funding_timestamp: serde_json::Value,
}

/// Canonical per-symbol observation. `funding_rate` is in percentage units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRecord {
    pub symbol: String,
    pub funding_rate: Option<Decimal>,
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

impl RateRecord {
    pub fn new(symbol: impl Into<String>, funding_rate: Decimal, timestamp: impl Into<serde_json::Value>) -> Self {
        Self {
            symbol: symbol.into(),
            funding_rate: Some(funding_rate),
            timestamp: timestamp.into(),
        }
    }
}

pub type Snapshot = Vec<RateRecord>;

/// Parses a JSON number or numeric string exactly, including exponent forms
/// like `1e-7` that serde_json emits for small floats.
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
