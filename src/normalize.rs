// normalize.rs
use crate::types::{decimal_from_json, RateRecord, RawInstrument, Snapshot};
use rust_decimal::Decimal;

const PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// Flattens the per-symbol responses into one snapshot, preserving source
/// order. Rates are scaled from fractions to percentage units; a rate that
/// is null, non-numeric or too large to scale is carried through as `None`.
pub fn normalize(batches: Vec<Vec<RawInstrument>>) -> Snapshot {
    batches
        .into_iter()
        .flatten()
        .map(|raw| RateRecord {
            funding_rate: raw
                .funding_rate
                .as_ref()
                .and_then(decimal_from_json)
                .and_then(|r| r.checked_mul(PERCENT)),
            symbol: raw.symbol,
            timestamp: raw.funding_timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(symbol: &str, rate: serde_json::Value, ts: &str) -> RawInstrument {
        RawInstrument {
            symbol: symbol.to_string(),
            funding_rate: Some(rate),
            funding_timestamp: json!(ts),
        }
    }

    #[test]
    fn flattens_in_source_order_and_scales_to_percent() {
        let snap = normalize(vec![
            vec![raw("XBTUSD", json!(0.0001), "2024-01-01T04:00:00.000Z")],
            vec![],
            vec![raw("ETHUSD", json!(-0.000375), "2024-01-01T12:00:00.000Z")],
        ]);

        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].symbol, "XBTUSD");
        assert_eq!(snap[0].funding_rate, Some(Decimal::new(1, 2)));
        assert_eq!(snap[0].timestamp, json!("2024-01-01T04:00:00.000Z"));
        assert_eq!(snap[1].symbol, "ETHUSD");
        assert_eq!(snap[1].funding_rate, Some(Decimal::new(-375, 4)));
    }

    #[test]
    fn scaling_is_exact() {
        // 0.000123 * 100 in f64 is 0.012299999999999998
        let snap = normalize(vec![vec![raw("XBTUSD", json!(0.000123), "t")]]);
        assert_eq!(snap[0].funding_rate, Some(Decimal::new(123, 4)));
    }

    #[test]
    fn null_rate_becomes_none() {
        let snap = normalize(vec![vec![raw("XBTUSD", json!(null), "t")]]);
        assert_eq!(snap[0].funding_rate, None);
        assert_eq!(snap[0].symbol, "XBTUSD");
    }

    #[test]
    fn rate_too_large_to_scale_becomes_none() {
        let snap = normalize(vec![
            vec![raw("XBTUSD", json!(1e28), "t")],
            vec![raw("ETHUSD", json!(0.0001), "t")],
        ]);
        assert_eq!(snap[0].funding_rate, None);
        assert_eq!(snap[1].funding_rate, Some(Decimal::new(1, 2)));
    }

    #[test]
    fn keeps_duplicates() {
        let snap = normalize(vec![
            vec![raw("XBTUSD", json!(0.0001), "a")],
            vec![raw("XBTUSD", json!(0.0002), "b")],
        ]);
        assert_eq!(snap.len(), 2);
    }
}
