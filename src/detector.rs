// detector.rs
//! Decides, per symbol, whether a new funding observation is worth reporting.
//!
//! All comparisons run on [`Decimal`] so a delta sitting exactly on the
//! threshold is classified the same way every time.

use crate::store::HistoryState;
use crate::types::{RateRecord, Snapshot};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// Minimum absolute change, in percentage units, before anything is reported.
pub const DEFAULT_NOISE_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 4);

const DISPLAY_DP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDirection {
    LongsPayShorts,
    ShortsPayLongs,
}

impl PaymentDirection {
    /// Zero counts as longs paying.
    pub fn of(rate: Decimal) -> Self {
        if rate < Decimal::ZERO {
            Self::ShortsPayLongs
        } else {
            Self::LongsPayShorts
        }
    }
}

impl fmt::Display for PaymentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LongsPayShorts => write!(f, "Longs pay Shorts"),
            Self::ShortsPayLongs => write!(f, "Shorts pay Longs"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Flip(PaymentDirection),
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub symbol: String,
    pub kind: AlertKind,
    pub last_rate: Decimal,
    pub new_rate: Decimal,
    /// Absolute size of the change.
    pub change: Decimal,
}

fn fixed(d: Decimal) -> String {
    let mut rounded = d.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DISPLAY_DP);
    if d < Decimal::ZERO && rounded.is_zero() {
        rounded.set_sign_positive(true);
        return format!("-{rounded}");
    }
    rounded.to_string()
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = fixed(self.last_rate);
        let new = fixed(self.new_rate);
        let change = fixed(self.change);
        match self.kind {
            AlertKind::Flip(dir) => {
                let side = match dir {
                    PaymentDirection::LongsPayShorts => "positive",
                    PaymentDirection::ShortsPayLongs => "negative",
                };
                write!(
                    f,
                    "Funding flipped to {side} for {}. {dir} ({last}% -> {new}%, change {change}%)",
                    self.symbol
                )
            }
            AlertKind::Increase => write!(
                f,
                "Funding increased for {}: {last}% -> {new}% (+{change}%)",
                self.symbol
            ),
            AlertKind::Decrease => write!(
                f,
                "Funding decreased for {}: {last}% -> {new}% (-{change}%)",
                self.symbol
            ),
        }
    }
}

/// Which side of a comparison was missing a usable rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Last,
    New,
}

/// Why a symbol produced no alert.
#[derive(Debug, Clone, PartialEq)]
pub enum Silence {
    FirstSight,
    BelowThreshold { delta: Decimal },
    Unchanged,
    MissingRate(Side),
    /// The difference does not fit in a `Decimal`.
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Alert(Alert),
    Silent(Silence),
}

impl Verdict {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Verdict::Alert(a) => Some(a),
            Verdict::Silent(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    noise_threshold: Decimal,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_THRESHOLD)
    }
}

impl ChangeDetector {
    pub fn new(noise_threshold: Decimal) -> Self {
        Self { noise_threshold }
    }

    pub fn noise_threshold(&self) -> Decimal {
        self.noise_threshold
    }

    pub fn compare(&self, last: Option<&RateRecord>, new: &RateRecord) -> Verdict {
        let Some(last) = last else {
            return Verdict::Silent(Silence::FirstSight);
        };
        let Some(last_rate) = last.funding_rate else {
            return Verdict::Silent(Silence::MissingRate(Side::Last));
        };
        let Some(new_rate) = new.funding_rate else {
            return Verdict::Silent(Silence::MissingRate(Side::New));
        };

        let Some(delta) = new_rate.checked_sub(last_rate) else {
            return Verdict::Silent(Silence::Malformed);
        };
        if delta.abs() <= self.noise_threshold {
            return Verdict::Silent(Silence::BelowThreshold { delta });
        }

        let was = PaymentDirection::of(last_rate);
        let now = PaymentDirection::of(new_rate);
        let kind = if was != now {
            AlertKind::Flip(now)
        } else if delta > Decimal::ZERO {
            AlertKind::Increase
        } else if delta < Decimal::ZERO {
            AlertKind::Decrease
        } else {
            return Verdict::Silent(Silence::Unchanged);
        };

        Verdict::Alert(Alert {
            symbol: new.symbol.clone(),
            kind,
            last_rate,
            new_rate,
            change: delta.abs(),
        })
    }

    /// Verdicts for every record of `snapshot`, in snapshot order.
    pub fn evaluate<'a>(&self, history: &HistoryState, snapshot: &'a Snapshot) -> Vec<(&'a str, Verdict)> {
        snapshot
            .iter()
            .map(|new| (new.symbol.as_str(), self.compare(history.get(&new.symbol), new)))
            .collect()
    }
}
