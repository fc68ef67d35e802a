use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::{DataSource, Quote};

const REAL_TIME_MAX_SECS: i64 = 60;
const FRESH_MAX_SECS: i64 = 300;
const STALE_MAX_SECS: i64 = 900;

/// An open-to-price jump above this is implausible for a single session.
const MAX_OPEN_DEVIATION: f64 = 0.5;
const OPEN_DEVIATION_PENALTY: f64 = 0.5;
const OUT_OF_RANGE_PENALTY: f64 = 0.3;
const REQUIRED_FIELDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    RealTime,
    Fresh,
    Stale,
    Expired,
}

impl Freshness {
    /// Monotonic bucket over age in seconds. Negative ages (provider clock
    /// ahead of ours) count as brand new.
    pub fn from_age_secs(age_secs: i64) -> Self {
        match age_secs.max(0) {
            a if a < REAL_TIME_MAX_SECS => Freshness::RealTime,
            a if a < FRESH_MAX_SECS => Freshness::Fresh,
            a if a < STALE_MAX_SECS => Freshness::Stale,
            _ => Freshness::Expired,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Freshness::RealTime | Freshness::Fresh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::RealTime => "REAL_TIME",
            Freshness::Fresh => "FRESH",
            Freshness::Stale => "STALE",
            Freshness::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-fetch quality verdict. Built once, never mutated, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub freshness: Freshness,
    pub age_secs: i64,
    pub completeness: f64,
    pub accuracy: f64,
    pub source: DataSource,
    pub computed_at: DateTime<Utc>,
}

impl DataQuality {
    /// Only REAL_TIME and FRESH data may be cached or returned.
    pub fn is_acceptable(&self) -> bool {
        self.freshness.is_live()
    }

    /// Freshness the same quote would have if validated again at `now`.
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        let elapsed = (now - self.computed_at).num_seconds().max(0);
        Freshness::from_age_secs(self.age_secs.saturating_add(elapsed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataQualityValidator {
    missing_timestamp_expired: bool,
}

impl DataQualityValidator {
    pub fn new(missing_timestamp_expired: bool) -> Self {
        Self {
            missing_timestamp_expired,
        }
    }

    pub fn validate(&self, quote: &Quote, now: DateTime<Utc>) -> DataQuality {
        let age_secs = match quote.timestamp {
            Some(observed) => (now - observed).num_seconds(),
            None if self.missing_timestamp_expired => {
                tracing::warn!(
                    "⚠️  {} from {} has no timestamp, treating as expired",
                    quote.symbol,
                    quote.source
                );
                i64::MAX
            }
            None => {
                tracing::warn!(
                    "⚠️  {} from {} has no timestamp, assuming it was observed now",
                    quote.symbol,
                    quote.source
                );
                0
            }
        };

        DataQuality {
            freshness: Freshness::from_age_secs(age_secs),
            age_secs,
            completeness: Self::completeness(quote),
            accuracy: Self::accuracy(quote),
            source: quote.source,
            computed_at: now,
        }
    }

    fn completeness(quote: &Quote) -> f64 {
        let price = quote.price.is_finite() && quote.price != 0.0;
        let present = [
            price,
            quote.volume.is_some(),
            quote.open.is_some(),
            quote.high.is_some(),
            quote.low.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();

        present as f64 / REQUIRED_FIELDS
    }

    fn accuracy(quote: &Quote) -> f64 {
        let mut accuracy = 1.0;

        if let Some(open) = quote.open.filter(|o| *o > 0.0) {
            if (quote.price - open).abs() / open > MAX_OPEN_DEVIATION {
                accuracy *= OPEN_DEVIATION_PENALTY;
            }
        }

        if let (Some(low), Some(high)) = (quote.low, quote.high) {
            if low != 0.0 && high != 0.0 && (quote.price < low || quote.price > high) {
                accuracy *= OUT_OF_RANGE_PENALTY;
            }
        }

        accuracy
    }
}
