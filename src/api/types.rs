use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External market data providers the engine knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Finnhub,
    Yahoo,
    AlphaVantage,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [
        DataSource::Finnhub,
        DataSource::Yahoo,
        DataSource::AlphaVantage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Finnhub => "finnhub",
            DataSource::Yahoo => "yahoo",
            DataSource::AlphaVantage => "alpha_vantage",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical quote record every adapter normalizes into.
///
/// Optional fields are `None` when the provider did not report them (or
/// reported a zero placeholder). `timestamp` is the provider's observation
/// time, not the time we received the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub volume: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
    pub source: DataSource,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: f64, source: DataSource) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume: None,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: 0.0,
            change_percent: 0.0,
            source,
            timestamp: None,
        }
    }

    /// Fills `change`/`change_percent` from `previous_close` when the
    /// provider left them out.
    pub fn derive_change(mut self) -> Self {
        if let Some(prev) = self.previous_close {
            if self.change == 0.0 && prev > 0.0 {
                self.change = self.price - prev;
                self.change_percent = self.change / prev * 100.0;
            }
        }
        self
    }
}

/// Treats missing, zero and non-finite provider values as absent.
pub(crate) fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

/// One OHLCV bar. Histories are always ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_midpoint(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
}
