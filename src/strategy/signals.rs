use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::StrongBuy,
        Signal::Buy,
        Signal::Hold,
        Signal::Sell,
        Signal::StrongSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG_BUY",
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
            Signal::StrongSell => "STRONG_SELL",
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Signal::StrongBuy | Signal::Buy)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, Signal::StrongSell | Signal::Sell)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    Technical,
    Pattern,
    Fundamental,
    News,
    Social,
}

impl FactorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorCategory::Technical => "technical_analysis",
            FactorCategory::Pattern => "candlestick_patterns",
            FactorCategory::Fundamental => "fundamental_analysis",
            FactorCategory::News => "news_sentiment",
            FactorCategory::Social => "social_sentiment",
        }
    }
}

/// One independent contributor to a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionFactor {
    pub name: String,
    pub category: FactorCategory,
    pub signal: Signal,
    pub confidence: f64,
    pub weight: f64,
    pub reasoning: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl DecisionFactor {
    /// Confidence is clamped to [0, 1]. The source tag defaults to the
    /// category name.
    pub fn new(
        name: impl Into<String>,
        category: FactorCategory,
        signal: Signal,
        confidence: f64,
        weight: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            name: name.into(),
            category,
            signal,
            confidence,
            weight,
            reasoning: String::new(),
            source: category.as_str().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// This factor's mass in its signal bucket.
    pub fn contribution(&self) -> f64 {
        self.confidence * self.weight
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDecision {
    pub symbol: String,
    pub signal: Signal,
    pub confidence: f64,
    pub risk_score: f64,
    /// Fraction of the portfolio, 0.0 to 0.25.
    pub position_size: f64,
    pub factors: Vec<DecisionFactor>,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}
