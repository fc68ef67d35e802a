pub mod aggregator;
pub mod candlestick;
pub mod engine;
pub mod fundamentals;
pub mod indicators;
pub mod risk;
pub mod signals;
pub mod technical;

pub use aggregator::FactorAggregator;
pub use candlestick::{CandlestickAnalyzer, CandlestickPattern};
pub use engine::DecisionEngine;
pub use fundamentals::{FundamentalData, NewsSentiment, SocialSentiment};
pub use risk::{RiskConfig, RiskManager};
pub use signals::{DecisionFactor, FactorCategory, Signal, TradingDecision};
pub use technical::TechnicalAnalyzer;
