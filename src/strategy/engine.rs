use std::sync::Arc;

use super::aggregator::FactorAggregator;
use super::candlestick::CandlestickAnalyzer;
use super::fundamentals::{FundamentalAnalyzer, FundamentalData, NewsSentiment, SocialSentiment};
use super::risk::{RiskConfig, RiskManager};
use super::signals::TradingDecision;
use super::technical::TechnicalAnalyzer;
use crate::api::{Bar, Quote};
use crate::core::{EngineError, EngineMetrics};

/// Runs every analyzer over already-fetched data and aggregates the result.
/// Pure computation: no I/O, no suspension points.
pub struct DecisionEngine {
    technical: TechnicalAnalyzer,
    candlestick: CandlestickAnalyzer,
    fundamentals: FundamentalAnalyzer,
    aggregator: FactorAggregator,
    metrics: Option<Arc<EngineMetrics>>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

impl DecisionEngine {
    pub fn new(risk: RiskConfig) -> Self {
        Self {
            technical: TechnicalAnalyzer::new(),
            candlestick: CandlestickAnalyzer::new(),
            fundamentals: FundamentalAnalyzer::new(),
            aggregator: FactorAggregator::new(RiskManager::new(risk)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fails only on malformed required inputs. Missing optional records
    /// just mean fewer factors.
    pub fn get_decision(
        &self,
        symbol: &str,
        quote: &Quote,
        history: &[Bar],
        fundamental: Option<&FundamentalData>,
        news: Option<&NewsSentiment>,
        social: Option<&SocialSentiment>,
    ) -> Result<TradingDecision, EngineError> {
        let symbol = symbol.trim().to_uppercase();
        validate_inputs(&symbol, quote, history)?;

        let mut factors = self.technical.analyze(history, quote.price);
        factors.extend(self.candlestick.analyze(history));
        factors.extend(self.fundamentals.analyze(fundamental, news, social));

        let decision = self.aggregator.aggregate(&symbol, factors, history);

        tracing::info!(
            "🎯 {} → {} ({:.0}% confidence, risk {:.2}, size {:.1}%, {} factors)",
            decision.symbol,
            decision.signal,
            decision.confidence * 100.0,
            decision.risk_score,
            decision.position_size * 100.0,
            decision.factors.len()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.signal);
        }

        Ok(decision)
    }
}

fn validate_inputs(symbol: &str, quote: &Quote, history: &[Bar]) -> Result<(), EngineError> {
    if symbol.is_empty() {
        return Err(EngineError::DegenerateInput("blank symbol".into()));
    }
    if !quote.symbol.eq_ignore_ascii_case(symbol) {
        return Err(EngineError::DegenerateInput(format!(
            "quote is for {} but decision requested for {}",
            quote.symbol, symbol
        )));
    }
    if !quote.price.is_finite() || quote.price <= 0.0 {
        return Err(EngineError::DegenerateInput(format!(
            "{} has invalid price {}",
            symbol, quote.price
        )));
    }

    for (i, bar) in history.iter().enumerate() {
        let finite = [bar.open, bar.high, bar.low, bar.close, bar.volume]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bar.low > bar.high || bar.volume < 0.0 {
            return Err(EngineError::DegenerateInput(format!(
                "malformed bar {} in {} history",
                i, symbol
            )));
        }
        if i > 0 && bar.timestamp <= history[i - 1].timestamp {
            return Err(EngineError::DegenerateInput(format!(
                "{} history is not in chronological order at bar {}",
                symbol, i
            )));
        }
    }

    Ok(())
}
