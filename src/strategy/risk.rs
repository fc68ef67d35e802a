use serde::Deserialize;

use super::indicators::Indicators;
use super::signals::DecisionFactor;
use crate::api::Bar;

const VOLATILITY_WEIGHT: f64 = 0.4;
const LOW_VOLUME_PENALTY: f64 = 0.3;
const LOW_VOLUME_RATIO: f64 = 0.5;
const VOLUME_PERIOD: usize = 20;
const DISAGREEMENT_PENALTY: f64 = 0.3;

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub max_position_fraction: f64,    // Hard cap, 25% of portfolio
    pub base_position_fraction: f64,   // Scales confidence * (1 - risk)
    pub low_confidence_threshold: f64, // Below this the size is halved
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.25,
            base_position_fraction: 0.5,
            low_confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Volatility (up to 0.4), thin volume (0.3) and factor disagreement
    /// (up to 0.3), capped at 1.0. Without enough history to measure
    /// volatility the full 0.4 is charged.
    pub fn risk_score(&self, bars: &[Bar], factors: &[DecisionFactor]) -> f64 {
        let indicators = Indicators::from_bars(bars);

        let volatility = indicators
            .annualized_volatility()
            .map(|v| v.min(1.0) * VOLATILITY_WEIGHT)
            .unwrap_or(VOLATILITY_WEIGHT);

        let volume = match indicators.volume_ratio(VOLUME_PERIOD) {
            Some(ratio) if ratio < LOW_VOLUME_RATIO => LOW_VOLUME_PENALTY,
            _ => 0.0,
        };

        let disagreement = if factors.is_empty() {
            0.0
        } else {
            let buys = factors.iter().filter(|f| f.signal.is_bullish()).count();
            let sells = factors.iter().filter(|f| f.signal.is_bearish()).count();
            DISAGREEMENT_PENALTY * buys.min(sells) as f64 / factors.len() as f64
        };

        let score = (volatility + volume + disagreement).min(1.0);
        tracing::debug!(
            "📊 Risk: volatility={:.3} volume={:.2} disagreement={:.3} total={:.3}",
            volatility,
            volume,
            disagreement,
            score
        );
        score
    }

    /// Fraction of the portfolio to commit, within `[0, max_position_fraction]`.
    pub fn position_size(&self, confidence: f64, risk_score: f64) -> f64 {
        let mut size = confidence * self.config.base_position_fraction * (1.0 - risk_score);
        if confidence < self.config.low_confidence_threshold {
            size /= 2.0;
        }
        size.clamp(0.0, self.config.max_position_fraction)
    }
}
