use chrono::Utc;

use super::risk::RiskManager;
use super::signals::{DecisionFactor, Signal, TradingDecision};
use crate::api::Bar;

/// Ties resolve toward the earlier entry.
const TIE_ORDER: [Signal; 5] = [
    Signal::Hold,
    Signal::Buy,
    Signal::Sell,
    Signal::StrongBuy,
    Signal::StrongSell,
];

const TOP_FACTORS_IN_REASONING: usize = 3;

/// Normalized per-bucket scores of one factor batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
    pub strong_sell: f64,
}

impl SignalScores {
    pub fn from_factors(factors: &[DecisionFactor]) -> Self {
        let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
        let bucket = |signal: Signal| {
            if total_weight <= 0.0 {
                return 0.0;
            }
            factors
                .iter()
                .filter(|f| f.signal == signal)
                .map(DecisionFactor::contribution)
                .sum::<f64>()
                / total_weight
        };

        Self {
            strong_buy: bucket(Signal::StrongBuy),
            buy: bucket(Signal::Buy),
            hold: bucket(Signal::Hold),
            sell: bucket(Signal::Sell),
            strong_sell: bucket(Signal::StrongSell),
        }
    }

    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::StrongBuy => self.strong_buy,
            Signal::Buy => self.buy,
            Signal::Hold => self.hold,
            Signal::Sell => self.sell,
            Signal::StrongSell => self.strong_sell,
        }
    }

    pub fn best(&self) -> (Signal, f64) {
        TIE_ORDER
            .iter()
            .fold((Signal::Hold, f64::NEG_INFINITY), |(best, top), s| {
                let score = self.get(*s);
                if score > top {
                    (*s, score)
                } else {
                    (best, top)
                }
            })
    }

    pub fn bullish(&self) -> f64 {
        self.strong_buy + self.buy
    }

    pub fn bearish(&self) -> f64 {
        self.strong_sell + self.sell
    }

    /// Share of directional mass on the dominant side, `None` when no
    /// factor is directional.
    pub fn agreement(&self) -> Option<f64> {
        let directional = self.bullish() + self.bearish();
        (directional > 0.0).then(|| self.bullish().max(self.bearish()) / directional)
    }
}

/// Weighted vote over all factors. Holds no state between decisions.
#[derive(Debug, Clone, Default)]
pub struct FactorAggregator {
    risk: RiskManager,
}

impl FactorAggregator {
    pub fn new(risk: RiskManager) -> Self {
        Self { risk }
    }

    pub fn aggregate(
        &self,
        symbol: &str,
        mut factors: Vec<DecisionFactor>,
        bars: &[Bar],
    ) -> TradingDecision {
        if factors.is_empty() {
            return TradingDecision {
                symbol: symbol.to_string(),
                signal: Signal::Hold,
                confidence: 0.0,
                risk_score: 1.0,
                position_size: 0.0,
                factors,
                reasoning: "No decision factors were available; holding.".to_string(),
                timestamp: Utc::now(),
            };
        }

        let scores = SignalScores::from_factors(&factors);
        let (signal, best) = scores.best();
        let agreement = scores.agreement();
        let confidence = match agreement {
            Some(a) => best * (0.5 + 0.5 * a),
            None => best,
        }
        .clamp(0.0, 1.0);

        let risk_score = self.risk.risk_score(bars, &factors);
        let position_size = self.risk.position_size(confidence, risk_score);

        factors.sort_by(|a, b| b.contribution().total_cmp(&a.contribution()));
        let reasoning = explain(signal, confidence, agreement, risk_score, &factors);

        TradingDecision {
            symbol: symbol.to_string(),
            signal,
            confidence,
            risk_score,
            position_size,
            factors,
            reasoning,
            timestamp: Utc::now(),
        }
    }
}

fn explain(
    signal: Signal,
    confidence: f64,
    agreement: Option<f64>,
    risk_score: f64,
    factors: &[DecisionFactor],
) -> String {
    let bullish = factors.iter().filter(|f| f.signal.is_bullish()).count();
    let bearish = factors.iter().filter(|f| f.signal.is_bearish()).count();
    let neutral = factors.len() - bullish - bearish;

    let top: Vec<String> = factors
        .iter()
        .take(TOP_FACTORS_IN_REASONING)
        .map(|f| format!("{} {} ({:.0}%): {}", f.name, f.signal, f.confidence * 100.0, f.reasoning))
        .collect();

    let agreement = agreement
        .map(|a| format!("{:.0}% directional agreement", a * 100.0))
        .unwrap_or_else(|| "no directional factors".to_string());

    format!(
        "{} at {:.0}% confidence from {} factors ({} bullish, {} bearish, {} neutral; {}), risk {:.2}. Top: {}",
        signal,
        confidence * 100.0,
        factors.len(),
        bullish,
        bearish,
        neutral,
        agreement,
        risk_score,
        top.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::signals::FactorCategory;
    use pretty_assertions::assert_eq;

    fn factor(signal: Signal, confidence: f64, weight: f64) -> DecisionFactor {
        DecisionFactor::new(format!("{}", signal), FactorCategory::Technical, signal, confidence, weight)
    }

    #[test]
    fn test_zero_factors_is_degenerate_hold() {
        let decision = FactorAggregator::default().aggregate("AAPL", Vec::new(), &[]);
        assert_eq!(decision.signal, Signal::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.risk_score, 1.0);
        assert_eq!(decision.position_size, 0.0);
        assert!(decision.reasoning.contains("No decision factors"));
    }

    #[test]
    fn test_unanimous_buy_gets_agreement_boost() {
        let factors = vec![
            factor(Signal::Buy, 0.8, 0.15),
            factor(Signal::Buy, 0.8, 0.20),
            factor(Signal::Buy, 0.8, 0.10),
        ];
        let decision = FactorAggregator::default().aggregate("AAPL", factors.clone(), &[]);

        assert_eq!(decision.signal, Signal::Buy);
        assert!((decision.confidence - 0.8).abs() < 1e-9);
        for f in &factors {
            assert!(decision.confidence > f.contribution());
        }
    }

    #[test]
    fn test_disagreement_dampens_confidence() {
        let factors = vec![
            factor(Signal::Buy, 0.9, 0.2),
            factor(Signal::Sell, 0.6, 0.2),
        ];
        let decision = FactorAggregator::default().aggregate("AAPL", factors, &[]);
        assert_eq!(decision.signal, Signal::Buy);
        // best 0.45, agreement 0.6 -> 0.45 * 0.8
        assert!((decision.confidence - 0.36).abs() < 1e-9);
        // Sorted by contribution.
        assert_eq!(decision.factors[0].signal, Signal::Buy);
    }

    #[test]
    fn test_pure_hold_uses_best_score() {
        let decision = FactorAggregator::default()
            .aggregate("AAPL", vec![factor(Signal::Hold, 0.5, 0.1)], &[]);
        assert_eq!(decision.signal, Signal::Hold);
        assert!((decision.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ties_resolve_to_hold() {
        let scores = SignalScores::from_factors(&[
            factor(Signal::Hold, 0.5, 0.1),
            factor(Signal::Buy, 0.5, 0.1),
        ]);
        assert_eq!(scores.best().0, Signal::Hold);
    }

    #[test]
    fn test_position_size_is_bounded() {
        let factors = vec![factor(Signal::StrongBuy, 1.0, 1.0)];
        let decision = FactorAggregator::default().aggregate("AAPL", factors, &[]);
        assert!(decision.position_size >= 0.0 && decision.position_size <= 0.25);
        assert!(decision.confidence <= 1.0);
    }
}
