use super::indicators::Indicators;
use super::signals::{DecisionFactor, FactorCategory, Signal};
use crate::api::Bar;

pub const RSI_WEIGHT: f64 = 0.15;
pub const MA_WEIGHT: f64 = 0.20;
pub const MACD_WEIGHT: f64 = 0.15;
pub const VOLUME_WEIGHT: f64 = 0.10;

const RSI_PERIOD: usize = 14;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;
/// RSI points past a threshold at which confidence saturates.
const RSI_SPAN: f64 = 20.0;

const MA_FAST: usize = 20;
const MA_SLOW: usize = 50;

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

const VOLUME_PERIOD: usize = 20;
const VOLUME_SURGE: f64 = 1.5;
const VOLUME_DRY: f64 = 0.5;
const VOLUME_MIN_MOVE: f64 = 0.02;

/// Indicator-driven factors. Short histories produce fewer factors, never
/// an error.
#[derive(Debug, Clone, Default)]
pub struct TechnicalAnalyzer;

impl TechnicalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, bars: &[Bar], current_price: f64) -> Vec<DecisionFactor> {
        let indicators = Indicators::from_bars(bars);

        [
            self.rsi_factor(&indicators),
            self.moving_average_factor(&indicators, current_price),
            self.macd_factor(&indicators),
            self.volume_factor(&indicators),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn rsi_factor(&self, indicators: &Indicators) -> Option<DecisionFactor> {
        let rsi = indicators.rsi(RSI_PERIOD)?;

        let (signal, confidence, reason) = if rsi > RSI_OVERBOUGHT {
            (
                Signal::Sell,
                ((rsi - RSI_OVERBOUGHT) / RSI_SPAN).min(1.0),
                format!("RSI {:.1} is overbought", rsi),
            )
        } else if rsi < RSI_OVERSOLD {
            (
                Signal::Buy,
                ((RSI_OVERSOLD - rsi) / RSI_SPAN).min(1.0),
                format!("RSI {:.1} is oversold", rsi),
            )
        } else {
            (
                Signal::Hold,
                1.0 - (rsi - 50.0).abs() / RSI_SPAN,
                format!("RSI {:.1} is neutral", rsi),
            )
        };

        Some(
            DecisionFactor::new("RSI", FactorCategory::Technical, signal, confidence, RSI_WEIGHT)
                .with_reason(reason),
        )
    }

    fn moving_average_factor(
        &self,
        indicators: &Indicators,
        price: f64,
    ) -> Option<DecisionFactor> {
        let fast = indicators.sma(MA_FAST)?;
        let slow = indicators.sma(MA_SLOW)?;
        let previous = indicators
            .sma_back(MA_FAST, 1)
            .zip(indicators.sma_back(MA_SLOW, 1));

        let (signal, confidence, reason) = match previous {
            Some((pf, ps)) if pf <= ps && fast > slow => (
                Signal::Buy,
                0.9,
                format!("MA{} crossed above MA{} (golden cross)", MA_FAST, MA_SLOW),
            ),
            Some((pf, ps)) if pf >= ps && fast < slow => (
                Signal::Sell,
                0.9,
                format!("MA{} crossed below MA{} (death cross)", MA_FAST, MA_SLOW),
            ),
            _ if price > fast && price > slow && fast > slow => (
                Signal::Buy,
                0.8,
                format!("price {:.2} above rising MA{} {:.2} / MA{} {:.2}", price, MA_FAST, fast, MA_SLOW, slow),
            ),
            _ if price < fast && price < slow && fast < slow => (
                Signal::Sell,
                0.8,
                format!("price {:.2} below falling MA{} {:.2} / MA{} {:.2}", price, MA_FAST, fast, MA_SLOW, slow),
            ),
            _ => (
                Signal::Hold,
                0.5,
                format!("no clear trend (MA{} {:.2}, MA{} {:.2})", MA_FAST, fast, MA_SLOW, slow),
            ),
        };

        Some(
            DecisionFactor::new(
                "Moving Averages",
                FactorCategory::Technical,
                signal,
                confidence,
                MA_WEIGHT,
            )
            .with_reason(reason),
        )
    }

    fn macd_factor(&self, indicators: &Indicators) -> Option<DecisionFactor> {
        let snap = indicators.macd(MACD_FAST, MACD_SLOW, MACD_SIGNAL)?;
        let hist = snap.histogram;

        let (signal, confidence, reason) = match snap.previous_histogram {
            Some(prev) if prev <= 0.0 && hist > 0.0 => {
                (Signal::Buy, 0.8, "MACD crossed above signal line".to_string())
            }
            Some(prev) if prev >= 0.0 && hist < 0.0 => {
                (Signal::Sell, 0.8, "MACD crossed below signal line".to_string())
            }
            _ if hist > 0.0 => (Signal::Buy, 0.6, format!("MACD histogram positive ({:.3})", hist)),
            _ if hist < 0.0 => (Signal::Sell, 0.6, format!("MACD histogram negative ({:.3})", hist)),
            _ => (Signal::Hold, 0.5, "MACD flat".to_string()),
        };

        Some(
            DecisionFactor::new("MACD", FactorCategory::Technical, signal, confidence, MACD_WEIGHT)
                .with_reason(reason),
        )
    }

    fn volume_factor(&self, indicators: &Indicators) -> Option<DecisionFactor> {
        let ratio = indicators.volume_ratio(VOLUME_PERIOD)?;
        let change = indicators.last_change().unwrap_or(0.0);

        let (signal, confidence, reason) = if ratio > VOLUME_SURGE && change.abs() >= VOLUME_MIN_MOVE {
            let signal = if change > 0.0 { Signal::Buy } else { Signal::Sell };
            (
                signal,
                (ratio / 2.0).min(1.0),
                format!(
                    "volume {:.1}x average confirms {:+.1}% move",
                    ratio,
                    change * 100.0
                ),
            )
        } else if ratio < VOLUME_DRY {
            (
                Signal::Hold,
                0.3,
                format!("volume {:.1}x average, low conviction", ratio),
            )
        } else {
            (Signal::Hold, 0.5, format!("volume {:.1}x average", ratio))
        };

        Some(
            DecisionFactor::new("Volume", FactorCategory::Technical, signal, confidence, VOLUME_WEIGHT)
                .with_reason(reason),
        )
    }
}
