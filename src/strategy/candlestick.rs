use serde::Serialize;

use super::signals::{DecisionFactor, FactorCategory, Signal};
use crate::api::Bar;

pub const PATTERN_WEIGHT: f64 = 0.10;
pub const CONFIDENCE_FLOOR: f64 = 0.3;

const DOJI_MAX_BODY: f64 = 0.10;
const HAMMER_MAX_BODY: f64 = 0.30;
const HAMMER_MIN_SHADOW: f64 = 0.60;
const HAMMER_MAX_OPPOSITE_SHADOW: f64 = 0.10;
/// A "long" candle has a body of at least this share of its range.
const LONG_BODY: f64 = 0.50;
/// Middle star body relative to the first candle's body.
const STAR_MAX_BODY: f64 = 0.30;
const TREND_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CandlestickPattern {
    Doji,
    Hammer,
    HangingMan,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
    ShootingStar,
    InvertedHammer,
    DarkCloudCover,
    PiercingPattern,
}

impl CandlestickPattern {
    pub const ALL: [CandlestickPattern; 11] = [
        CandlestickPattern::Doji,
        CandlestickPattern::Hammer,
        CandlestickPattern::HangingMan,
        CandlestickPattern::BullishEngulfing,
        CandlestickPattern::BearishEngulfing,
        CandlestickPattern::MorningStar,
        CandlestickPattern::EveningStar,
        CandlestickPattern::ShootingStar,
        CandlestickPattern::InvertedHammer,
        CandlestickPattern::DarkCloudCover,
        CandlestickPattern::PiercingPattern,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CandlestickPattern::Doji => "Doji",
            CandlestickPattern::Hammer => "Hammer",
            CandlestickPattern::HangingMan => "Hanging Man",
            CandlestickPattern::BullishEngulfing => "Bullish Engulfing",
            CandlestickPattern::BearishEngulfing => "Bearish Engulfing",
            CandlestickPattern::MorningStar => "Morning Star",
            CandlestickPattern::EveningStar => "Evening Star",
            CandlestickPattern::ShootingStar => "Shooting Star",
            CandlestickPattern::InvertedHammer => "Inverted Hammer",
            CandlestickPattern::DarkCloudCover => "Dark Cloud Cover",
            CandlestickPattern::PiercingPattern => "Piercing Pattern",
        }
    }

    /// Static pattern to signal table. Adding a variant without an entry
    /// fails to compile.
    pub fn signal(&self) -> Signal {
        match self {
            CandlestickPattern::Doji => Signal::Hold,
            CandlestickPattern::Hammer
            | CandlestickPattern::BullishEngulfing
            | CandlestickPattern::MorningStar
            | CandlestickPattern::InvertedHammer
            | CandlestickPattern::PiercingPattern => Signal::Buy,
            CandlestickPattern::HangingMan
            | CandlestickPattern::BearishEngulfing
            | CandlestickPattern::EveningStar
            | CandlestickPattern::ShootingStar
            | CandlestickPattern::DarkCloudCover => Signal::Sell,
        }
    }

    /// Bars the pattern spans, ending at the latest bar.
    pub fn span(&self) -> usize {
        match self {
            CandlestickPattern::Doji
            | CandlestickPattern::Hammer
            | CandlestickPattern::HangingMan
            | CandlestickPattern::ShootingStar
            | CandlestickPattern::InvertedHammer => 1,
            CandlestickPattern::BullishEngulfing
            | CandlestickPattern::BearishEngulfing
            | CandlestickPattern::DarkCloudCover
            | CandlestickPattern::PiercingPattern => 2,
            CandlestickPattern::MorningStar | CandlestickPattern::EveningStar => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern: CandlestickPattern,
    /// How far past its thresholds the pattern is, 0.0 to 1.0.
    pub strength: f64,
}

impl PatternMatch {
    /// Barely-qualifying shapes land under the confidence floor.
    pub fn confidence(&self) -> f64 {
        (0.25 + 0.75 * self.strength).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Default)]
pub struct CandlestickAnalyzer;

impl CandlestickAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, bars: &[Bar]) -> Vec<DecisionFactor> {
        self.detect(bars)
            .into_iter()
            .filter(|m| m.confidence() >= CONFIDENCE_FLOOR)
            .map(|m| {
                DecisionFactor::new(
                    m.pattern.name(),
                    FactorCategory::Pattern,
                    m.pattern.signal(),
                    m.confidence(),
                    PATTERN_WEIGHT,
                )
                .with_reason(format!(
                    "{} on the last {} bar(s), strength {:.2}",
                    m.pattern.name(),
                    m.pattern.span(),
                    m.strength
                ))
            })
            .collect()
    }

    /// Every pattern formed by the most recent one to three bars.
    pub fn detect(&self, bars: &[Bar]) -> Vec<PatternMatch> {
        let Some(last) = bars.last() else {
            return Vec::new();
        };
        let mut found = Vec::new();

        if last.range() > 0.0 {
            let trend = prior_trend(bars);
            found.extend(doji(last));
            found.extend(hammer_shape(last, trend));
            found.extend(inverted_hammer_shape(last, trend));
        }

        if bars.len() >= 2 {
            let prev = &bars[bars.len() - 2];
            found.extend(engulfing(prev, last));
            found.extend(dark_cloud_cover(prev, last));
            found.extend(piercing(prev, last));
        }

        if bars.len() >= 3 {
            let n = bars.len();
            found.extend(star(&bars[n - 3], &bars[n - 2], last));
        }

        found
    }
}

fn matched(pattern: CandlestickPattern, strength: f64) -> Option<PatternMatch> {
    Some(PatternMatch {
        pattern,
        strength: strength.clamp(0.0, 1.0),
    })
}

/// Direction of the closes leading into the latest bar.
fn prior_trend(bars: &[Bar]) -> Trend {
    let n = bars.len();
    if n < 3 {
        return Trend::Flat;
    }
    let window = &bars[n.saturating_sub(TREND_LOOKBACK + 1)..n - 1];
    let (first, last) = (window[0].close, window[window.len() - 1].close);
    if last > first {
        Trend::Up
    } else if last < first {
        Trend::Down
    } else {
        Trend::Flat
    }
}

fn doji(bar: &Bar) -> Option<PatternMatch> {
    let ratio = bar.body() / bar.range();
    if ratio > DOJI_MAX_BODY {
        return None;
    }
    matched(CandlestickPattern::Doji, 1.0 - ratio / DOJI_MAX_BODY)
}

/// Small body on top of a long lower shadow. Bullish after a decline
/// (hammer), bearish after a rally (hanging man).
fn hammer_shape(bar: &Bar, trend: Trend) -> Option<PatternMatch> {
    let range = bar.range();
    let strength = long_shadow_strength(
        bar.body() / range,
        bar.lower_shadow() / range,
        bar.upper_shadow() / range,
    )?;
    let pattern = if trend == Trend::Up {
        CandlestickPattern::HangingMan
    } else {
        CandlestickPattern::Hammer
    };
    matched(pattern, strength)
}

/// Mirror of the hammer: long upper shadow. Bearish after a rally
/// (shooting star), bullish otherwise (inverted hammer).
fn inverted_hammer_shape(bar: &Bar, trend: Trend) -> Option<PatternMatch> {
    let range = bar.range();
    let strength = long_shadow_strength(
        bar.body() / range,
        bar.upper_shadow() / range,
        bar.lower_shadow() / range,
    )?;
    let pattern = if trend == Trend::Up {
        CandlestickPattern::ShootingStar
    } else {
        CandlestickPattern::InvertedHammer
    };
    matched(pattern, strength)
}

fn long_shadow_strength(body: f64, shadow: f64, opposite: f64) -> Option<f64> {
    if body > HAMMER_MAX_BODY || shadow < HAMMER_MIN_SHADOW || opposite > HAMMER_MAX_OPPOSITE_SHADOW {
        return None;
    }
    let margins = [
        1.0 - body / HAMMER_MAX_BODY,
        (shadow - HAMMER_MIN_SHADOW) / (1.0 - HAMMER_MIN_SHADOW),
        1.0 - opposite / HAMMER_MAX_OPPOSITE_SHADOW,
    ];
    Some(margins.iter().sum::<f64>() / margins.len() as f64)
}

fn engulfing(prev: &Bar, curr: &Bar) -> Option<PatternMatch> {
    if prev.body() <= 0.0 || curr.body() <= prev.body() {
        return None;
    }
    let strength = (curr.body() / prev.body() - 1.0).min(1.0);

    if prev.is_bearish() && curr.is_bullish() && curr.open <= prev.close && curr.close >= prev.open {
        return matched(CandlestickPattern::BullishEngulfing, strength);
    }
    if prev.is_bullish() && curr.is_bearish() && curr.open >= prev.close && curr.close <= prev.open {
        return matched(CandlestickPattern::BearishEngulfing, strength);
    }
    None
}

fn is_long(bar: &Bar) -> bool {
    bar.range() > 0.0 && bar.body() >= LONG_BODY * bar.range()
}

fn dark_cloud_cover(prev: &Bar, curr: &Bar) -> Option<PatternMatch> {
    if !(prev.is_bullish() && is_long(prev) && curr.is_bearish()) {
        return None;
    }
    let mid = prev.body_midpoint();
    if curr.open > prev.close && curr.close < mid && curr.close > prev.open {
        return matched(
            CandlestickPattern::DarkCloudCover,
            (mid - curr.close) / (prev.body() / 2.0),
        );
    }
    None
}

fn piercing(prev: &Bar, curr: &Bar) -> Option<PatternMatch> {
    if !(prev.is_bearish() && is_long(prev) && curr.is_bullish()) {
        return None;
    }
    let mid = prev.body_midpoint();
    if curr.open < prev.close && curr.close > mid && curr.close < prev.open {
        return matched(
            CandlestickPattern::PiercingPattern,
            (curr.close - mid) / (prev.body() / 2.0),
        );
    }
    None
}

/// Long candle, small-bodied star, then a candle closing back past the
/// first candle's midpoint.
fn star(first: &Bar, middle: &Bar, last: &Bar) -> Option<PatternMatch> {
    if !is_long(first) || middle.body() > STAR_MAX_BODY * first.body() {
        return None;
    }
    let mid = first.body_midpoint();
    let half_body = first.body() / 2.0;

    if first.is_bearish() && last.is_bullish() && last.close > mid {
        return matched(CandlestickPattern::MorningStar, (last.close - mid) / half_body);
    }
    if first.is_bullish() && last.is_bearish() && last.close < mid {
        return matched(CandlestickPattern::EveningStar, (mid - last.close) / half_body);
    }
    None
}
