use std::collections::VecDeque;

use crate::api::Bar;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Latest MACD reading plus the histogram one bar earlier, if there is one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    pub previous_histogram: Option<f64>,
}

/// Rolling close/volume window with the indicator math the analyzers need.
/// Every method returns `None` when the window is too short.
pub struct Indicators {
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
    max_len: usize,
}

impl Indicators {
    pub fn new(max_len: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(max_len),
            volumes: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut indicators = Self::new(bars.len().max(1));
        for bar in bars {
            indicators.add_data(bar.close, bar.volume);
        }
        indicators
    }

    pub fn add_data(&mut self, price: f64, volume: f64) {
        if self.prices.len() >= self.max_len {
            self.prices.pop_front();
            self.volumes.pop_front();
        }

        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    pub fn sma(&self, period: usize) -> Option<f64> {
        self.sma_back(period, 0)
    }

    /// SMA of the window ending `bars_back` bars before the latest.
    pub fn sma_back(&self, period: usize, bars_back: usize) -> Option<f64> {
        if period == 0 || self.prices.len() < period + bars_back {
            return None;
        }

        let sum: f64 = self.prices.iter().rev().skip(bars_back).take(period).sum();
        Some(sum / period as f64)
    }

    /// Wilder's RSI: simple average over the first `period` changes, then
    /// smoothed with `(prev * (period - 1) + current) / period`.
    pub fn rsi(&self, period: usize) -> Option<f64> {
        if period == 0 || self.prices.len() < period + 1 {
            return None;
        }

        let changes: Vec<f64> = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .map(|(prev, curr)| curr - prev)
            .collect();

        let p = period as f64;
        let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / p;
        let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / p;

        for change in &changes[period..] {
            avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
            avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        }

        if avg_loss == 0.0 {
            return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - (100.0 / (1.0 + rs)))
    }

    pub fn macd(&self, fast: usize, slow: usize, signal: usize) -> Option<MacdSnapshot> {
        if fast == 0 || fast >= slow {
            return None;
        }
        let prices: Vec<f64> = self.prices.iter().copied().collect();
        let fast_ema = ema_series(&prices, fast);
        let slow_ema = ema_series(&prices, slow);
        if slow_ema.is_empty() {
            return None;
        }

        // fast_ema starts `slow - fast` bars earlier than slow_ema.
        let offset = slow - fast;
        let macd_line: Vec<f64> = slow_ema
            .iter()
            .enumerate()
            .map(|(i, slow)| fast_ema[i + offset] - slow)
            .collect();

        let signal_line = ema_series(&macd_line, signal);
        let signal_now = *signal_line.last()?;
        let macd_now = *macd_line.last()?;

        let previous_histogram = if signal_line.len() >= 2 {
            let n = macd_line.len();
            Some(macd_line[n - 2] - signal_line[signal_line.len() - 2])
        } else {
            None
        };

        Some(MacdSnapshot {
            macd: macd_now,
            signal: signal_now,
            histogram: macd_now - signal_now,
            previous_histogram,
        })
    }

    /// Population std of simple close-to-close returns, annualized.
    pub fn annualized_volatility(&self) -> Option<f64> {
        if self.prices.len() < 2 {
            return None;
        }

        let returns: Vec<f64> = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .filter(|(prev, _)| **prev != 0.0)
            .map(|(prev, curr)| (curr - prev) / prev)
            .collect();
        if returns.is_empty() {
            return None;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
    }

    /// Latest volume over the average of the trailing `period` volumes.
    pub fn volume_ratio(&self, period: usize) -> Option<f64> {
        if period == 0 || self.volumes.len() < period {
            return None;
        }

        let recent_avg: f64 =
            self.volumes.iter().rev().take(period).sum::<f64>() / period as f64;
        if recent_avg <= 0.0 {
            return None;
        }
        let latest = *self.volumes.back()?;

        Some(latest / recent_avg)
    }

    /// Fractional change of the latest close over the one before it.
    pub fn last_change(&self) -> Option<f64> {
        let n = self.prices.len();
        if n < 2 || self.prices[n - 2] == 0.0 {
            return None;
        }
        Some((self.prices[n - 1] - self.prices[n - 2]) / self.prices[n - 2])
    }
}

/// EMA seeded with the SMA of the first `period` values. Element `i` of the
/// result lines up with `values[i + period - 1]`.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
        out.push(ema);
    }
    out
}
