//! Pure technical-indicator math over a price slice. Spec.md §4.4. Every
//! function takes `&[f64]` (closing prices, oldest first) and returns
//! `Option`/fills a fixed-schema map with neutral defaults when there isn't
//! enough history — nothing here ever panics on a short slice.

use statrs::statistics::Statistics;
use std::collections::HashMap;

pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }
    let window = &prices[prices.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

pub fn ema_series(prices: &[f64], period: usize) -> Option<Vec<f64>> {
    if prices.len() < period || period == 0 {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(prices.len());
    let seed = prices[..period].iter().sum::<f64>() / period as f64;
    out.push(seed);
    for price in &prices[period..] {
        let prev = *out.last().unwrap();
        out.push(price * k + prev * (1.0 - k));
    }
    Some(out)
}

pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).and_then(|s| s.last().copied())
}

/// Wilder's RSI.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    let diffs: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &diffs[diffs.len() - period..];
    let gains: f64 = recent.iter().filter(|d| **d > 0.0).sum();
    let losses: f64 = recent.iter().filter(|d| **d < 0.0).map(|d| -d).sum();
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<Macd> {
    if prices.len() < slow + signal_period {
        return None;
    }
    let fast_series = ema_series(prices, fast)?;
    let slow_series = ema_series(prices, slow)?;
    let offset = fast_series.len() - slow_series.len();
    let macd_series: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, slow_v)| fast_series[i + offset] - slow_v)
        .collect();
    if macd_series.len() < signal_period {
        return None;
    }
    let signal_series = ema_series(&macd_series, signal_period)?;
    let line = *macd_series.last()?;
    let signal = *signal_series.last()?;
    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn bollinger(prices: &[f64], period: usize, num_std: f64) -> Option<Bollinger> {
    if prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let std = window.to_vec().std_dev();
    Some(Bollinger {
        upper: middle + num_std * std,
        middle,
        lower: middle - num_std * std,
    })
}

/// Average true range approximated from closes only (no high/low feed in
/// this system's data contract — spec.md §3 ticker has no OHLC, just last
/// trade price), so true range degenerates to `|close[i] - close[i-1]|`.
pub fn atr(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    let ranges: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let recent = &ranges[ranges.len() - period..];
    Some(recent.iter().sum::<f64>() / period as f64)
}

/// Stdev of simple returns over the slice, as a percentage.
pub fn volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }
    Some(returns.std_dev())
}

pub fn momentum(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    Some(prices[prices.len() - 1] - prices[prices.len() - 1 - period])
}

pub fn roc(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    let past = prices[prices.len() - 1 - period];
    if past == 0.0 {
        return None;
    }
    Some((prices[prices.len() - 1] - past) / past * 100.0)
}

pub fn stochastic(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    let high = window.iter().cloned().fold(f64::MIN, f64::max);
    let low = window.iter().cloned().fold(f64::MAX, f64::min);
    if (high - low).abs() < f64::EPSILON {
        return Some(50.0);
    }
    let current = *window.last().unwrap();
    Some((current - low) / (high - low) * 100.0)
}

pub fn williams_r(prices: &[f64], period: usize) -> Option<f64> {
    stochastic(prices, period).map(|s| s - 100.0)
}

/// Assembles every indicator into a fixed-key map, one entry per indicator
/// name, `None` where there isn't enough history yet. Used by FeatureEngine
/// to populate `FeatureVector`'s indicator fields without each caller
/// re-deriving windows.
pub fn calculate_all(prices: &[f64]) -> HashMap<&'static str, Option<f64>> {
    let mut out = HashMap::new();
    out.insert("sma_5", sma(prices, 5));
    out.insert("sma_20", sma(prices, 20));
    out.insert("sma_60", sma(prices, 60));
    out.insert("ema_12", ema(prices, 12));
    out.insert("ema_26", ema(prices, 26));
    out.insert("rsi_14", rsi(prices, 14));
    out.insert("atr_14", atr(prices, 14));
    out.insert("volatility", volatility(prices));
    out.insert("momentum_10", momentum(prices, 10));
    out.insert("roc_10", roc(prices, 10));
    out.insert("stochastic_14", stochastic(prices, 14));
    out.insert("williams_r_14", williams_r(prices, 14));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_basic() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0], 2), None);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let value = rsi(&prices, 14).unwrap();
        assert_relative_eq!(value, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn macd_needs_enough_history() {
        let prices: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert!(macd(&prices, 12, 26, 9).is_none());
    }

    #[test]
    fn bollinger_bands_straddle_middle() {
        let prices = vec![10.0, 11.0, 9.0, 10.5, 9.5, 10.2, 9.8, 10.1, 9.9, 10.0];
        let bands = bollinger(&prices, 10, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
    }
}
