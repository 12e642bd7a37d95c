//! Rule-based entry scoring, spec.md §4.8.4. Not a model — a fixed set of
//! weighted conditions over the current `FeatureVector`, producing a
//! directional signal with a confidence in `[0, 1]` and a human-readable
//! reason, the way the teacher's `signals/detector.rs` `MarketSignal`
//! carried a `confidence` + `reason` pair rather than a bare bool.

use crate::config::StrategyConfig;
use crate::models::{FeatureVector, PositionSide};

#[derive(Debug, Clone)]
pub struct TradeSignal {
    pub side: PositionSide,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Strategy;

impl Strategy {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, feature: &FeatureVector, config: &StrategyConfig) -> Option<TradeSignal> {
        let mut long_score = 0.0;
        let mut short_score = 0.0;
        let mut reasons = Vec::new();

        if let Some(rsi) = feature.rsi_14 {
            if rsi <= config.rsi_oversold {
                long_score += 1.0;
                reasons.push(format!("rsi_oversold({:.1})", rsi));
            } else if rsi >= config.rsi_overbought {
                short_score += 1.0;
                reasons.push(format!("rsi_overbought({:.1})", rsi));
            }
        }

        if let (Some(macd_line), Some(macd_signal)) = (feature.macd_line, feature.macd_signal) {
            if macd_line > macd_signal {
                long_score += 1.0;
            } else if macd_line < macd_signal {
                short_score += 1.0;
            }
        }

        if let Some(imbalance) = feature.imbalance_10 {
            if imbalance >= config.imbalance_long_threshold {
                long_score += 1.0;
                reasons.push(format!("book_imbalance({:.2})", imbalance));
            } else if imbalance <= config.imbalance_short_threshold {
                short_score += 1.0;
                reasons.push(format!("book_imbalance({:.2})", imbalance));
            }
        }

        if let Some(change) = feature.price_change_300s {
            if change.abs() >= config.trend_filter_pct {
                if change > 0.0 {
                    long_score += 1.0;
                } else {
                    short_score += 1.0;
                }
                reasons.push(format!("trend_5m({:.2}%)", change));
            }
        }

        if let Some(volume_ratio) = feature.volume_ratio_6 {
            if volume_ratio >= config.min_volume_ratio {
                if long_score > short_score {
                    long_score += 0.5;
                } else if short_score > long_score {
                    short_score += 0.5;
                }
            }
        }

        if let Some(volatility) = feature.volatility_60s {
            if volatility < config.min_volatility {
                return None;
            }
        }

        let total_weight = 4.5_f64;
        let (side, score) = if long_score > short_score {
            (PositionSide::Long, long_score)
        } else if short_score > long_score {
            (PositionSide::Short, short_score)
        } else {
            return None;
        };

        let confidence = (score / total_weight).min(1.0);
        if confidence < config.signal_threshold || confidence < config.min_confidence {
            return None;
        }

        Some(TradeSignal {
            side,
            confidence,
            reason: reasons.join(","),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_with(rsi: Option<f64>, imbalance: Option<f64>) -> FeatureVector {
        FeatureVector {
            symbol: "BTCUSDT".to_string(),
            ts: chrono::Utc::now(),
            price: 100.0,
            price_change_60s: None,
            price_change_300s: Some(3.0),
            price_change_900s: None,
            volatility_60s: Some(0.5),
            volatility_300s: None,
            volume_ratio_6: Some(1.2),
            volume_ratio_30: None,
            oi_delta_5m: None,
            oi_delta_15m: None,
            spread_pct: None,
            imbalance_5: None,
            imbalance_10: imbalance,
            imbalance_20: None,
            nearest_bid_wall_distance_pct: None,
            nearest_bid_wall_value: None,
            nearest_ask_wall_distance_pct: None,
            nearest_ask_wall_value: None,
            sma_5: None,
            sma_20: None,
            sma_60: None,
            ema_12: None,
            ema_26: None,
            rsi_14: rsi,
            macd_line: Some(1.0),
            macd_signal: Some(0.5),
            macd_hist: Some(0.5),
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            reversal_type: None,
            reversal_rise_pct: None,
            reversal_fall_pct: None,
            tier: None,
            alert_triggered: false,
            alert_kinds: Vec::new(),
        }
    }

    #[test]
    fn long_signal_on_oversold_and_imbalance() {
        let strategy = Strategy::new();
        let config = StrategyConfig::default();
        let feature = feature_with(Some(25.0), Some(0.3));
        let signal = strategy.evaluate(&feature, &config).unwrap();
        assert_eq!(signal.side, PositionSide::Long);
        assert!(signal.confidence >= config.min_confidence);
    }

    #[test]
    fn no_signal_when_volatility_too_low() {
        let strategy = Strategy::new();
        let config = StrategyConfig {
            min_volatility: 10.0,
            ..StrategyConfig::default()
        };
        let feature = feature_with(Some(25.0), Some(0.3));
        assert!(strategy.evaluate(&feature, &config).is_none());
    }
}
