//! Configuration surface. Mirrors the teacher's `Config::from_env()`
//! (env-var reads with sensible defaults) but adds a TOML layer for the
//! deeply nested `alerts.*` / `volumeTiers[]` / `filter.*` / `ml.*` /
//! `trading.*` structures spec.md §6 enumerates — those don't fit flat env
//! vars. Precedence: env overrides file, file overrides built-in default,
//! exactly the teacher's layering.

use crate::error::ConfigError;
use crate::models::TierConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangeConfig {
    pub enabled: bool,
    pub time_window_sec: i64,
}

impl Default for PriceChangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpikeConfig {
    pub enabled: bool,
    pub lookback_periods: usize,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_periods: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterestConfig {
    pub enabled: bool,
    pub poll_interval_sec: u64,
    pub time_window_sec: i64,
}

impl Default for OpenInterestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_sec: 60,
            time_window_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotFuturesSpreadConfig {
    pub enabled: bool,
    pub time_window_sec: i64,
    pub poll_interval_sec: u64,
    pub threshold_pct: f64,
}

impl Default for SpotFuturesSpreadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_sec: 60,
            poll_interval_sec: 10,
            threshold_pct: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceReversalConfig {
    pub enabled: bool,
    pub time_window_sec: i64,
}

impl Default for PriceReversalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookConfig {
    pub enabled: bool,
    pub symbols: Vec<String>,
    pub wall_detection: bool,
    pub wall_value_threshold: f64,
    pub wall_ratio_threshold: f64,
    pub wall_distance_max_pct: f64,
    pub imbalance_detection: bool,
    pub imbalance_threshold: f64,
    pub imbalance_depth_levels: usize,
    pub sweep_detection: bool,
    pub sweep_value_threshold: f64,
    pub depth_levels: usize,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            symbols: Vec::new(),
            wall_detection: true,
            wall_value_threshold: 100_000.0,
            wall_ratio_threshold: 3.0,
            wall_distance_max_pct: 1.0,
            imbalance_detection: true,
            imbalance_threshold: 0.6,
            imbalance_depth_levels: 10,
            sweep_detection: true,
            sweep_value_threshold: 50_000.0,
            depth_levels: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    pub price_change: PriceChangeConfig,
    pub volume_spike: VolumeSpikeConfig,
    pub open_interest: OpenInterestConfig,
    pub spot_futures_spread: SpotFuturesSpreadConfig,
    pub price_reversal: PriceReversalConfig,
    pub orderbook: OrderBookConfig,
    pub cooldown_sec: i64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            price_change: PriceChangeConfig::default(),
            volume_spike: VolumeSpikeConfig::default(),
            open_interest: OpenInterestConfig::default(),
            spot_futures_spread: SpotFuturesSpreadConfig::default(),
            price_reversal: PriceReversalConfig::default(),
            orderbook: OrderBookConfig::default(),
            cooldown_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    All,
    Whitelist,
    Blacklist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::All,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl FilterConfig {
    pub fn allows(&self, symbol: &str) -> bool {
        match self.mode {
            FilterMode::All => true,
            FilterMode::Whitelist => self.whitelist.iter().any(|s| s == symbol),
            FilterMode::Blacklist => !self.blacklist.iter().any(|s| s == symbol),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorsConfig {
    pub ma_periods: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        Self {
            ma_periods: vec![5, 20, 60],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub enabled: bool,
    pub filter_alerts: bool,
    pub max_ws_latency_ms: f64,
    pub max_spread_bps: f64,
    pub min_depth_value: f64,
    pub fake_signal_window_sec: i64,
    pub fake_signal_revert_ratio: f64,
    pub fake_signal_min_change_pct: f64,
    pub wall_flash_window_sec: i64,
    pub wall_flash_count: u32,
    pub volume_spike_ratio: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter_alerts: true,
            max_ws_latency_ms: 2000.0,
            max_spread_bps: 50.0,
            min_depth_value: 10_000.0,
            fake_signal_window_sec: 30,
            fake_signal_revert_ratio: 0.8,
            fake_signal_min_change_pct: 1.0,
            wall_flash_window_sec: 60,
            wall_flash_count: 3,
            volume_spike_ratio: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub direction_threshold_pct: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            direction_threshold_pct: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    pub enabled: bool,
    pub feature_save_interval_sec: u64,
    pub label: LabelConfig,
    pub indicators: IndicatorsConfig,
    pub risk: RiskConfig,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feature_save_interval_sec: 10,
            label: LabelConfig::default(),
            indicators: IndicatorsConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Backtest,
    Realtime,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub initial_balance: f64,
    pub leverage: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub max_positions: usize,
    pub position_risk_pct: f64,
    pub max_margin_ratio: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            leverage: 5.0,
            maker_fee: 0.0002,
            taker_fee: 0.0005,
            max_positions: 5,
            position_risk_pct: 1.0,
            max_margin_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub min_confidence: f64,
    pub signal_threshold: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub min_volatility: f64,
    pub min_volume_ratio: f64,
    pub imbalance_long_threshold: f64,
    pub imbalance_short_threshold: f64,
    pub trend_filter_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            signal_threshold: 0.4,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            min_volatility: 0.05,
            min_volume_ratio: 0.8,
            imbalance_long_threshold: 0.2,
            imbalance_short_threshold: -0.2,
            trend_filter_pct: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopLossMethod {
    Fixed,
    Atr,
    Trailing,
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossConfig {
    pub method: StopLossMethod,
    pub fixed_stop_pct: f64,
    pub take_profit_pct: f64,
    pub atr_multiplier: f64,
    pub atr_period: usize,
    pub trailing_distance_pct: f64,
    pub trailing_activation_pct: f64,
    pub max_hold_sec: i64,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            method: StopLossMethod::Multiple,
            fixed_stop_pct: 2.0,
            take_profit_pct: 4.0,
            atr_multiplier: 2.0,
            atr_period: 14,
            trailing_distance_pct: 1.0,
            trailing_activation_pct: 1.0,
            max_hold_sec: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub save_interval_sec: u64,
    pub log_trades: bool,
    pub max_positions_per_symbol: usize,
    pub allowed_symbols: Vec<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            save_interval_sec: 30,
            log_trades: true,
            max_positions_per_symbol: 1,
            allowed_symbols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub enabled: bool,
    pub mode: TradingMode,
    pub account: AccountConfig,
    pub strategy: StrategyConfig,
    pub stop_loss: StopLossConfig,
    pub realtime: RealtimeConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: TradingMode::Realtime,
            account: AccountConfig::default(),
            strategy: StrategyConfig::default(),
            stop_loss: StopLossConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            min_oi_value: 50_000_000.0,
            price_threshold_pct: 1.0,
            volume_threshold_x: 3.0,
            oi_threshold_pct: 5.0,
            spread_threshold_pct: 0.3,
            label: "mega".to_string(),
        },
        TierConfig {
            min_oi_value: 5_000_000.0,
            price_threshold_pct: 2.0,
            volume_threshold_x: 4.0,
            oi_threshold_pct: 8.0,
            spread_threshold_pct: 0.5,
            label: "large".to_string(),
        },
        TierConfig {
            min_oi_value: 0.0,
            price_threshold_pct: 3.0,
            volume_threshold_x: 5.0,
            oi_threshold_pct: 12.0,
            spread_threshold_pct: 0.8,
            label: "small".to_string(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    #[serde(default = "default_tiers")]
    pub volume_tiers: Vec<TierConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    pub oi_poll_interval_sec: u64,
    pub spot_poll_interval_sec: u64,
    pub tracker_max_age_sec: i64,
    pub tracker_cleanup_interval_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./anomaly_trader.db".to_string(),
            port: 8080,
            volume_tiers: default_tiers(),
            alerts: AlertsConfig::default(),
            filter: FilterConfig::default(),
            ml: MlConfig::default(),
            trading: TradingConfig::default(),
            oi_poll_interval_sec: 60,
            spot_poll_interval_sec: 15,
            tracker_max_age_sec: 3600,
            tracker_cleanup_interval_sec: 300,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then let environment variables
    /// override the handful of top-level scalars, matching the teacher's
    /// `Config::from_env` precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            _ => Config::default(),
        };

        if let Ok(db) = std::env::var("DATABASE_PATH") {
            config.database_path = db;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Tiers sorted by descending `min_oi_value`; first match wins. Spec §3.
    pub fn select_tier(&self, position_value: f64) -> Option<&TierConfig> {
        let mut sorted: Vec<&TierConfig> = self.volume_tiers.iter().collect();
        sorted.sort_by(|a, b| b.min_oi_value.partial_cmp(&a.min_oi_value).unwrap());
        sorted.into_iter().find(|t| position_value >= t.min_oi_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_selection_is_monotone() {
        let config = Config::default();
        let small = config.select_tier(1_000.0).unwrap().label.clone();
        let large = config.select_tier(10_000_000.0).unwrap().label.clone();
        let mega = config.select_tier(100_000_000.0).unwrap().label.clone();
        assert_eq!(small, "small");
        assert_eq!(large, "large");
        assert_eq!(mega, "mega");
    }

    #[test]
    fn filter_modes() {
        let mut filter = FilterConfig {
            mode: FilterMode::Whitelist,
            whitelist: vec!["BTCUSDT".to_string()],
            blacklist: Vec::new(),
        };
        assert!(filter.allows("BTCUSDT"));
        assert!(!filter.allows("ETHUSDT"));
        filter.mode = FilterMode::Blacklist;
        filter.blacklist = vec!["ETHUSDT".to_string()];
        assert!(filter.allows("BTCUSDT"));
        assert!(!filter.allows("ETHUSDT"));
    }
}
