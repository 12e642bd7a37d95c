//! Core data model shared across the detector, feature, risk, and paper
//! trading layers. Every entity here is a flat, serde-derived struct rather
//! than a dynamic map — field-by-field, the way the spec demands and the
//! way a fixed-schema record should look.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Ts = DateTime<Utc>;

/// Point-in-time futures quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub ts: Ts,
}

/// Latest spot quote for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpotPrice {
    pub price: f64,
    pub ts: Ts,
}

/// A polled open-interest observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OiObservation {
    pub open_interest: f64,
    pub ts: Ts,
}

/// A single point stored in a symbol's price ring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub volume: f64,
    pub ts: Ts,
}

/// One side of an order book: price descending for bids, ascending for asks.
pub type BookLevel = (f64, f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    /// Descending by price.
    pub bids: Vec<BookLevel>,
    /// Ascending by price.
    pub asks: Vec<BookLevel>,
    pub last_update_id: u64,
    pub ts: Ts,
}

impl DepthSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(p, _)| *p)
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Spread as a percentage of mid price.
    pub fn spread_pct(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 {
            return None;
        }
        Some((ask - bid) / mid * 100.0)
    }

    pub fn bid_depth(&self, n: usize) -> f64 {
        self.bids.iter().take(n).map(|(p, q)| p * q).sum()
    }

    pub fn ask_depth(&self, n: usize) -> f64 {
        self.asks.iter().take(n).map(|(p, q)| p * q).sum()
    }

    /// `(bidDepth - askDepth) / (bidDepth + askDepth)`, clamped to [-1, 1].
    pub fn imbalance_ratio(&self, n: usize) -> Option<f64> {
        let bid = self.bid_depth(n);
        let ask = self.ask_depth(n);
        let total = bid + ask;
        if total <= 0.0 {
            return None;
        }
        Some(((bid - ask) / total).clamp(-1.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallState {
    pub symbol: String,
    pub side: BookSide,
    pub price: f64,
    pub qty: f64,
    pub value: f64,
    pub first_seen: Ts,
    pub last_seen: Ts,
}

/// A single tier's thresholds, selected by descending `min_oi_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub min_oi_value: f64,
    pub price_threshold_pct: f64,
    pub volume_threshold_x: f64,
    pub oi_threshold_pct: f64,
    pub spread_threshold_pct: f64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    PriceChange,
    VolumeSpike,
    OiChange,
    SpotFuturesSpread,
    PriceReversal,
    OrderBookWall,
    OrderBookImbalance,
    OrderBookSweep,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::PriceChange => "price_change",
            AnomalyKind::VolumeSpike => "volume_spike",
            AnomalyKind::OiChange => "oi_change",
            AnomalyKind::SpotFuturesSpread => "spot_futures_spread",
            AnomalyKind::PriceReversal => "price_reversal",
            AnomalyKind::OrderBookWall => "order_book_wall",
            AnomalyKind::OrderBookImbalance => "order_book_imbalance",
            AnomalyKind::OrderBookSweep => "order_book_sweep",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub symbol: String,
    pub kind: AnomalyKind,
    pub tier: String,
    pub current_price: f64,
    pub change_pct: f64,
    pub threshold: f64,
    pub window_sec: i64,
    pub ts: Ts,
    /// Kind-specific payload (window low/high, ratio, oi value, spot/futures...).
    pub extras: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ReversalType {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceReversal {
    pub reversal_type: ReversalType,
    pub start_price: f64,
    pub high: f64,
    pub low: f64,
    pub current: f64,
    pub rise_pct: f64,
    pub fall_pct: f64,
    pub extreme_ts: Ts,
}

/// ML-ready feature vector. Fixed schema, all fields explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub symbol: String,
    pub ts: Ts,
    pub price: f64,

    pub price_change_60s: Option<f64>,
    pub price_change_300s: Option<f64>,
    pub price_change_900s: Option<f64>,
    pub volatility_60s: Option<f64>,
    pub volatility_300s: Option<f64>,
    pub volume_ratio_6: Option<f64>,
    pub volume_ratio_30: Option<f64>,
    pub oi_delta_5m: Option<f64>,
    pub oi_delta_15m: Option<f64>,
    pub spread_pct: Option<f64>,

    pub imbalance_5: Option<f64>,
    pub imbalance_10: Option<f64>,
    pub imbalance_20: Option<f64>,
    pub nearest_bid_wall_distance_pct: Option<f64>,
    pub nearest_bid_wall_value: Option<f64>,
    pub nearest_ask_wall_distance_pct: Option<f64>,
    pub nearest_ask_wall_value: Option<f64>,

    pub sma_5: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_60: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,

    pub reversal_type: Option<String>,
    pub reversal_rise_pct: Option<f64>,
    pub reversal_fall_pct: Option<f64>,

    pub tier: Option<String>,
    pub alert_triggered: bool,
    pub alert_kinds: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Down = -1,
    Flat = 0,
    Up = 1,
}

impl Direction {
    pub fn from_return(return_pct: f64, threshold_pct: f64) -> Self {
        if return_pct > threshold_pct {
            Direction::Up
        } else if return_pct < -threshold_pct {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn as_i8(&self) -> i8 {
        match self {
            Direction::Down => -1,
            Direction::Flat => 0,
            Direction::Up => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub symbol: String,
    pub feature_ts: Ts,
    pub return_1m: f64,
    pub return_5m: f64,
    pub return_15m: f64,
    pub return_30m: f64,
    pub direction_5m: Direction,
    pub direction_15m: Direction,
    pub max_profit_5m: f64,
    pub max_drawdown_5m: f64,
    pub label_generated_at: Ts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub symbol: String,
    pub ts: Ts,
    pub ws_latency_ms: f64,
    pub data_age_ms: f64,
    pub spread_too_wide: bool,
    pub depth_too_thin: bool,
    pub is_fake: bool,
    pub fake_reason: Option<String>,
    pub wall_manipulation: bool,
    pub volume_manipulation: bool,
}

impl RiskResult {
    pub fn should_filter(&self) -> bool {
        self.spread_too_wide
            || self.depth_too_thin
            || self.is_fake
            || self.wall_manipulation
            || self.volume_manipulation
    }

    pub fn reason(&self) -> Option<String> {
        if !self.should_filter() {
            return None;
        }
        let mut reasons = Vec::new();
        if self.spread_too_wide {
            reasons.push("spread_too_wide".to_string());
        }
        if self.depth_too_thin {
            reasons.push("depth_too_thin".to_string());
        }
        if self.is_fake {
            reasons.push(
                self.fake_reason
                    .clone()
                    .unwrap_or_else(|| "fake_signal".to_string()),
            );
        }
        if self.wall_manipulation {
            reasons.push("wall_manipulation".to_string());
        }
        if self.volume_manipulation {
            reasons.push("volume_manipulation".to_string());
        }
        Some(reasons.join(","))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub entry_price: f64,
    pub entry_ts: Ts,
    pub leverage: f64,
    pub margin: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub trailing_dist_pct: Option<f64>,
    pub trailing_activation_pct: Option<f64>,
    pub trailing_active: bool,
    pub max_hold_sec: i64,
    pub current_price: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,
    pub signal_confidence: f64,
    pub signal_reason: String,
}

impl Position {
    /// Recompute current price, monotone extrema, and PnL. Spec §4.8.2.
    pub fn update_pnl(&mut self, price: f64) {
        self.current_price = price;
        if price > self.highest_price {
            self.highest_price = price;
        }
        if price < self.lowest_price {
            self.lowest_price = price;
        }

        let pnl_pct = match self.side {
            PositionSide::Long => (price - self.entry_price) / self.entry_price * 100.0,
            PositionSide::Short => (self.entry_price - price) / self.entry_price * 100.0,
        };
        self.unrealized_pnl_pct = pnl_pct;
        self.unrealized_pnl = self.margin * pnl_pct / 100.0 * self.leverage;
    }

    pub fn hold_sec(&self, now: Ts) -> i64 {
        (now - self.entry_ts).num_seconds()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    TimeExit,
    SignalExit,
    Liquidation,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub entry_price: f64,
    pub entry_ts: Ts,
    pub exit_price: f64,
    pub exit_ts: Ts,
    pub exit_reason: ExitReason,
    pub leverage: f64,
    pub realized_pnl: f64,
    pub realized_pnl_pct: f64,
    pub roi: f64,
    pub commission: f64,
    pub margin: f64,
    pub signal_confidence: f64,
    pub signal_reason: String,
}

impl Trade {
    pub fn from_close(
        position: &Position,
        exit_price: f64,
        exit_ts: Ts,
        reason: ExitReason,
        commission: f64,
    ) -> Self {
        let pnl_pct = match position.side {
            PositionSide::Long => {
                (exit_price - position.entry_price) / position.entry_price * 100.0
            }
            PositionSide::Short => {
                (position.entry_price - exit_price) / position.entry_price * 100.0
            }
        };
        let gross_pnl = position.margin * pnl_pct / 100.0 * position.leverage;
        let realized_pnl = gross_pnl - commission;
        Self {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            qty: position.qty,
            entry_price: position.entry_price,
            entry_ts: position.entry_ts,
            exit_price,
            exit_ts,
            exit_reason: reason,
            leverage: position.leverage,
            realized_pnl,
            realized_pnl_pct: pnl_pct,
            roi: if position.margin > 0.0 {
                realized_pnl / position.margin * 100.0
            } else {
                0.0
            },
            commission,
            margin: position.margin,
            signal_confidence: position.signal_confidence,
            signal_reason: position.signal_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub ts: Ts,
    pub balance: f64,
    pub equity: f64,
    pub margin_used: f64,
    pub margin_available: f64,
    pub margin_ratio: f64,
    pub open_positions: usize,
    pub total_trades: u64,
    pub win_trades: u64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}
