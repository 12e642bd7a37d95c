//! Sqlite-backed persistence, spec.md §4.9. Schema and pragma setup follow
//! the teacher's storage layer convention (WAL mode, `bundled` rusqlite,
//! append-mostly tables keyed so re-ingesting the same row is a no-op rather
//! than an error). Query methods return plain `Vec`s/`Option`s — no ORM.

use crate::error::DataStoreError;
use crate::models::{AccountState, FeatureVector, Label, Position, Trade, Ts};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct DataStore {
    conn: Mutex<Connection>,
}

impl DataStore {
    pub fn open(path: &Path) -> Result<Self, DataStoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, DataStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), DataStoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS features (
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (symbol, ts)
            );
            CREATE TABLE IF NOT EXISTS labels (
                symbol TEXT NOT NULL,
                feature_ts TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (symbol, feature_ts)
            );
            CREATE TABLE IF NOT EXISTS price_snapshots (
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                price REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, ts)
            );
            CREATE TABLE IF NOT EXISTS alerts (
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                ts TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (symbol, kind, ts)
            );
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT NOT NULL,
                exit_ts TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (id, exit_ts)
            );
            CREATE TABLE IF NOT EXISTS account_states (
                ts TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS equity_curve (
                ts TEXT PRIMARY KEY,
                equity REAL NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    pub fn save_feature(&self, feature: &FeatureVector) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(feature).expect("FeatureVector always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO features (symbol, ts, payload) VALUES (?1, ?2, ?3)",
            params![feature.symbol, feature.ts.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    pub fn save_label(&self, label: &Label) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(label).expect("Label always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO labels (symbol, feature_ts, payload) VALUES (?1, ?2, ?3)",
            params![label.symbol, label.feature_ts.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    pub fn save_price_snapshot(&self, symbol: &str, price: f64, volume: f64, ts: Ts) -> Result<(), DataStoreError> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO price_snapshots (symbol, ts, price, volume) VALUES (?1, ?2, ?3, ?4)",
            params![symbol, ts.to_rfc3339(), price, volume],
        )?;
        Ok(())
    }

    pub fn save_alert(&self, event: &crate::models::AnomalyEvent) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(event).expect("AnomalyEvent always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO alerts (symbol, kind, ts, payload) VALUES (?1, ?2, ?3, ?4)",
            params![event.symbol, event.kind.as_str(), event.ts.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    pub fn save_position(&self, position: &Position) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(position).expect("Position always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO positions (id, payload) VALUES (?1, ?2)",
            params![position.id, payload],
        )?;
        Ok(())
    }

    pub fn remove_position(&self, id: &str) -> Result<(), DataStoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM positions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn save_trade(&self, trade: &Trade) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(trade).expect("Trade always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO trades (id, exit_ts, payload) VALUES (?1, ?2, ?3)",
            params![trade.id, trade.exit_ts.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    pub fn save_account_state(&self, state: &AccountState) -> Result<(), DataStoreError> {
        let payload = serde_json::to_string(state).expect("AccountState always serializes");
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO account_states (ts, payload) VALUES (?1, ?2)",
            params![state.ts.to_rfc3339(), payload],
        )?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO equity_curve (ts, equity) VALUES (?1, ?2)",
            params![state.ts.to_rfc3339(), state.equity],
        )?;
        Ok(())
    }

    pub fn price_at(&self, symbol: &str, ts: Ts) -> Result<Option<f64>, DataStoreError> {
        let conn = self.conn.lock();
        let price = conn
            .query_row(
                "SELECT price FROM price_snapshots WHERE symbol = ?1 AND ts >= ?2 ORDER BY ts ASC LIMIT 1",
                params![symbol, ts.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(price)
    }

    pub fn prices_in_window(&self, symbol: &str, from: Ts, to: Ts) -> Result<Vec<(Ts, f64)>, DataStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ts, price FROM price_snapshots WHERE symbol = ?1 AND ts >= ?2 AND ts <= ?3 ORDER BY ts ASC",
        )?;
        let rows = stmt
            .query_map(params![symbol, from.to_rfc3339(), to.to_rfc3339()], |row| {
                let ts: String = row.get(0)?;
                let price: f64 = row.get(1)?;
                Ok((ts, price))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(ts, price)| DateTime::parse_from_rfc3339(&ts).ok().map(|t| (t.with_timezone(&Utc), price)))
            .collect())
    }

    pub fn unlabeled_feature_count(&self) -> Result<u64, DataStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM features f WHERE NOT EXISTS (
                SELECT 1 FROM labels l WHERE l.symbol = f.symbol AND l.feature_ts = f.ts
            )",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn feature_count(&self) -> Result<u64, DataStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM features", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn label_count(&self) -> Result<u64, DataStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM labels", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn alert_count(&self) -> Result<u64, DataStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>, DataStoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT payload FROM trades ORDER BY exit_ts DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect())
    }

    pub fn equity_curve(&self, limit: u32) -> Result<Vec<(Ts, f64)>, DataStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT ts, equity FROM equity_curve ORDER BY ts DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let ts: String = row.get(0)?;
                let equity: f64 = row.get(1)?;
                Ok((ts, equity))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut parsed: Vec<(Ts, f64)> = rows
            .into_iter()
            .filter_map(|(ts, equity)| DateTime::parse_from_rfc3339(&ts).ok().map(|t| (t.with_timezone(&Utc), equity)))
            .collect();
        parsed.reverse();
        Ok(parsed)
    }

    /// Dumps every labeled feature as `(FeatureVector, Label)` pairs, the
    /// training-data export spec.md §6 calls for.
    pub fn export_training_data(&self) -> Result<Vec<(FeatureVector, Label)>, DataStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT f.payload, l.payload FROM features f
             JOIN labels l ON l.symbol = f.symbol AND l.feature_ts = f.ts",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let feature_json: String = row.get(0)?;
                let label_json: String = row.get(1)?;
                Ok((feature_json, label_json))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(f, l)| {
                let feature: FeatureVector = serde_json::from_str(&f).ok()?;
                let label: Label = serde_json::from_str(&l).ok()?;
                Some((feature, label))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyEvent, AnomalyKind};
    use std::collections::HashMap as StdHashMap;

    fn feature(symbol: &str, ts: Ts) -> FeatureVector {
        FeatureVector {
            symbol: symbol.to_string(),
            ts,
            price: 100.0,
            price_change_60s: None,
            price_change_300s: None,
            price_change_900s: None,
            volatility_60s: None,
            volatility_300s: None,
            volume_ratio_6: None,
            volume_ratio_30: None,
            oi_delta_5m: None,
            oi_delta_15m: None,
            spread_pct: None,
            imbalance_5: None,
            imbalance_10: None,
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
            rsi_14: None,
            macd_line: None,
            macd_signal: None,
            macd_hist: None,
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
    fn save_feature_is_idempotent() {
        let store = DataStore::open_in_memory().unwrap();
        let ts = Utc::now();
        store.save_feature(&feature("BTCUSDT", ts)).unwrap();
        store.save_feature(&feature("BTCUSDT", ts)).unwrap();
        assert_eq!(store.feature_count().unwrap(), 1);
    }

    #[test]
    fn unlabeled_count_drops_once_label_written() {
        let store = DataStore::open_in_memory().unwrap();
        let ts = Utc::now();
        store.save_feature(&feature("BTCUSDT", ts)).unwrap();
        assert_eq!(store.unlabeled_feature_count().unwrap(), 1);

        let label = Label {
            symbol: "BTCUSDT".to_string(),
            feature_ts: ts,
            return_1m: 0.1,
            return_5m: 0.2,
            return_15m: 0.3,
            return_30m: 0.4,
            direction_5m: crate::models::Direction::Up,
            direction_15m: crate::models::Direction::Up,
            max_profit_5m: 0.5,
            max_drawdown_5m: -0.1,
            label_generated_at: ts + chrono::Duration::seconds(1900),
        };
        store.save_label(&label).unwrap();
        assert_eq!(store.unlabeled_feature_count().unwrap(), 0);
        assert_eq!(store.export_training_data().unwrap().len(), 1);
    }

    #[test]
    fn alert_roundtrip() {
        let store = DataStore::open_in_memory().unwrap();
        let event = AnomalyEvent {
            symbol: "BTCUSDT".to_string(),
            kind: AnomalyKind::PriceChange,
            tier: "small".to_string(),
            current_price: 100.0,
            change_pct: 3.0,
            threshold: 2.0,
            window_sec: 60,
            ts: Utc::now(),
            extras: StdHashMap::new(),
        };
        store.save_alert(&event).unwrap();
        assert_eq!(store.alert_count().unwrap(), 1);
    }
}
