//! Typed errors at domain boundaries. Composition-root code (`main.rs`, the
//! Scheduler tasks) stays on `anyhow::Result`, matching the teacher's
//! `Config::from_env() -> anyhow::Result<Self>` convention; these enums exist
//! for the handful of call sites where a caller wants to match on the error
//! kind rather than just log and move on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("insufficient history for {symbol}: need {need}, have {have}")]
    InsufficientHistory {
        symbol: String,
        need: usize,
        have: usize,
    },
}

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no row found for {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
