//! Exchange connectivity boundary, spec.md §6. Real Binance-style futures
//! wire integration is explicitly out of scope ("external collaborator") —
//! these traits exist so `Scheduler`/`main.rs` can be wired against a stub
//! or a real implementation without the rest of the crate caring which.
//! Async trait objects follow the teacher's `async_trait` usage.

use crate::models::{DepthSnapshot, OiObservation, SpotPrice, Ticker};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// Streaming market data: ticker prints and depth updates.
#[async_trait]
pub trait ExchangeFeed: Send + Sync {
    async fn next_ticker(&mut self) -> Result<Ticker, ExchangeError>;
    async fn next_depth(&mut self) -> Result<DepthSnapshot, ExchangeError>;
}

/// Polled REST endpoints: open interest and spot reference price.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn open_interest(&self, symbol: &str) -> Result<OiObservation, ExchangeError>;
    async fn spot_price(&self, symbol: &str) -> Result<SpotPrice, ExchangeError>;
}

/// Deterministic fixture feed for tests and local runs without real
/// exchange credentials: replays a fixed sequence of ticks then errors out.
pub struct ReplayFeed {
    tickers: std::vec::IntoIter<Ticker>,
    depths: std::vec::IntoIter<DepthSnapshot>,
}

impl ReplayFeed {
    pub fn new(tickers: Vec<Ticker>, depths: Vec<DepthSnapshot>) -> Self {
        Self {
            tickers: tickers.into_iter(),
            depths: depths.into_iter(),
        }
    }
}

#[async_trait]
impl ExchangeFeed for ReplayFeed {
    async fn next_ticker(&mut self) -> Result<Ticker, ExchangeError> {
        self.tickers
            .next()
            .ok_or_else(|| ExchangeError::Transport("replay feed exhausted".to_string()))
    }

    async fn next_depth(&mut self) -> Result<DepthSnapshot, ExchangeError> {
        self.depths
            .next()
            .ok_or_else(|| ExchangeError::Transport("replay feed exhausted".to_string()))
    }
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsMessage {
    Ticker {
        symbol: String,
        price: f64,
        base_volume: f64,
        quote_volume: f64,
        time_ms: i64,
    },
    Depth {
        symbol: String,
        bids: Vec<(f64, f64)>,
        asks: Vec<(f64, f64)>,
        last_update_id: u64,
        time_ms: i64,
    },
}

/// Thin `tokio-tungstenite`-backed `ExchangeFeed` over a single combined
/// ticker+depth stream, tagged JSON text frames (`{"type": "ticker", ...}` /
/// `{"type": "depth", ...}`). Real exchange wire formats differ per venue
/// and are out of scope; this is the minimal shape `Scheduler`/tests need to
/// drive the detector pipeline from a live socket instead of `ReplayFeed`.
pub struct WsExchangeFeed {
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsExchangeFeed {
    pub async fn connect(url: &str) -> Result<Self, ExchangeError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(Self { stream })
    }

    async fn next_message(&mut self) -> Result<WsMessage, ExchangeError> {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .ok_or_else(|| ExchangeError::Transport("stream closed".to_string()))?
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map_err(|e| ExchangeError::Decode(e.to_string()));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => {
                    return Err(ExchangeError::Decode(format!("unexpected frame: {other:?}")));
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeFeed for WsExchangeFeed {
    async fn next_ticker(&mut self) -> Result<Ticker, ExchangeError> {
        loop {
            if let WsMessage::Ticker {
                symbol,
                price,
                base_volume,
                quote_volume,
                time_ms,
            } = self.next_message().await?
            {
                return Ok(Ticker {
                    symbol,
                    price,
                    base_volume,
                    quote_volume,
                    ts: ts_from_millis(time_ms),
                });
            }
        }
    }

    async fn next_depth(&mut self) -> Result<DepthSnapshot, ExchangeError> {
        loop {
            if let WsMessage::Depth {
                symbol,
                bids,
                asks,
                last_update_id,
                time_ms,
            } = self.next_message().await?
            {
                return Ok(DepthSnapshot {
                    symbol,
                    bids,
                    asks,
                    last_update_id,
                    ts: ts_from_millis(time_ms),
                });
            }
        }
    }
}

/// Thin `reqwest`-backed `RestClient` against a generic perpetuals REST API
/// (base URL + two JSON endpoints returning `{openInterest, time}` /
/// `{price, time}`). Real wire-format negotiation with a specific exchange
/// is the out-of-scope "external collaborator" spec.md §1 names; this
/// exists so the Scheduler has something real to poll in a standalone run
/// rather than only a test fixture.
pub struct HttpRestClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct OiResponse {
    open_interest: f64,
    time_ms: i64,
}

#[derive(serde::Deserialize)]
struct SpotResponse {
    price: f64,
    time_ms: i64,
}

fn ts_from_millis(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
}

#[async_trait]
impl RestClient for HttpRestClient {
    async fn open_interest(&self, symbol: &str) -> Result<OiObservation, ExchangeError> {
        let url = format!("{}/openInterest?symbol={symbol}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?
            .json::<OiResponse>()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;
        Ok(OiObservation {
            open_interest: response.open_interest,
            ts: ts_from_millis(response.time_ms),
        })
    }

    async fn spot_price(&self, symbol: &str) -> Result<SpotPrice, ExchangeError> {
        let url = format!("{}/spotPrice?symbol={symbol}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?
            .json::<SpotResponse>()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;
        Ok(SpotPrice {
            price: response.price,
            ts: ts_from_millis(response.time_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn replay_feed_yields_then_errors() {
        let ticker = Ticker {
            symbol: "BTCUSDT".to_string(),
            price: 100.0,
            base_volume: 1.0,
            quote_volume: 100.0,
            ts: Utc::now(),
        };
        let mut feed = ReplayFeed::new(vec![ticker], vec![]);
        assert!(feed.next_ticker().await.is_ok());
        assert!(feed.next_ticker().await.is_err());
    }
}
