//! Bounded fan-out queue for anomaly/risk/trade notifications, spec.md §5.
//! Backed by `tokio::sync::broadcast` so every subscriber (dashboard query,
//! future webhook sink) sees the same stream; on overflow the channel drops
//! the oldest unread message per lagging receiver, and we additionally track
//! a crate-wide overflow counter surfaced through `systemStatus()`.

use crate::models::AnomalyEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<AnomalyEvent>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, event: AnomalyEvent) {
        // `send` only errors when there are no receivers; that's not an
        // overflow, just nobody listening yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyEvent> {
        self.sender.subscribe()
    }

    /// Call after a subscriber's `recv()` returns `Lagged(n)` to keep the
    /// overflow counter accurate.
    pub fn note_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnomalyKind;
    use std::collections::HashMap;

    fn event() -> AnomalyEvent {
        AnomalyEvent {
            symbol: "BTCUSDT".to_string(),
            kind: AnomalyKind::PriceChange,
            tier: "small".to_string(),
            current_price: 100.0,
            change_pct: 3.0,
            threshold: 2.0,
            window_sec: 60,
            ts: chrono::Utc::now(),
            extras: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();
        notifier.publish(event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.symbol, "BTCUSDT");
    }

    #[test]
    fn dropped_counter_accumulates() {
        let notifier = Notifier::new(4);
        notifier.note_dropped(3);
        notifier.note_dropped(2);
        assert_eq!(notifier.dropped_count(), 5);
    }
}
