//! Broadcast sink
//!
//! Publishes every record on a Tokio broadcast channel so async consumers
//! (a websocket feed, a test harness) can follow the log live. Publishing is
//! fire-and-forget; lagging receivers lose the oldest records.

use evtrail_core::{Level, LogPayload, Sink};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// A record as published on the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivered {
    pub level: Level,
    pub message: String,
    pub payload: LogPayload,
}

pub struct BroadcastSink {
    sender: broadcast::Sender<Arc<Delivered>>,
    published: AtomicU64,
    unobserved: AtomicU64,
}

impl BroadcastSink {
    /// Create a sink with room for `capacity` unread records per receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self::from_sender(sender)
    }

    /// Publish on an existing channel
    pub fn from_sender(sender: broadcast::Sender<Arc<Delivered>>) -> Self {
        Self {
            sender,
            published: AtomicU64::new(0),
            unobserved: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Delivered>> {
        self.sender.subscribe()
    }

    /// Get the sender (for sharing with other publishers)
    pub fn sender(&self) -> broadcast::Sender<Arc<Delivered>> {
        self.sender.clone()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Records published while nobody was subscribed
    pub fn unobserved(&self) -> u64 {
        self.unobserved.load(Ordering::Relaxed)
    }
}

impl Sink for BroadcastSink {
    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        let record = Arc::new(Delivered {
            level,
            message: message.to_string(),
            payload: payload.clone(),
        });
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(record).is_err() {
            self.unobserved.fetch_add(1, Ordering::Relaxed);
            trace!("No subscribers for {}", payload.event_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evtrail_core::{context, fields, CorrelationGroup, LogHandle};
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        let mut log = LogHandle::builder(Arc::clone(&sink)).build().unwrap();

        log.log(Level::Info, "one", fields! {});
        log.log(Level::Warn, "two", fields! {});

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.message, "one");
        assert_eq!(second.level, Level::Warn);
        assert_eq!(sink.published(), 2);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_not_an_error() {
        let sink = Arc::new(BroadcastSink::new(4));
        let log = LogHandle::builder(Arc::clone(&sink)).build().unwrap();

        let group = CorrelationGroup::new("sync", Duration::from_secs(1));
        let corr = log.start_correlation(&group, context! {}).unwrap();
        corr.complete(fields! {});

        assert_eq!(sink.published(), 2);
        assert_eq!(sink.unobserved(), 2);
    }
}
