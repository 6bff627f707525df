//! In-memory event bus implementation using tokio broadcast channels.
//!
//! Events are only broadcast within a single process. With multiple server
//! replicas, each replica only sees its own gangs' events; use a shared
//! pub/sub backend in that case.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use snatchit_docstore::GangId;
use snatchit_events::{EventBus, EventBusError, GangEvent, GangStream};

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// In-memory event bus keyed by gang id.
pub struct MemoryEventBus {
    channels: Arc<DashMap<GangId, broadcast::Sender<GangEvent>>>,
    capacity: usize,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Buffer size per gang channel before slow subscribers start lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    fn get_or_create_channel(&self, gang_id: &GangId) -> broadcast::Sender<GangEvent> {
        self.channels
            .entry(*gang_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, gang_id: &GangId, event: GangEvent) -> Result<(), EventBusError> {
        let tx = self.get_or_create_channel(gang_id);

        // Ignore error if no receivers (this is fine)
        let _ = tx.send(event);

        Ok(())
    }

    async fn subscribe(&self, gang_id: &GangId) -> Result<GangStream, EventBusError> {
        let tx = self.get_or_create_channel(gang_id);
        let rx = tx.subscribe();

        // Lagged receivers drop the missed events; the client should resync
        // from the repository when that happens.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use snatchit_events::GangEventKind;

    fn event(gang_id: GangId, kind: GangEventKind) -> GangEvent {
        GangEvent {
            kind,
            gang_id,
            snapshot: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = MemoryEventBus::new();
        let gang_id = GangId::new();

        let mut stream = bus.subscribe(&gang_id).await.unwrap();
        bus.publish(&gang_id, event(gang_id, GangEventKind::Updated))
            .await
            .unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(received.gang_id, gang_id);
        assert_eq!(received.kind, GangEventKind::Updated);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = MemoryEventBus::new();
        let gang_id = GangId::new();

        let mut stream1 = bus.subscribe(&gang_id).await.unwrap();
        let mut stream2 = bus.subscribe(&gang_id).await.unwrap();

        bus.publish(&gang_id, event(gang_id, GangEventKind::Created))
            .await
            .unwrap();

        assert_eq!(stream1.next().await.unwrap().kind, GangEventKind::Created);
        assert_eq!(stream2.next().await.unwrap().kind, GangEventKind::Created);
    }

    #[tokio::test]
    async fn publish_before_subscribe_is_lost() {
        let bus = MemoryEventBus::new();
        let gang_id = GangId::new();

        bus.publish(&gang_id, event(gang_id, GangEventKind::Updated))
            .await
            .unwrap();

        let mut stream = bus.subscribe(&gang_id).await.unwrap();
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "must not see events published before subscribing");
    }

    #[tokio::test]
    async fn cross_gang_isolation() {
        let bus = MemoryEventBus::new();
        let gang_a = GangId::new();
        let gang_b = GangId::new();

        let mut stream_a = bus.subscribe(&gang_a).await.unwrap();

        bus.publish(&gang_b, event(gang_b, GangEventKind::BustedUp))
            .await
            .unwrap();
        bus.publish(&gang_a, event(gang_a, GangEventKind::Updated))
            .await
            .unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_millis(100), stream_a.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(received.gang_id, gang_a);
    }

    #[tokio::test]
    async fn lagged_subscriber_drops_oldest_events() {
        let bus = MemoryEventBus::with_capacity(1);
        let gang_id = GangId::new();

        let mut stream = bus.subscribe(&gang_id).await.unwrap();
        for ts in 1..=3 {
            let mut e = event(gang_id, GangEventKind::Updated);
            e.timestamp = ts;
            bus.publish(&gang_id, e).await.unwrap();
        }

        // Only the newest event still fits in the buffer.
        assert_eq!(stream.next().await.unwrap().timestamp, 3);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = MemoryEventBus::new();
        let gang_id = GangId::new();

        let mut stream = bus.subscribe(&gang_id).await.unwrap();

        for ts in 1..=3 {
            let mut e = event(gang_id, GangEventKind::Updated);
            e.timestamp = ts;
            bus.publish(&gang_id, e).await.unwrap();
        }

        assert_eq!(stream.next().await.unwrap().timestamp, 1);
        assert_eq!(stream.next().await.unwrap().timestamp, 2);
        assert_eq!(stream.next().await.unwrap().timestamp, 3);
    }
}
