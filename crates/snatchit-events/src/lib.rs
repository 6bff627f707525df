//! Event bus abstraction for gang change notifications.
//!
//! This crate defines the EventBus trait that allows different implementations
//! for broadcasting gang snapshots to subscribed clients:
//! - Memory (single process, tokio broadcast channels)
//! - A pub/sub backend for multi-replica deployments
//!
//! Rosters delivered this way are eventually consistent snapshots, not
//! authoritative reads at an instant.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

use snatchit_docstore::{Gang, GangId};

/// What happened to the gang.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GangEventKind {
    Created,
    Updated,
    BustedUp,
}

/// A committed change to a gang, carrying the post-change snapshot.
/// `snapshot` is `None` only for `BustedUp`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GangEvent {
    pub kind: GangEventKind,
    pub gang_id: GangId,
    pub snapshot: Option<Gang>,
    pub timestamp: i64,
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of gang change events
pub type GangStream = Pin<Box<dyn Stream<Item = GangEvent> + Send>>;

/// Event bus trait for publishing and subscribing to gang change events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a gang change event to all watchers of this gang.
    ///
    /// Called after a membership mutation has committed. Broadcast to all
    /// active subscribers for the gang.
    async fn publish(&self, gang_id: &GangId, event: GangEvent) -> Result<(), EventBusError>;

    /// Subscribe to change events for a gang.
    ///
    /// Returns a stream that yields events as they occur, until dropped.
    async fn subscribe(&self, gang_id: &GangId) -> Result<GangStream, EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use snatchit_docstore::UserId;

    #[test]
    fn event_kind_equality() {
        assert_eq!(GangEventKind::Created, GangEventKind::Created);
        assert_ne!(GangEventKind::Updated, GangEventKind::BustedUp);
    }

    #[test]
    fn gang_event_serialization_roundtrip() {
        let gang = Gang {
            id: GangId::new(),
            name: "Night Owls".to_string(),
            description: None,
            avatar: None,
            members: BTreeSet::from([UserId::from("f")]),
            bosses: BTreeSet::from([UserId::from("f")]),
            pending_invites: BTreeSet::new(),
            created_at: Utc::now(),
        };
        let event = GangEvent {
            kind: GangEventKind::Created,
            gang_id: gang.id,
            snapshot: Some(gang.clone()),
            timestamp: 1_234_567_890,
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: GangEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.kind, event.kind);
        assert_eq!(back.gang_id, event.gang_id);
        assert_eq!(back.snapshot.unwrap().members, gang.members);
        assert_eq!(back.timestamp, event.timestamp);
    }

    #[test]
    fn busted_up_event_has_no_snapshot() {
        let event = GangEvent {
            kind: GangEventKind::BustedUp,
            gang_id: GangId::new(),
            snapshot: None,
            timestamp: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: GangEvent = serde_json::from_str(&json).unwrap();
        assert!(back.snapshot.is_none());
        assert_eq!(back.kind, GangEventKind::BustedUp);
    }
}
