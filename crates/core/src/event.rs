//! Store events — notifications for collaborators outside the engine.
//!
//! Every committed store mutation publishes one event. Background persistence
//! and UI refreshes subscribe; the store never waits for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::{MessageId, ProjectId};
use crate::priority::PriorityTier;

/// All events published by the conversation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A message was inserted and ranked
    MessageAppended {
        project_id: ProjectId,
        message_id: MessageId,
        tier: PriorityTier,
        timestamp: DateTime<Utc>,
    },

    /// A message's content or state was patched
    MessageUpdated {
        project_id: ProjectId,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// A message's tier changed through explicit reassignment
    PriorityReassigned {
        project_id: ProjectId,
        message_id: MessageId,
        tier: PriorityTier,
        timestamp: DateTime<Utc>,
    },

    /// The current instruction pointer moved
    CurrentInstructionChanged {
        project_id: ProjectId,
        previous: Option<MessageId>,
        current: Option<MessageId>,
        timestamp: DateTime<Utc>,
    },

    /// A closure signal resolved earlier messages
    MessagesResolved {
        project_id: ProjectId,
        closed_by: MessageId,
        resolved: Vec<MessageId>,
        timestamp: DateTime<Utc>,
    },

    /// All tiers were recomputed
    PrioritiesRecomputed {
        project_id: ProjectId,
        live: usize,
        excluded: usize,
        timestamp: DateTime<Utc>,
    },

    /// The project history was wiped and reseeded
    ProjectCleared {
        project_id: ProjectId,
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Remote messages were merged after a reload
    ProjectHydrated {
        project_id: ProjectId,
        remote: usize,
        kept_local: usize,
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    pub fn project_id(&self) -> &ProjectId {
        match self {
            Self::MessageAppended { project_id, .. }
            | Self::MessageUpdated { project_id, .. }
            | Self::PriorityReassigned { project_id, .. }
            | Self::CurrentInstructionChanged { project_id, .. }
            | Self::MessagesResolved { project_id, .. }
            | Self::PrioritiesRecomputed { project_id, .. }
            | Self::ProjectCleared { project_id, .. }
            | Self::ProjectHydrated { project_id, .. } => project_id,
        }
    }
}

/// A broadcast-based event bus for store events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow subscribers
/// lag and lose the oldest events; the publisher never blocks.
pub struct EventBus {
    sender: broadcast::Sender<Arc<StoreEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
