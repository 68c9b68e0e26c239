//! Domain event system: decoupled observation of governed runs.
//!
//! Events are published as a run moves through the pipeline. Observers can
//! subscribe without the turn engine knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All governance events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceEvent {
    RunStarted {
        thread_id: String,
        variant: String,
        role: String,
        timestamp: DateTime<Utc>,
    },

    /// An action reached the ledger (which may still have refused it)
    ActionExecuted {
        thread_id: String,
        action: String,
        result: String,
        timestamp: DateTime<Utc>,
    },

    /// A gate blocked every pending action of a turn
    ActionsBlocked {
        thread_id: String,
        gate: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    RunSuspended {
        thread_id: String,
        action: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    RunResumed {
        thread_id: String,
        approved: bool,
        timestamp: DateTime<Utc>,
    },

    RunFinished {
        thread_id: String,
        status: String,
        turns: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for governance events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<GovernanceEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: GovernanceEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GovernanceEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
