//! Broadcast observer for access decisions and share lifecycle
//! changes. Side-effect only: subscribers can watch, nothing here ever
//! influences a decision, and sends without subscribers are dropped.

use crate::store::ShareScope;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum AccessEvent {
    OwnerGranted { workspace_id: Uuid },
    ShareGranted { workspace_id: Uuid, scope: ShareScope },
    Denied,
    ShareCreated { id: Uuid, workspace_id: Uuid },
    ShareRevoked { id: Uuid },
    ShareRegenerated { old_id: Uuid, new_id: Uuid },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AccessEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: AccessEvent) {
        let _ = self.tx.send(event);
    }
}
