//! Best-effort status push channel
//!
//! Fans out operation snapshots on every state transition. Delivery is not
//! guaranteed: send errors and lagging receivers are ignored, and a missed
//! push is always recoverable via the next status poll, which remains the
//! authoritative read path.

use tokio::sync::broadcast;

use crate::ops::operation::UpdateOperation;

const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe fan-out for status snapshots.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<UpdateOperation>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Push a snapshot to all current subscribers. No-op when nobody
    /// listens.
    pub fn publish(&self, op: &UpdateOperation) {
        let _ = self.tx.send(op.clone());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateOperation> {
        self.tx.subscribe()
    }
}
