//! Change broadcaster.
//!
//! The `ChangeBroadcaster` is the in-process change stream. It uses tokio's
//! broadcast channel for multi-producer, multi-consumer messaging.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use super::types::ChangeEvent;

/// Events a lagging receiver may fall behind before it starts missing them.
const CHANNEL_CAPACITY: usize = 1024;

/// Broadcaster for storage change events.
///
/// Cheap to clone; every clone publishes into the same channel.
///
/// # Example
///
/// ```
/// use bucket_core::events::{ChangeBroadcaster, ChangeEvent};
///
/// let broadcaster = ChangeBroadcaster::new();
/// let _receiver = broadcaster.subscribe();
///
/// broadcaster.send(ChangeEvent::dropped("bucket_abc"));
/// ```
#[derive(Clone)]
pub struct ChangeBroadcaster {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::bounded(CHANNEL_CAPACITY)
    }

    /// Broadcaster whose receivers may lag `capacity` events behind.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send a change event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, 0 when
    /// nobody is listening.
    pub fn send(&self, event: ChangeEvent) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(broadcast::error::SendError(event)) => {
                trace!(
                    collection = %event.collection,
                    operation = ?event.operation,
                    "No subscribers, change event dropped"
                );
                0
            }
        }
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn receivers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Writers skip building events when this is false.
    pub fn has_subscribers(&self) -> bool {
        self.receivers() != 0
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBroadcaster")
            .field("receivers", &self.receivers())
            .finish()
    }
}
