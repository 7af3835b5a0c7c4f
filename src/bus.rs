//! Message bus between background workers and the renderer
//!
//! Background collection work never calls into the presentation layer
//! directly. Everything the renderer needs arrives as a typed message on
//! this bus, and the renderer drains its subscription on its own schedule.

use tokio::sync::broadcast;

/// Broadcast bus for typed monitor messages.
///
/// Thin wrapper over a tokio broadcast channel. Subscribers that fall
/// behind lose the oldest messages rather than blocking the producers;
/// the current snapshot is always re-readable from the runtime, so a
/// lagging renderer only misses intermediate states.
pub struct Bus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> Bus<E> {
    /// Create a new bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a message to all subscribers.
    ///
    /// # Returns
    /// Number of subscribers that received the message. Zero subscribers
    /// is not an error; collection runs headless just fine.
    pub fn publish(&self, message: E) -> usize {
        match self.tx.send(message) {
            Ok(receiver_count) => receiver_count,
            Err(_) => 0,
        }
    }

    /// Subscribe to all future messages.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Default for Bus<E> {
    fn default() -> Self {
        Self::new(256)
    }
}
