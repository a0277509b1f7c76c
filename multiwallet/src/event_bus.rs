//! Broadcast channel carrying backend notifications and view change events.
//!
//! Every subscriber receives every event emitted after it subscribed.

use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_EVENT_LIMIT: usize = 1024;

/// Event delivery errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The receiver fell behind and the oldest events were dropped.
    #[error("receiver lagged, {0} events dropped")]
    Lagged(u64),

    #[error("event bus closed")]
    Closed,
}

type Result<T> = std::result::Result<T, Error>;

/// Cloneable sending side of a broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus buffering up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
        }
    }

    pub fn subscribe(&self) -> EventReceiver<T> {
        EventReceiver::new(self.sender.subscribe())
    }

    /// Emit events to all current subscribers. Having none is not an error.
    pub fn emit(&self, events: &[T]) {
        for event in events {
            let _ = self.sender.send(event.clone());
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

#[derive(Debug)]
pub struct EventReceiver<T: Clone> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventReceiver<T> {
    pub fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self {
            receiver,
        }
    }

    pub async fn recv(&mut self) -> Result<T> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(Error::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(Error::Closed),
        }
    }

    /// Next already-buffered event, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(&["tx"]);

        assert_eq!(rx.recv().await.unwrap(), "tx");
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_emit_without_receivers() {
        let bus = EventBus::new(4);
        bus.emit(&[1u32, 2, 3]);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_dropped_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        bus.emit(&[1u32, 2, 3, 4]);

        assert_eq!(rx.recv().await, Err(Error::Lagged(2)));
        assert_eq!(rx.recv().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_closed_bus() {
        let bus = EventBus::<u32>::new(2);
        let mut rx = bus.subscribe();
        drop(bus);
        assert_eq!(rx.recv().await, Err(Error::Closed));
    }
}
