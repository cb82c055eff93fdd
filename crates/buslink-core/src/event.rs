/*!
 * Event bus for buslink.
 *
 * A type-keyed publish/subscribe bus. Each concrete event type gets its own
 * broadcast channel; publishers and subscribers never see each other's types.
 */
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Maximum number of events that can be buffered in a channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

type EventSender<T> = broadcast::Sender<T>;

/// Receiver half for a subscribed event type
pub type EventReceiver<T> = broadcast::Receiver<T>;

/// Event bus for publishing and subscribing to typed events
#[derive(Debug)]
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            channel_capacity: capacity,
        }
    }

    fn sender<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventSender<T>> {
        let type_id = TypeId::of::<T>();
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| Error::event("Failed to lock event channels"))?;

        if let Some(sender) = channels.get(&type_id) {
            Ok(sender
                .downcast_ref::<EventSender<T>>()
                .ok_or_else(|| Error::event("Failed to downcast event sender"))?
                .clone())
        } else {
            let (sender, _) = broadcast::channel(self.channel_capacity);
            channels.insert(type_id, Box::new(sender.clone()));
            Ok(sender)
        }
    }

    /// Publish an event, returning the number of receivers it reached
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        let sender = self.sender::<T>()?;

        if sender.receiver_count() == 0 {
            debug!("No receivers for event");
            return Ok(0);
        }

        match sender.send(event) {
            Ok(n) => {
                trace!("Published event to {} receivers", n);
                Ok(n)
            }
            Err(e) => {
                warn!("Failed to publish event: {}", e);
                Err(Error::event(format!("Failed to publish event: {}", e)))
            }
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        Ok(self.sender::<T>()?.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared event bus that can be cloned
#[derive(Debug, Clone)]
pub struct SharedEventBus(Arc<EventBus>);

impl SharedEventBus {
    /// Create a new shared event bus
    pub fn new() -> Self {
        Self(Arc::new(EventBus::new()))
    }

    /// Create a new shared event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Publish an event, returning the number of receivers it reached
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        self.0.publish(event)
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        self.0.subscribe()
    }
}

impl Default for SharedEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TelegramSeen {
        destination: String,
    }

    #[derive(Debug, Clone)]
    struct NodeQueried {
        node_id: u32,
    }

    #[tokio::test]
    async fn test_publish_subscribe() -> Result<()> {
        let bus = EventBus::new();
        let mut rx = bus.subscribe::<TelegramSeen>()?;

        let receivers = bus.publish(TelegramSeen {
            destination: "1/2/3".to_string(),
        })?;
        assert_eq!(receivers, 1);

        let received = rx.recv().await.map_err(|e| Error::event(e.to_string()))?;
        assert_eq!(received.destination, "1/2/3");

        Ok(())
    }

    #[tokio::test]
    async fn test_publish_without_receivers() -> Result<()> {
        let bus = EventBus::new();
        let receivers = bus.publish(NodeQueried { node_id: 7 })?;
        assert_eq!(receivers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_event_types_are_isolated() -> Result<()> {
        let bus = SharedEventBus::new();
        let mut telegrams = bus.subscribe::<TelegramSeen>()?;
        let mut nodes = bus.subscribe::<NodeQueried>()?;

        bus.publish(TelegramSeen {
            destination: "4/0/1".to_string(),
        })?;
        bus.publish(NodeQueried { node_id: 3 })?;

        let telegram = telegrams
            .recv()
            .await
            .map_err(|e| Error::event(e.to_string()))?;
        let node = nodes.recv().await.map_err(|e| Error::event(e.to_string()))?;

        assert_eq!(telegram.destination, "4/0/1");
        assert_eq!(node.node_id, 3);
        assert!(telegrams.try_recv().is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_subscribers() -> Result<()> {
        let bus = SharedEventBus::new();
        let mut rx1 = bus.subscribe::<NodeQueried>()?;
        let mut rx2 = bus.subscribe::<NodeQueried>()?;

        let receivers = bus.publish(NodeQueried { node_id: 11 })?;
        assert_eq!(receivers, 2);

        assert_eq!(rx1.recv().await.unwrap().node_id, 11);
        assert_eq!(rx2.recv().await.unwrap().node_id, 11);

        Ok(())
    }
}
