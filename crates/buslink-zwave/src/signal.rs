/*!
 * Network signal bus.
 *
 * Raw protocol callbacks (value added/changed, node added, notifications)
 * fan out to registered handlers. The bus is owned by the network object, so
 * its lifetime is the network's lifetime and tests can run several networks
 * side by side. Delivery is synchronous on the calling thread: when `send`
 * returns, every handler has seen the signal.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::value::{ZwaveNode, ZwaveValue};

/// A raw network event
#[derive(Debug, Clone)]
pub enum Signal {
    /// A value appeared on a node
    ValueAdded(Arc<ZwaveNode>, Arc<ZwaveValue>),
    /// A value's data changed
    ValueChanged(Arc<ZwaveNode>, Arc<ZwaveValue>),
    /// A value disappeared from a node
    ValueRemoved(Arc<ZwaveNode>, u64),
    /// A node joined the network
    NodeAdded(Arc<ZwaveNode>),
    /// A node left the network
    NodeRemoved(u8),
    /// A node sent a notification code
    Notification(u8, u8),
    /// A node fired a scene
    SceneEvent(u8, u8),
    /// All awake nodes finished their interviews
    AwakeNodesQueried,
    /// Every node finished its interview
    AllNodesQueried,
    /// Interviews finished but some nodes are dead
    AllNodesQueriedSomeDead,
}

/// Handler invoked for every signal
pub type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Handle for one connected handler; pass to [`SignalBus::disconnect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalSubscription(u64);

/// Synchronous publish/subscribe bus for network signals
pub struct SignalBus {
    handlers: Mutex<Vec<(u64, SignalHandler)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.lock().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("SignalBus").field("handlers", &count).finish()
    }
}

impl SignalBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect a handler; it sees every subsequent signal
    pub fn connect(&self, handler: SignalHandler) -> SignalSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push((id, handler));
        }
        SignalSubscription(id)
    }

    /// Disconnect a handler; unknown subscriptions are ignored
    pub fn disconnect(&self, subscription: SignalSubscription) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.retain(|(id, _)| *id != subscription.0);
        }
    }

    /// Number of connected handlers
    pub fn len(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Whether no handlers are connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a signal to every handler, synchronously, in connect order
    pub fn send(&self, signal: &Signal) {
        let handlers: Vec<SignalHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            Err(_) => return,
        };
        trace!("Signal {:?} to {} handlers", signal, handlers.len());
        for handler in handlers {
            handler(signal);
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_send_disconnect() {
        let bus = SignalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let subscription = bus.connect(Arc::new(move |signal| {
            if let Signal::NodeRemoved(node_id) = signal {
                seen_clone.lock().unwrap().push(*node_id);
            }
        }));

        bus.send(&Signal::NodeRemoved(4));
        // Delivery is synchronous, nothing to wait for
        assert_eq!(*seen.lock().unwrap(), vec![4]);

        bus.disconnect(subscription);
        assert!(bus.is_empty());
        bus.send(&Signal::NodeRemoved(5));
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[test]
    fn test_handlers_run_in_connect_order() {
        let bus = SignalBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.connect(Arc::new(move |_signal| {
                order.lock().unwrap().push(tag);
            }));
        }

        bus.send(&Signal::AllNodesQueried);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
