/*!
 * Network integration glue.
 *
 * Owns the node map, the signal bus, the collector list and the entity-id
 * registry, and wires protocol signals into the binding engine. The
 * collector list is copy-on-write: handlers iterate a snapshot while new
 * collectors are appended behind the write lock, so a value-added signal can
 * safely create collectors mid-iteration.
 */
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use buslink_core::event::SharedEventBus;
use buslink_core::state::{EntityAddedEvent, EntityState, StateChangedEvent};

use crate::config::DeviceConfigMap;
use crate::entity_values::{
    BindingContext, BindingState, CreatedEntity, EntityIdRegistry, EntityValues,
};
use crate::platform::{PlatformRegistry, ZwaveDeviceEntity};
use crate::schema::{check_node_schema, check_value_schema, discovery_schemas, DiscoverySchema, SchemaOverlay, PRIMARY};
use crate::signal::{Signal, SignalBus, SignalSubscription};
use crate::value::{ZwaveNode, ZwaveValue};

/// Default bound on the entity readiness wait
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default interval between readiness warnings
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(10);

struct LiveEntity {
    entity: Arc<dyn ZwaveDeviceEntity>,
    last_state: Option<EntityState>,
}

/// The Z-Wave network object
pub struct ZwaveNetwork {
    signals: SignalBus,
    events: SharedEventBus,
    schemas: Vec<Arc<DiscoverySchema>>,
    nodes: RwLock<HashMap<u8, Arc<ZwaveNode>>>,
    collectors: RwLock<Arc<Vec<Arc<EntityValues>>>>,
    // (schema index, node id, instance) triples that already have a collector
    bindings: Mutex<HashSet<(usize, u8, u8)>>,
    entities: Mutex<HashMap<String, LiveEntity>>,
    entity_registry: Arc<EntityIdRegistry>,
    platforms: Arc<PlatformRegistry>,
    device_config: Arc<DeviceConfigMap>,
    created_tx: mpsc::UnboundedSender<CreatedEntity>,
    created_rx: Mutex<Option<mpsc::UnboundedReceiver<CreatedEntity>>>,
    subscriptions: Mutex<Vec<SignalSubscription>>,
    entity_task: Mutex<Option<JoinHandle<()>>>,
    ready_timeout: Duration,
    warn_interval: Duration,
}

impl std::fmt::Debug for ZwaveNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.nodes.read().map(|n| n.len()).unwrap_or(0);
        f.debug_struct("ZwaveNetwork").field("nodes", &nodes).finish()
    }
}

impl ZwaveNetwork {
    /// Create a network with the built-in schemas and platforms
    pub fn new(events: SharedEventBus, device_config: Arc<DeviceConfigMap>) -> Arc<Self> {
        Self::with_timeouts(events, device_config, DEFAULT_READY_TIMEOUT, DEFAULT_WARN_INTERVAL)
    }

    /// Create a network with explicit readiness timeouts
    pub fn with_timeouts(
        events: SharedEventBus,
        device_config: Arc<DeviceConfigMap>,
        ready_timeout: Duration,
        warn_interval: Duration,
    ) -> Arc<Self> {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            signals: SignalBus::new(),
            events,
            schemas: discovery_schemas().into_iter().map(Arc::new).collect(),
            nodes: RwLock::new(HashMap::new()),
            collectors: RwLock::new(Arc::new(Vec::new())),
            bindings: Mutex::new(HashSet::new()),
            entities: Mutex::new(HashMap::new()),
            entity_registry: EntityIdRegistry::new(),
            platforms: Arc::new(PlatformRegistry::with_defaults()),
            device_config,
            created_tx,
            created_rx: Mutex::new(Some(created_rx)),
            subscriptions: Mutex::new(Vec::new()),
            entity_task: Mutex::new(None),
            ready_timeout,
            warn_interval,
        })
    }

    /// The signal bus protocol callbacks feed
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// The entity-id registry
    pub fn entity_registry(&self) -> &Arc<EntityIdRegistry> {
        &self.entity_registry
    }

    /// Look up a node
    pub fn node(&self, node_id: u8) -> Option<Arc<ZwaveNode>> {
        self.nodes.read().ok()?.get(&node_id).cloned()
    }

    /// Snapshot of all nodes
    pub fn nodes(&self) -> Vec<Arc<ZwaveNode>> {
        self.nodes
            .read()
            .map(|nodes| nodes.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all collectors
    pub fn collectors(&self) -> Arc<Vec<Arc<EntityValues>>> {
        self.collectors
            .read()
            .map(|collectors| collectors.clone())
            .unwrap_or_default()
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Connect signal handlers and start the entity registration task
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let subscription = self.signals.connect(Arc::new(move |signal| {
            if let Some(network) = weak.upgrade() {
                network.handle_signal(signal);
            }
        }));
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.push(subscription);
        }

        let rx = self.created_rx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut rx) = rx {
            let weak = Arc::downgrade(self);
            let task = tokio::spawn(async move {
                while let Some(created) = rx.recv().await {
                    match weak.upgrade() {
                        Some(network) => network.register_entity(created),
                        None => break,
                    }
                }
            });
            if let Ok(mut slot) = self.entity_task.lock() {
                *slot = Some(task);
            }
        }
        info!("Z-Wave network started with {} schemas", self.schemas.len());
    }

    /// Release all signal subscriptions and stop entity registration
    pub fn shutdown(&self) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            for subscription in subscriptions.drain(..) {
                self.signals.disconnect(subscription);
            }
        }
        if let Ok(mut task) = self.entity_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
        info!("Z-Wave network shut down");
    }

    fn binding_context(&self) -> BindingContext {
        BindingContext {
            platforms: self.platforms.clone(),
            device_config: self.device_config.clone(),
            entity_registry: self.entity_registry.clone(),
            created: self.created_tx.clone(),
            ready_timeout: self.ready_timeout,
            warn_interval: self.warn_interval,
        }
    }

    fn handle_signal(self: &Arc<Self>, signal: &Signal) {
        match signal {
            Signal::NodeAdded(node) => self.handle_node_added(node),
            Signal::NodeRemoved(node_id) => self.handle_node_removed(*node_id),
            Signal::ValueAdded(node, value) => self.handle_value_added(node, value),
            Signal::ValueChanged(_node, value) => self.handle_value_changed(value),
            Signal::ValueRemoved(node, value_id) => {
                node.remove_value(*value_id);
            }
            Signal::Notification(node_id, code) => {
                debug!("Notification {} from node {}", code, node_id);
            }
            Signal::SceneEvent(node_id, scene_id) => {
                debug!("Scene {} activated on node {}", scene_id, node_id);
            }
            Signal::AwakeNodesQueried => info!("All awake nodes queried"),
            Signal::AllNodesQueried => info!("All nodes queried"),
            Signal::AllNodesQueriedSomeDead => {
                warn!("All nodes queried, some are dead");
            }
        }
    }

    fn handle_node_added(self: &Arc<Self>, node: &Arc<ZwaveNode>) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(node.node_id, node.clone());
        }
        info!("Node {} added", node.node_id);
        // Values that arrived before the node signal are discovered now
        for value in node.values() {
            self.handle_value_added(node, &value);
        }
    }

    fn handle_node_removed(&self, node_id: u8) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.remove(&node_id);
        }
        if let Ok(mut collectors) = self.collectors.write() {
            let kept: Vec<Arc<EntityValues>> = collectors
                .iter()
                .filter(|collector| collector.node().node_id != node_id)
                .cloned()
                .collect();
            *collectors = Arc::new(kept);
        }
        if let Ok(mut bindings) = self.bindings.lock() {
            bindings.retain(|(_, bound_node, _)| *bound_node != node_id);
        }
        info!("Node {} removed", node_id);
    }

    fn handle_value_added(self: &Arc<Self>, node: &Arc<ZwaveNode>, value: &Arc<ZwaveValue>) {
        node.add_value(value.clone());

        // Offer the value to existing collectors first
        for collector in self.collectors().iter() {
            collector.check_value(value);
        }

        // Then try to start new collectors for schemas whose primary matches
        for (index, schema) in self.schemas.iter().enumerate() {
            let key = (index, node.node_id, value.instance);
            {
                let bindings = match self.bindings.lock() {
                    Ok(bindings) => bindings,
                    Err(_) => return,
                };
                if bindings.contains(&key) {
                    continue;
                }
            }
            if !check_node_schema(node, schema, &SchemaOverlay::default()) {
                continue;
            }
            let primary_schema = match schema.values.get(PRIMARY) {
                Some(primary_schema) => primary_schema,
                None => continue,
            };
            if !check_value_schema(value, primary_schema, &SchemaOverlay::default()) {
                continue;
            }

            if let Ok(mut bindings) = self.bindings.lock() {
                bindings.insert(key);
            }
            let collector = EntityValues::new(
                schema.clone(),
                value.clone(),
                node.clone(),
                self.binding_context(),
            );
            if let Ok(mut collectors) = self.collectors.write() {
                let mut appended: Vec<Arc<EntityValues>> = collectors.as_ref().clone();
                appended.push(collector);
                *collectors = Arc::new(appended);
            }
        }
    }

    fn handle_value_changed(&self, value: &Arc<ZwaveValue>) {
        for collector in self.collectors().iter() {
            if collector.state() != BindingState::Bound {
                continue;
            }
            if !collector.values().contains_value(value.value_id) {
                continue;
            }
            if let Some((entity_id, entity)) = collector.entity() {
                self.publish_state(&entity_id, &entity);
            }
        }
    }

    fn register_entity(&self, created: CreatedEntity) {
        info!(
            "Entity {} registered on platform {}",
            created.entity_id, created.platform
        );
        if let Err(e) = self.events.publish(EntityAddedEvent {
            platform: created.platform.as_str().to_string(),
            entity_id: created.entity_id.clone(),
            unique_id: created.unique_id.clone(),
        }) {
            warn!("Failed to publish entity added event: {}", e);
        }
        if let Ok(mut entities) = self.entities.lock() {
            entities.insert(
                created.entity_id.clone(),
                LiveEntity {
                    entity: created.entity.clone(),
                    last_state: None,
                },
            );
        }
        self.publish_state(&created.entity_id, &created.entity);
    }

    fn publish_state(&self, entity_id: &str, entity: &Arc<dyn ZwaveDeviceEntity>) {
        let new_state = entity.state();
        let old_state = match self.entities.lock() {
            Ok(mut entities) => match entities.get_mut(entity_id) {
                Some(live) => live.last_state.replace(new_state.clone()),
                None => None,
            },
            Err(_) => None,
        };
        if old_state.as_ref() == Some(&new_state) {
            return;
        }
        if let Err(e) = self.events.publish(StateChangedEvent {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: Some(new_state),
        }) {
            warn!("Failed to publish state for {}: {}", entity_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use buslink_core::types::Value;

    use crate::value::{CommandClass, ValueGenre, ValueType};

    fn network() -> (Arc<ZwaveNetwork>, SharedEventBus) {
        let events = SharedEventBus::new();
        let network = ZwaveNetwork::with_timeouts(
            events.clone(),
            Arc::new(DeviceConfigMap::new()),
            Duration::from_millis(100),
            Duration::from_millis(20),
        );
        network.start();
        (network, events)
    }

    fn switch_node(node_id: u8) -> Arc<ZwaveNode> {
        let node =
            ZwaveNode::new(node_id, "Office", "0x0086", "0x0003", "0x0060", 0x10, 0x00).unwrap();
        node.set_ready(true);
        node
    }

    fn switch_value(value_id: u64) -> Arc<ZwaveValue> {
        ZwaveValue::new(
            value_id,
            CommandClass::SwitchBinary,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Switch",
            Value::Bool(false),
        )
    }

    #[tokio::test]
    async fn test_discovery_through_signals() {
        let (network, events) = network();
        let mut added = events.subscribe::<EntityAddedEvent>().unwrap();

        let node = switch_node(3);
        network.signals().send(&Signal::NodeAdded(node.clone()));
        let value = switch_value(42);
        network.signals().send(&Signal::ValueAdded(node.clone(), value.clone()));

        let event = added.recv().await.unwrap();
        assert_eq!(event.platform, "switch");
        assert_eq!(event.entity_id, "switch.office_switch");
        assert_eq!(network.entity_count(), 1);

        // The same value arriving again starts no second collector
        network.signals().send(&Signal::ValueAdded(node, value));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(added.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_value_change_publishes_state() {
        let (network, events) = network();
        let mut changes = events.subscribe::<StateChangedEvent>().unwrap();

        let node = switch_node(3);
        let value = switch_value(42);
        network.signals().send(&Signal::NodeAdded(node.clone()));
        network.signals().send(&Signal::ValueAdded(node.clone(), value.clone()));

        // Initial state after registration
        let first = changes.recv().await.unwrap();
        assert_eq!(first.new_state.unwrap().state, Value::String("off".into()));

        value.set_data(Value::Bool(true));
        network.signals().send(&Signal::ValueChanged(node, value));
        let second = changes.recv().await.unwrap();
        assert_eq!(second.old_state.unwrap().state, Value::String("off".into()));
        assert_eq!(second.new_state.unwrap().state, Value::String("on".into()));
    }

    #[tokio::test]
    async fn test_node_removal_drops_collectors() {
        let (network, _events) = network();
        let node = switch_node(3);
        let value = switch_value(42);
        network.signals().send(&Signal::NodeAdded(node.clone()));
        network.signals().send(&Signal::ValueAdded(node, value));
        assert_eq!(network.collectors().len(), 1);

        network.signals().send(&Signal::NodeRemoved(3));
        assert!(network.collectors().is_empty());
        assert!(network.node(3).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscriptions() {
        let (network, _events) = network();
        assert_eq!(network.signals().len(), 1);
        network.shutdown();
        assert!(network.signals().is_empty());

        // Signals after shutdown are ignored
        let node = switch_node(3);
        network.signals().send(&Signal::NodeAdded(node));
        assert!(network.nodes().is_empty());
    }
}
