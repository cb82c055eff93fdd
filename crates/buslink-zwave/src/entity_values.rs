/*!
 * The entity binding engine.
 *
 * A collector is created when a value matches the primary slot of a
 * discovery schema. It then gathers the remaining named slots as values
 * appear on the node and creates exactly one entity once every required slot
 * is filled. Workaround overrides and per-entity device configuration can
 * veto the entity; that veto is terminal.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use buslink_core::utils::slugify;

use crate::config::DeviceConfigMap;
use crate::platform::{FactoryContext, PlatformKind, PlatformRegistry, ZwaveDeviceEntity};
use crate::schema::{
    check_node_schema, check_value_schema, DiscoverySchema, SchemaOverlay, PRIMARY,
};
use crate::value::{compute_value_unique_id, value_name, ZwaveNode, ZwaveValue};
use crate::workaround::{self, PlatformOverride};

/// The named value slots bound so far, shared with the created entity
pub struct BoundValues {
    slots: RwLock<HashMap<String, Arc<ZwaveValue>>>,
}

impl std::fmt::Debug for BoundValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .slots
            .read()
            .map(|slots| slots.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        f.debug_struct("BoundValues").field("slots", &names).finish()
    }
}

impl BoundValues {
    /// Create an empty slot set
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// The value bound to a slot
    pub fn get(&self, name: &str) -> Option<Arc<ZwaveValue>> {
        self.slots.read().ok()?.get(name).cloned()
    }

    /// The primary value
    pub fn primary(&self) -> Option<Arc<ZwaveValue>> {
        self.get(PRIMARY)
    }

    /// Whether a slot is filled
    pub fn is_bound(&self, name: &str) -> bool {
        self.slots
            .read()
            .map(|slots| slots.contains_key(name))
            .unwrap_or(false)
    }

    /// Whether any slot holds the given value
    pub fn contains_value(&self, value_id: u64) -> bool {
        self.slots
            .read()
            .map(|slots| slots.values().any(|value| value.value_id == value_id))
            .unwrap_or(false)
    }

    /// Bind a value into a slot; filled slots are never overwritten
    pub fn bind(&self, name: &str, value: Arc<ZwaveValue>) -> bool {
        match self.slots.write() {
            Ok(mut slots) => {
                if slots.contains_key(name) {
                    return false;
                }
                slots.insert(name.to_string(), value);
                true
            }
            Err(_) => false,
        }
    }
}

/// Maps stable unique ids to entity ids and keeps generated ids unique
#[derive(Debug, Default)]
pub struct EntityIdRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_unique_id: HashMap<(PlatformKind, String), String>,
    taken: std::collections::HashSet<String>,
}

impl EntityIdRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a previously registered entity id
    pub fn lookup(&self, platform: PlatformKind, unique_id: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()?
            .by_unique_id
            .get(&(platform, unique_id.to_string()))
            .cloned()
    }

    /// Generate a fresh entity id from a display name
    pub fn generate(&self, platform: PlatformKind, name: &str) -> String {
        let slug = slugify(name);
        let base = format!("{}.{}", platform.as_str(), slug);
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return base,
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while inner.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        inner.taken.insert(candidate.clone());
        candidate
    }

    /// Record an entity id, optionally pinned to a unique id
    pub fn register(&self, platform: PlatformKind, unique_id: Option<&str>, entity_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.taken.insert(entity_id.to_string());
            if let Some(unique_id) = unique_id {
                inner
                    .by_unique_id
                    .insert((platform, unique_id.to_string()), entity_id.to_string());
            }
        }
    }
}

/// An entity the binding engine finished creating
pub struct CreatedEntity {
    /// The generated or recovered entity id
    pub entity_id: String,
    /// The platform the entity landed on, after workaround overrides
    pub platform: PlatformKind,
    /// Stable unique id, when the node could provide one at creation time
    pub unique_id: Option<String>,
    /// The entity object
    pub entity: Arc<dyn ZwaveDeviceEntity>,
}

impl std::fmt::Debug for CreatedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedEntity")
            .field("entity_id", &self.entity_id)
            .field("platform", &self.platform)
            .field("unique_id", &self.unique_id)
            .finish()
    }
}

/// Dependencies the binding engine needs from the network layer
#[derive(Clone)]
pub struct BindingContext {
    /// Platform factory registry
    pub platforms: Arc<PlatformRegistry>,
    /// Per-entity device configuration
    pub device_config: Arc<DeviceConfigMap>,
    /// Unique id to entity id mapping
    pub entity_registry: Arc<EntityIdRegistry>,
    /// Where finished entities are delivered
    pub created: mpsc::UnboundedSender<CreatedEntity>,
    /// How long to wait for node readiness before proceeding anyway
    pub ready_timeout: Duration,
    /// How often to log while waiting
    pub warn_interval: Duration,
}

/// Lifecycle of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// One or more required slots are unfilled
    Collecting,
    /// The entity was created
    Bound,
    /// No entity will ever be created; terminal
    Ignored,
}

/// Collects the values a discovery schema needs and creates the entity
pub struct EntityValues {
    schema: Arc<DiscoverySchema>,
    overlay: SchemaOverlay,
    node: Arc<ZwaveNode>,
    instance: u8,
    values: Arc<BoundValues>,
    state: Mutex<BindingState>,
    entity: Mutex<Option<(String, Arc<dyn ZwaveDeviceEntity>)>>,
    ctx: BindingContext,
}

impl std::fmt::Debug for EntityValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityValues")
            .field("platform", &self.schema.platform)
            .field("node_id", &self.node.node_id)
            .field("instance", &self.instance)
            .field("state", &self.state())
            .finish()
    }
}

impl EntityValues {
    /// Create a collector seeded with its primary value.
    ///
    /// All values already present on the node are scanned immediately, so a
    /// fully interviewed node can bind in one step.
    pub fn new(
        schema: Arc<DiscoverySchema>,
        primary: Arc<ZwaveValue>,
        node: Arc<ZwaveNode>,
        ctx: BindingContext,
    ) -> Arc<Self> {
        let instance = primary.instance;
        let values = BoundValues::new();
        values.bind(PRIMARY, primary);

        let collector = Arc::new(Self {
            schema,
            overlay: SchemaOverlay::for_binding(node.node_id, instance),
            node,
            instance,
            values,
            state: Mutex::new(BindingState::Collecting),
            entity: Mutex::new(None),
            ctx,
        });

        for value in collector.node.values() {
            collector.check_value(&value);
        }
        collector.check_entity_ready();
        collector
    }

    /// The node this collector binds values from
    pub fn node(&self) -> &Arc<ZwaveNode> {
        &self.node
    }

    /// The endpoint instance this collector is pinned to
    pub fn instance(&self) -> u8 {
        self.instance
    }

    /// The schema platform (before workaround overrides)
    pub fn schema_platform(&self) -> PlatformKind {
        self.schema.platform
    }

    /// The bound value slots
    pub fn values(&self) -> &Arc<BoundValues> {
        &self.values
    }

    /// Current lifecycle state
    pub fn state(&self) -> BindingState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(BindingState::Collecting)
    }

    /// The created entity, once bound
    pub fn entity(&self) -> Option<(String, Arc<dyn ZwaveDeviceEntity>)> {
        self.entity.lock().ok()?.clone()
    }

    /// Offer a value to this collector.
    ///
    /// The value is bound into every matching unfilled slot; a full or
    /// non-matching collector ignores it. Safe to call any number of times
    /// with the same value.
    pub fn check_value(&self, value: &Arc<ZwaveValue>) {
        if !check_node_schema(&self.node, &self.schema, &self.overlay) {
            return;
        }
        let mut bound_any = false;
        for (name, slot_schema) in &self.schema.values {
            if self.values.is_bound(name) {
                continue;
            }
            if !check_value_schema(value, slot_schema, &self.overlay) {
                continue;
            }
            if self.values.bind(name, value.clone()) {
                debug!(
                    "Node {} value {} bound to slot '{}' of {}",
                    self.node.node_id, value.value_id, name, self.schema.platform
                );
                bound_any = true;
            }
        }
        if bound_any {
            self.check_entity_ready();
        }
    }

    /// Create the entity if every required slot is filled.
    ///
    /// Idempotent: once the collector is bound or ignored this is a no-op.
    pub fn check_entity_ready(&self) {
        if self.state() != BindingState::Collecting {
            return;
        }
        for (name, slot_schema) in &self.schema.values {
            if !slot_schema.optional && !self.values.is_bound(name) {
                return;
            }
        }
        let primary = match self.values.primary() {
            Some(primary) => primary,
            None => return,
        };

        let mut platform = self.schema.platform;
        match workaround::resolve_platform(&self.node, &primary) {
            Some(PlatformOverride::Ignore) => {
                info!(
                    "Ignoring node {} value {} due to workaround",
                    self.node.node_id, primary.value_id
                );
                self.freeze_ignored();
                return;
            }
            Some(PlatformOverride::Use(kind)) if kind != platform => {
                debug!("Using platform {} instead of {}", kind, platform);
                platform = kind;
            }
            _ => {}
        }

        let unique_id = compute_value_unique_id(&self.node, &primary);
        let entity_id = match self.ctx.entity_registry.lookup(platform, &unique_id) {
            Some(entity_id) => entity_id,
            None => self
                .ctx
                .entity_registry
                .generate(platform, &value_name(&self.node, &primary)),
        };

        let config = self.ctx.device_config.lookup(&entity_id);
        if config.ignored {
            info!("Ignoring entity {} due to device settings", entity_id);
            self.freeze_ignored();
            return;
        }
        if config.polling_intensity > 0 {
            primary.enable_poll(config.polling_intensity);
        }

        let factory = match self.ctx.platforms.resolve(platform) {
            Some(factory) => factory,
            None => {
                warn!("No platform factory for {}", platform);
                self.freeze_ignored();
                return;
            }
        };
        let entity = match factory(&FactoryContext {
            node: self.node.clone(),
            values: self.values.clone(),
            config,
        }) {
            Some(entity) => entity,
            None => {
                self.freeze_ignored();
                return;
            }
        };

        if let Ok(mut state) = self.state.lock() {
            *state = BindingState::Bound;
        }
        if let Ok(mut slot) = self.entity.lock() {
            *slot = Some((entity_id.clone(), entity.clone()));
        }

        if entity.unique_id().is_some() {
            self.register_entity(platform, entity_id, entity);
        } else {
            self.spawn_readiness_wait(platform, entity_id, entity);
        }
    }

    fn freeze_ignored(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = BindingState::Ignored;
        }
    }

    fn register_entity(
        &self,
        platform: PlatformKind,
        entity_id: String,
        entity: Arc<dyn ZwaveDeviceEntity>,
    ) {
        let unique_id = entity.unique_id();
        self.ctx
            .entity_registry
            .register(platform, unique_id.as_deref(), &entity_id);
        let created = CreatedEntity {
            entity_id,
            platform,
            unique_id,
            entity,
        };
        if self.ctx.created.send(created).is_err() {
            warn!("Entity sink closed; dropping created entity");
        }
    }

    /// Wait for the node to finish its interview so the entity can register
    /// with a stable unique id, but never block entity creation forever.
    fn spawn_readiness_wait(
        &self,
        platform: PlatformKind,
        entity_id: String,
        entity: Arc<dyn ZwaveDeviceEntity>,
    ) {
        let node = self.node.clone();
        let ctx = self.ctx.clone();
        let name = entity.name();
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            loop {
                if node.is_ready() {
                    info!(
                        "Entity {} (node {}) ready after {:?}",
                        name,
                        node.node_id,
                        started.elapsed()
                    );
                    break;
                }
                if started.elapsed() >= ctx.ready_timeout {
                    warn!(
                        "Entity {} (node {}) not ready after {:?}, continuing anyway",
                        name,
                        node.node_id,
                        started.elapsed()
                    );
                    break;
                }
                warn!(
                    "Entity {} (node {}) still waiting for node readiness",
                    name, node.node_id
                );
                tokio::time::sleep(ctx.warn_interval).await;
            }

            let unique_id = entity.unique_id();
            ctx.entity_registry
                .register(platform, unique_id.as_deref(), &entity_id);
            let created = CreatedEntity {
                entity_id,
                platform,
                unique_id,
                entity,
            };
            if ctx.created.send(created).is_err() {
                warn!("Entity sink closed; dropping created entity");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use buslink_core::types::Value;

    use crate::schema::{discovery_schemas, GENERIC_TYPE_ENTRY_CONTROL};
    use crate::value::{CommandClass, ValueGenre, ValueType};

    fn schema_for(kind: PlatformKind) -> Arc<DiscoverySchema> {
        Arc::new(
            discovery_schemas()
                .into_iter()
                .find(|schema| schema.platform == kind)
                .unwrap(),
        )
    }

    fn context() -> (BindingContext, mpsc::UnboundedReceiver<CreatedEntity>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            BindingContext {
                platforms: Arc::new(PlatformRegistry::with_defaults()),
                device_config: Arc::new(DeviceConfigMap::new()),
                entity_registry: EntityIdRegistry::new(),
                created: tx,
                ready_timeout: Duration::from_millis(100),
                warn_interval: Duration::from_millis(20),
            },
            rx,
        )
    }

    fn switch_node(node_id: u8, ready: bool) -> Arc<ZwaveNode> {
        let node =
            ZwaveNode::new(node_id, "Office", "0x0086", "0x0003", "0x0060", 0x10, 0x00).unwrap();
        node.set_ready(ready);
        node
    }

    fn switch_value(value_id: u64, instance: u8) -> Arc<ZwaveValue> {
        ZwaveValue::new(
            value_id,
            CommandClass::SwitchBinary,
            0,
            instance,
            ValueGenre::User,
            ValueType::Bool,
            "Switch",
            Value::Bool(false),
        )
    }

    #[tokio::test]
    async fn test_single_slot_schema_binds_immediately() {
        let (ctx, mut rx) = context();
        let node = switch_node(3, true);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());

        let collector = EntityValues::new(schema_for(PlatformKind::Switch), primary, node, ctx);
        assert_eq!(collector.state(), BindingState::Bound);

        let created = rx.recv().await.unwrap();
        assert_eq!(created.entity_id, "switch.office_switch");
        assert_eq!(created.unique_id.as_deref(), Some("3-42"));
    }

    #[tokio::test]
    async fn test_at_most_one_entity_per_match_group() {
        // Lock schema: primary required, alarm slots optional. Two values
        // match primary on the node; only one entity may be created.
        let (ctx, mut rx) = context();
        let node = ZwaveNode::new(
            7,
            "Front Door",
            "0x003B",
            "0x6341",
            "0x5044",
            GENERIC_TYPE_ENTRY_CONTROL,
            0x03,
        )
        .unwrap();
        node.set_ready(true);

        let primary = ZwaveValue::new(
            1001,
            CommandClass::DoorLock,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Locked",
            Value::Bool(false),
        );
        node.add_value(primary.clone());
        let collector = EntityValues::new(schema_for(PlatformKind::Lock), primary, node.clone(), ctx);
        assert_eq!(collector.state(), BindingState::Bound);

        // A second primary-shaped value and repeated re-checks change nothing
        let duplicate = ZwaveValue::new(
            1005,
            CommandClass::DoorLock,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Locked",
            Value::Bool(true),
        );
        node.add_value(duplicate.clone());
        collector.check_value(&duplicate);
        collector.check_entity_ready();

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_optional_slot_binds_after_entity_exists() {
        let (ctx, mut rx) = context();
        let node = ZwaveNode::new(
            7,
            "Front Door",
            "0x003B",
            "0x6341",
            "0x5044",
            GENERIC_TYPE_ENTRY_CONTROL,
            0x03,
        )
        .unwrap();
        node.set_ready(true);
        let primary = ZwaveValue::new(
            1001,
            CommandClass::DoorLock,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Locked",
            Value::Bool(false),
        );
        node.add_value(primary.clone());
        let collector = EntityValues::new(schema_for(PlatformKind::Lock), primary, node, ctx);
        assert_eq!(collector.state(), BindingState::Bound);
        let created = rx.recv().await.unwrap();

        // alarm_type arrives late and still lands in its slot
        let alarm_type = ZwaveValue::new(
            1002,
            CommandClass::Alarm,
            0,
            1,
            ValueGenre::User,
            ValueType::Byte,
            "Alarm Type",
            Value::Integer(9),
        );
        collector.check_value(&alarm_type);
        assert!(collector.values().is_bound("alarm_type"));
        assert_eq!(
            created.entity.state().attribute("lock_status"),
            Some(&Value::String("Deadbolt Jammed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_workaround_ignore_is_terminal() {
        // Qubino flush shutter endpoint 2 resolves to the ignore override
        let (ctx, mut rx) = context();
        let node =
            ZwaveNode::new(9, "Shutter", "0x0159", "0x0003", "0x0052", 0x10, 0x00).unwrap();
        node.set_ready(true);
        let primary = switch_value(51, 2);
        node.add_value(primary.clone());

        let collector = EntityValues::new(schema_for(PlatformKind::Switch), primary, node, ctx);
        assert_eq!(collector.state(), BindingState::Ignored);

        // Repeated value checks never revive an ignored collector
        let another = switch_value(52, 2);
        collector.check_value(&another);
        collector.check_entity_ready();
        assert_eq!(collector.state(), BindingState::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_device_config_ignored_freezes() {
        let (mut ctx, mut rx) = context();
        let mut config = DeviceConfigMap::new();
        config.entities.insert(
            "switch.office_switch".to_string(),
            crate::config::DeviceEntityConfig {
                ignored: true,
                ..Default::default()
            },
        );
        ctx.device_config = Arc::new(config);

        let node = switch_node(3, true);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());
        let collector = EntityValues::new(schema_for(PlatformKind::Switch), primary, node, ctx);

        assert_eq!(collector.state(), BindingState::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_polling_intensity_applied() {
        let (mut ctx, _rx) = context();
        let mut config = DeviceConfigMap::new();
        config.domains.insert(
            "switch".to_string(),
            crate::config::DeviceEntityConfig {
                polling_intensity: 2,
                ..Default::default()
            },
        );
        ctx.device_config = Arc::new(config);

        let node = switch_node(3, true);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());
        EntityValues::new(schema_for(PlatformKind::Switch), primary.clone(), node, ctx);

        assert_eq!(primary.poll_intensity(), 2);
    }

    #[tokio::test]
    async fn test_readiness_wait_proceeds_after_timeout() {
        let (ctx, mut rx) = context();
        let node = switch_node(3, false);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());

        let collector =
            EntityValues::new(schema_for(PlatformKind::Switch), primary, node, ctx);
        // Entity exists immediately; registration is what waits
        assert_eq!(collector.state(), BindingState::Bound);

        // No unique id yet, so the entity registers only after the timeout
        let created = rx.recv().await.unwrap();
        assert_eq!(created.entity_id, "switch.office_switch");
        assert_eq!(created.unique_id, None);
    }

    #[tokio::test]
    async fn test_readiness_wait_registers_once_ready() {
        let (ctx, mut rx) = context();
        let node = switch_node(3, false);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());

        let _collector =
            EntityValues::new(schema_for(PlatformKind::Switch), primary, node.clone(), ctx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        node.set_ready(true);

        let created = rx.recv().await.unwrap();
        assert_eq!(created.unique_id.as_deref(), Some("3-42"));
    }

    #[tokio::test]
    async fn test_entity_id_recovered_from_registry() {
        let (ctx, mut rx) = context();
        ctx.entity_registry
            .register(PlatformKind::Switch, Some("3-42"), "switch.my_old_name");

        let node = switch_node(3, true);
        let primary = switch_value(42, 1);
        node.add_value(primary.clone());
        EntityValues::new(schema_for(PlatformKind::Switch), primary, node, ctx);

        let created = rx.recv().await.unwrap();
        assert_eq!(created.entity_id, "switch.my_old_name");
    }
}
