/*!
 * Entity platforms.
 *
 * Each discovery schema targets a platform kind; a static registry maps the
 * kind to a factory function that builds the concrete entity from the bound
 * values. A factory returning `None` tells the binding engine that no entity
 * should exist for this value group.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use buslink_core::state::{EntityState, STATE_OFF, STATE_ON};
use buslink_core::types::{Metadata, Value};

use crate::config::DeviceEntityConfig;
use crate::entity_values::BoundValues;
use crate::lock;
use crate::value::{compute_value_unique_id, value_name, ZwaveNode, ZwaveValue};
use crate::workaround::{self, WorkaroundKind};

/// The platforms the discovery schemas can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    /// On/off switch
    Switch,
    /// Dimmable light
    Light,
    /// Binary sensor
    BinarySensor,
    /// Numeric sensor
    Sensor,
    /// Door lock
    Lock,
    /// Cover / shade
    Cover,
    /// Fan
    Fan,
    /// Thermostat
    Climate,
}

impl PlatformKind {
    /// The entity-id domain for this platform
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Switch => "switch",
            PlatformKind::Light => "light",
            PlatformKind::BinarySensor => "binary_sensor",
            PlatformKind::Sensor => "sensor",
            PlatformKind::Lock => "lock",
            PlatformKind::Cover => "cover",
            PlatformKind::Fan => "fan",
            PlatformKind::Climate => "climate",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a platform factory gets to work with
pub struct FactoryContext {
    /// The node the value group belongs to
    pub node: Arc<ZwaveNode>,
    /// The bound value slots
    pub values: Arc<BoundValues>,
    /// Per-entity device configuration
    pub config: DeviceEntityConfig,
}

/// A Z-Wave backed entity
pub trait ZwaveDeviceEntity: Send + Sync {
    /// The platform the entity belongs to
    fn platform(&self) -> PlatformKind;
    /// Display name
    fn name(&self) -> String;
    /// Stable unique id, available once the node finished its interview
    fn unique_id(&self) -> Option<String>;
    /// Current state snapshot computed from the bound values
    fn state(&self) -> EntityState;
}

/// Factory resolving a value group to an entity
pub type PlatformFactory = fn(&FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>>;

/// Static mapping from platform kind to entity factory
pub struct PlatformRegistry {
    factories: HashMap<PlatformKind, PlatformFactory>,
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PlatformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in platforms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlatformKind::Switch, switch_factory);
        registry.register(PlatformKind::Light, dimmer_factory);
        registry.register(PlatformKind::BinarySensor, binary_sensor_factory);
        registry.register(PlatformKind::Sensor, sensor_factory);
        registry.register(PlatformKind::Lock, lock::lock_factory);
        registry.register(PlatformKind::Cover, cover_factory);
        registry.register(PlatformKind::Fan, fan_factory);
        registry.register(PlatformKind::Climate, climate_factory);
        registry
    }

    /// Register or replace a platform factory
    pub fn register(&mut self, kind: PlatformKind, factory: PlatformFactory) {
        self.factories.insert(kind, factory);
    }

    /// Resolve the factory for a platform
    pub fn resolve(&self, kind: PlatformKind) -> Option<PlatformFactory> {
        self.factories.get(&kind).copied()
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared fields of the built-in entities
pub(crate) struct EntityBase {
    pub(crate) platform: PlatformKind,
    pub(crate) node: Arc<ZwaveNode>,
    pub(crate) primary: Arc<ZwaveValue>,
    pub(crate) values: Arc<BoundValues>,
    pub(crate) config: DeviceEntityConfig,
}

impl EntityBase {
    pub(crate) fn from_context(platform: PlatformKind, ctx: &FactoryContext) -> Option<Self> {
        let primary = ctx.values.primary()?;
        Some(Self {
            platform,
            node: ctx.node.clone(),
            primary,
            values: ctx.values.clone(),
            config: ctx.config.clone(),
        })
    }

    pub(crate) fn name(&self) -> String {
        value_name(&self.node, &self.primary)
    }

    /// Unique id gate for the readiness wait: stable only once the node
    /// finished its interview.
    pub(crate) fn unique_id(&self) -> Option<String> {
        if self.node.is_ready() {
            Some(compute_value_unique_id(&self.node, &self.primary))
        } else {
            None
        }
    }
}

struct SwitchEntity {
    base: EntityBase,
}

impl ZwaveDeviceEntity for SwitchEntity {
    fn platform(&self) -> PlatformKind {
        self.base.platform
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        match self.base.primary.data() {
            Value::Bool(true) => EntityState::new(STATE_ON),
            Value::Bool(false) => EntityState::new(STATE_OFF),
            _ => EntityState::new(buslink_core::state::STATE_UNKNOWN),
        }
    }
}

fn switch_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Switch, ctx)?;
    Some(Arc::new(SwitchEntity { base }))
}

fn binary_sensor_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::BinarySensor, ctx)?;
    Some(Arc::new(SwitchEntity { base }))
}

struct SensorEntity {
    base: EntityBase,
}

impl ZwaveDeviceEntity for SensorEntity {
    fn platform(&self) -> PlatformKind {
        self.base.platform
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        let mut attributes = Metadata::new();
        if !self.base.primary.units.is_empty() {
            attributes.insert(
                "unit_of_measurement".to_string(),
                Value::String(self.base.primary.units.clone()),
            );
        }
        EntityState::with_attributes(self.base.primary.data(), attributes)
    }
}

fn sensor_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Sensor, ctx)?;
    Some(Arc::new(SensorEntity { base }))
}

struct DimmerEntity {
    base: EntityBase,
}

impl DimmerEntity {
    fn level(&self) -> i64 {
        match self.base.primary.data() {
            Value::Integer(level) => level,
            Value::Float(level) => level as i64,
            Value::Bool(true) => 99,
            _ => 0,
        }
    }
}

impl ZwaveDeviceEntity for DimmerEntity {
    fn platform(&self) -> PlatformKind {
        self.base.platform
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        // Multilevel devices report 0..=99
        let mut level = self.level().clamp(0, 99);
        if self.base.config.invert_percent {
            level = 99 - level;
        }
        let mut attributes = Metadata::new();
        attributes.insert("level".to_string(), Value::Integer(level));
        let state = if level > 0 { STATE_ON } else { STATE_OFF };
        EntityState::with_attributes(state, attributes)
    }
}

fn dimmer_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Light, ctx)?;
    Some(Arc::new(DimmerEntity { base }))
}

fn fan_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Fan, ctx)?;
    Some(Arc::new(DimmerEntity { base }))
}

struct CoverEntity {
    base: EntityBase,
}

impl ZwaveDeviceEntity for CoverEntity {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Cover
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        let quirk = workaround::resolve(&self.base.node, &self.base.primary);
        let position = match self.base.primary.data() {
            Value::Integer(level) => level.clamp(0, 99),
            _ => 0,
        };
        let mut attributes = Metadata::new();
        if quirk != Some(WorkaroundKind::NoPosition) {
            attributes.insert("current_position".to_string(), Value::Integer(position));
        }
        let inverted = self.base.config.invert_openclose_buttons
            ^ (quirk == Some(WorkaroundKind::ReverseOpenClose));
        attributes.insert("inverted_buttons".to_string(), Value::Bool(inverted));
        let state = if position > 0 { "open" } else { "closed" };
        EntityState::with_attributes(state, attributes)
    }
}

fn cover_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Cover, ctx)?;
    Some(Arc::new(CoverEntity { base }))
}

struct ClimateEntity {
    base: EntityBase,
}

impl ZwaveDeviceEntity for ClimateEntity {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Climate
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        let mut attributes = Metadata::new();
        if let Some(temperature) = self.base.values.get("temperature") {
            attributes.insert("current_temperature".to_string(), temperature.data());
        }
        EntityState::with_attributes(self.base.primary.data(), attributes)
    }
}

fn climate_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Climate, ctx)?;
    Some(Arc::new(ClimateEntity { base }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::{CommandClass, ValueGenre, ValueType};

    fn context(data: Value) -> FactoryContext {
        let node = ZwaveNode::new(3, "Office", "0x0086", "0x0003", "0x0060", 0x10, 0x00).unwrap();
        node.set_ready(true);
        let primary = ZwaveValue::new(
            42,
            CommandClass::SwitchBinary,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Switch",
            data,
        );
        let values = BoundValues::new();
        values.bind(crate::schema::PRIMARY, primary);
        FactoryContext {
            node,
            values,
            config: DeviceEntityConfig::default(),
        }
    }

    #[test]
    fn test_switch_entity_state() {
        let entity = switch_factory(&context(Value::Bool(true))).unwrap();
        assert_eq!(entity.platform(), PlatformKind::Switch);
        assert_eq!(entity.name(), "Office Switch");
        assert_eq!(entity.unique_id().as_deref(), Some("3-42"));
        assert_eq!(entity.state().state, Value::String(STATE_ON.to_string()));
    }

    #[test]
    fn test_unique_id_gated_on_readiness() {
        let ctx = context(Value::Bool(false));
        ctx.node.set_ready(false);
        let entity = switch_factory(&ctx).unwrap();
        assert_eq!(entity.unique_id(), None);
        ctx.node.set_ready(true);
        assert_eq!(entity.unique_id().as_deref(), Some("3-42"));
    }

    #[test]
    fn test_factory_requires_primary() {
        let node = ZwaveNode::new(3, "Office", "0x0086", "0x0003", "0x0060", 0x10, 0x00).unwrap();
        let ctx = FactoryContext {
            node,
            values: BoundValues::new(),
            config: DeviceEntityConfig::default(),
        };
        assert!(switch_factory(&ctx).is_none());
    }

    #[test]
    fn test_cover_device_quirks() {
        // Somfy ILT: no position attribute
        let node =
            ZwaveNode::new(4, "Blind", "0x0047", "0x5a52", "0x0000", 0x11, 0x03).unwrap();
        node.set_ready(true);
        let primary = ZwaveValue::new(
            60,
            CommandClass::SwitchMultilevel,
            0,
            1,
            ValueGenre::User,
            ValueType::Byte,
            "Level",
            Value::Integer(50),
        );
        let values = BoundValues::new();
        values.bind(crate::schema::PRIMARY, primary);
        let ctx = FactoryContext {
            node,
            values,
            config: DeviceEntityConfig::default(),
        };
        let entity = cover_factory(&ctx).unwrap();
        assert_eq!(entity.state().attribute("current_position"), None);

        // Fibaro FGRM-222: buttons are reversed out of the box
        let fibaro =
            ZwaveNode::new(5, "Shutter", "0x010f", "0x0301", "0x1001", 0x11, 0x03).unwrap();
        let ctx = FactoryContext {
            node: fibaro,
            values: ctx.values.clone(),
            config: DeviceEntityConfig::default(),
        };
        let entity = cover_factory(&ctx).unwrap();
        assert_eq!(
            entity.state().attribute("inverted_buttons"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_dimmer_invert_percent() {
        let ctx = context(Value::Integer(99));
        let inverted = FactoryContext {
            node: ctx.node.clone(),
            values: ctx.values.clone(),
            config: DeviceEntityConfig {
                invert_percent: true,
                ..Default::default()
            },
        };
        let entity = dimmer_factory(&inverted).unwrap();
        assert_eq!(
            entity.state().attribute("level"),
            Some(&Value::Integer(0))
        );
    }
}
