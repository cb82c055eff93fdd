/*!
 * Z-Wave value and node model.
 *
 * A node is a physical device; its values arrive asynchronously as the
 * network interviews it. Values are shared, interior-mutable objects: the
 * network layer updates `data` in place and fires a value-changed signal,
 * while bound entities read through the same handle.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use buslink_core::types::Value;

use crate::error::{Result, ZwaveError};

/// Command classes the discovery schemas care about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandClass {
    /// Binary switch
    SwitchBinary = 0x25,
    /// Multilevel switch (dimmers, shades, fans)
    SwitchMultilevel = 0x26,
    /// Binary sensor
    SensorBinary = 0x30,
    /// Multilevel sensor
    SensorMultilevel = 0x31,
    /// Metering
    Meter = 0x32,
    /// Thermostat setpoint
    ThermostatSetpoint = 0x43,
    /// Door lock
    DoorLock = 0x62,
    /// User codes
    UserCode = 0x63,
    /// Device configuration parameters
    Configuration = 0x70,
    /// Alarm / notification
    Alarm = 0x71,
    /// Battery level
    Battery = 0x80,
    /// Association groups
    Association = 0x85,
}

impl CommandClass {
    /// Map a raw command class byte; unknown classes are not modeled
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x25 => Some(CommandClass::SwitchBinary),
            0x26 => Some(CommandClass::SwitchMultilevel),
            0x30 => Some(CommandClass::SensorBinary),
            0x31 => Some(CommandClass::SensorMultilevel),
            0x32 => Some(CommandClass::Meter),
            0x43 => Some(CommandClass::ThermostatSetpoint),
            0x62 => Some(CommandClass::DoorLock),
            0x63 => Some(CommandClass::UserCode),
            0x70 => Some(CommandClass::Configuration),
            0x71 => Some(CommandClass::Alarm),
            0x80 => Some(CommandClass::Battery),
            0x85 => Some(CommandClass::Association),
            _ => None,
        }
    }

    /// The raw command class byte
    pub fn raw(&self) -> u8 {
        *self as u8
    }
}

/// Which audience a value is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueGenre {
    /// User-facing values, the only genre exposed as entities by default
    User,
    /// Configuration parameters
    Config,
    /// System internals
    System,
    /// Basic command class mirror
    Basic,
}

/// The wire type of a value's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean
    Bool,
    /// Unsigned byte
    Byte,
    /// Decimal number
    Decimal,
    /// Signed integer
    Int,
    /// Selection from a list of strings
    List,
    /// 16-bit integer
    Short,
    /// Free-form string
    String,
    /// Momentary button
    Button,
    /// Raw bytes
    Raw,
}

/// One value reported by a node
pub struct ZwaveValue {
    /// Network-wide value identifier
    pub value_id: u64,
    /// The command class the value belongs to
    pub command_class: CommandClass,
    /// Index within the command class
    pub index: u8,
    /// Endpoint instance, 1-based
    pub instance: u8,
    /// Value genre
    pub genre: ValueGenre,
    /// Data type
    pub value_type: ValueType,
    /// Human-readable label from the device database
    pub label: String,
    /// Unit string, empty when unitless
    pub units: String,
    /// Possible values for list-typed values
    pub data_items: Option<Vec<String>>,
    data: RwLock<Value>,
    poll_intensity: AtomicU32,
}

impl std::fmt::Debug for ZwaveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZwaveValue")
            .field("value_id", &self.value_id)
            .field("command_class", &self.command_class)
            .field("index", &self.index)
            .field("instance", &self.instance)
            .field("label", &self.label)
            .finish()
    }
}

impl ZwaveValue {
    /// Create a value with initial data
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        value_id: u64,
        command_class: CommandClass,
        index: u8,
        instance: u8,
        genre: ValueGenre,
        value_type: ValueType,
        label: impl Into<String>,
        data: Value,
    ) -> Arc<Self> {
        Arc::new(Self {
            value_id,
            command_class,
            index,
            instance,
            genre,
            value_type,
            label: label.into(),
            units: String::new(),
            data_items: None,
            data: RwLock::new(data),
            poll_intensity: AtomicU32::new(0),
        })
    }

    /// Current data snapshot
    pub fn data(&self) -> Value {
        self.data.read().map(|d| d.clone()).unwrap_or(Value::Null)
    }

    /// Replace the data in place; the caller fires the value-changed signal
    pub fn set_data(&self, data: Value) {
        if let Ok(mut slot) = self.data.write() {
            *slot = data;
        }
    }

    /// Enable polling for this value
    pub fn enable_poll(&self, intensity: u32) {
        self.poll_intensity.store(intensity, Ordering::Relaxed);
    }

    /// The configured poll intensity, 0 when polling is off
    pub fn poll_intensity(&self) -> u32 {
        self.poll_intensity.load(Ordering::Relaxed)
    }
}

/// Parse a manufacturer/product identifier from its hex string form.
///
/// The device database reports these as strings like `"0x010f"`; they are
/// parsed exactly once, when the node object is built.
pub fn parse_hex_id(raw: &str) -> Result<u16> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16)
        .map_err(|_| ZwaveError::id_format(format!("'{}' is not a hex identifier", raw)))
}

/// One physical device on the network
pub struct ZwaveNode {
    /// Network node identifier
    pub node_id: u8,
    /// Node name from the device database or user config
    pub name: String,
    /// Manufacturer identifier
    pub manufacturer_id: u16,
    /// Product type identifier
    pub product_type: u16,
    /// Product identifier
    pub product_id: u16,
    /// Generic device class
    pub generic: u8,
    /// Specific device class
    pub specific: u8,
    values: RwLock<HashMap<u64, Arc<ZwaveValue>>>,
    ready: AtomicBool,
}

impl std::fmt::Debug for ZwaveNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZwaveNode")
            .field("node_id", &self.node_id)
            .field("name", &self.name)
            .field("manufacturer_id", &self.manufacturer_id)
            .field("product_type", &self.product_type)
            .field("product_id", &self.product_id)
            .finish()
    }
}

impl ZwaveNode {
    /// Build a node from interview data; identifiers are hex strings
    pub fn new(
        node_id: u8,
        name: impl Into<String>,
        manufacturer_id: &str,
        product_type: &str,
        product_id: &str,
        generic: u8,
        specific: u8,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            node_id,
            name: name.into(),
            manufacturer_id: parse_hex_id(manufacturer_id)?,
            product_type: parse_hex_id(product_type)?,
            product_id: parse_hex_id(product_id)?,
            generic,
            specific,
            values: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
        }))
    }

    /// Add or replace a value on this node
    pub fn add_value(&self, value: Arc<ZwaveValue>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(value.value_id, value);
        }
    }

    /// Remove a value by id
    pub fn remove_value(&self, value_id: u64) {
        if let Ok(mut values) = self.values.write() {
            values.remove(&value_id);
        }
    }

    /// Look up a value by id
    pub fn value(&self, value_id: u64) -> Option<Arc<ZwaveValue>> {
        self.values.read().ok()?.get(&value_id).cloned()
    }

    /// Snapshot of all current values
    pub fn values(&self) -> Vec<Arc<ZwaveValue>> {
        self.values
            .read()
            .map(|values| values.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the interview finished and the node reported ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Mark the node ready
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

/// The unique id a value gets once its node can provide a stable one
pub fn compute_value_unique_id(node: &ZwaveNode, value: &ZwaveValue) -> String {
    format!("{}-{}", node.node_id, value.value_id)
}

/// Display name for a value: node name plus value label
pub fn value_name(node: &ZwaveNode, value: &ZwaveValue) -> String {
    format!("{} {}", node.name, value.label).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Arc<ZwaveNode> {
        ZwaveNode::new(7, "Front Door", "0x003B", "0x6341", "0x5044", 0x40, 0x03).unwrap()
    }

    #[test]
    fn test_hex_ids_parsed_once_at_construction() {
        let node = node();
        assert_eq!(node.manufacturer_id, 0x003b);
        assert_eq!(node.product_type, 0x6341);
        assert_eq!(node.product_id, 0x5044);

        assert!(ZwaveNode::new(7, "Bad", "garbage", "0x0", "0x0", 0, 0).is_err());
        assert_eq!(parse_hex_id("010f").unwrap(), 0x010f);
    }

    #[test]
    fn test_command_class_round_trip() {
        for raw in [0x25u8, 0x26, 0x30, 0x31, 0x32, 0x43, 0x62, 0x63, 0x70, 0x71, 0x80, 0x85] {
            let cc = CommandClass::from_raw(raw).unwrap();
            assert_eq!(cc.raw(), raw);
        }
        assert_eq!(CommandClass::from_raw(0x99), None);
    }

    #[test]
    fn test_value_data_and_unique_id() {
        let node = node();
        let value = ZwaveValue::new(
            72057594,
            CommandClass::DoorLock,
            0,
            1,
            ValueGenre::User,
            ValueType::Bool,
            "Locked",
            Value::Bool(false),
        );
        node.add_value(value.clone());

        value.set_data(Value::Bool(true));
        assert_eq!(node.value(72057594).unwrap().data(), Value::Bool(true));

        assert_eq!(compute_value_unique_id(&node, &value), "7-72057594");
        assert_eq!(value_name(&node, &value), "Front Door Locked");
    }
}
