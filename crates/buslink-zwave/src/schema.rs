/*!
 * Discovery schemas and the pure matcher functions.
 *
 * A discovery schema declares which platform a value belongs to and which
 * named value slots an entity of that platform needs. Matching is pure: the
 * same node/value/schema always gives the same answer. Schema templates are
 * immutable; per-binding narrowing (this node, this endpoint instance) lives
 * in a separate overlay so templates can be shared between collectors.
 */
use std::collections::HashMap;

use crate::platform::PlatformKind;
use crate::value::{CommandClass, ValueGenre, ValueType, ZwaveNode, ZwaveValue};

/// Name of the slot every schema requires
pub const PRIMARY: &str = "primary";

/// Generic device class: binary switch
pub const GENERIC_TYPE_SWITCH_BINARY: u8 = 0x10;
/// Generic device class: multilevel switch
pub const GENERIC_TYPE_SWITCH_MULTILEVEL: u8 = 0x11;
/// Generic device class: entry control (locks)
pub const GENERIC_TYPE_ENTRY_CONTROL: u8 = 0x40;
/// Generic device class: thermostat
pub const GENERIC_TYPE_THERMOSTAT: u8 = 0x08;

/// Specific device class: not used / unspecified
pub const SPECIFIC_TYPE_NOT_USED: u8 = 0x00;
/// Specific device class: multilevel power switch
pub const SPECIFIC_TYPE_POWER_SWITCH_MULTILEVEL: u8 = 0x01;
/// Specific device class: multiposition motor
pub const SPECIFIC_TYPE_MOTOR_MULTIPOSITION: u8 = 0x03;
/// Specific device class: multilevel scene switch
pub const SPECIFIC_TYPE_SCENE_SWITCH_MULTILEVEL: u8 = 0x04;
/// Specific device class: class A motor control
pub const SPECIFIC_TYPE_CLASS_A_MOTOR_CONTROL: u8 = 0x05;
/// Specific device class: class B motor control
pub const SPECIFIC_TYPE_CLASS_B_MOTOR_CONTROL: u8 = 0x06;
/// Specific device class: class C motor control
pub const SPECIFIC_TYPE_CLASS_C_MOTOR_CONTROL: u8 = 0x07;
/// Specific device class: fan switch
pub const SPECIFIC_TYPE_FAN_SWITCH: u8 = 0x08;
/// Specific device class: door lock
pub const SPECIFIC_TYPE_DOOR_LOCK: u8 = 0x01;
/// Specific device class: advanced door lock
pub const SPECIFIC_TYPE_ADVANCED_DOOR_LOCK: u8 = 0x02;
/// Specific device class: secure keypad door lock
pub const SPECIFIC_TYPE_SECURE_KEYPAD_DOOR_LOCK: u8 = 0x03;

/// Alarm command class index carrying the alarm type
pub const INDEX_ALARM_TYPE: u8 = 0;
/// Alarm command class index carrying the alarm level
pub const INDEX_ALARM_LEVEL: u8 = 1;
/// Alarm command class index for access control notifications
pub const INDEX_ALARM_ACCESS_CONTROL: u8 = 9;

/// Allow-list predicate for one value slot.
///
/// Every populated field must match (AND semantics); an absent field matches
/// anything.
#[derive(Debug, Clone, Default)]
pub struct ValueSchema {
    /// Accepted command classes
    pub command_class: Option<Vec<CommandClass>>,
    /// Accepted value indexes
    pub index: Option<Vec<u8>>,
    /// Accepted data types
    pub value_type: Option<Vec<ValueType>>,
    /// Accepted genres
    pub genre: Option<Vec<ValueGenre>>,
    /// Accepted endpoint instances
    pub instance: Option<Vec<u8>>,
    /// Whether the slot may stay unfilled
    pub optional: bool,
}

/// Declarative description of one discoverable entity kind
#[derive(Debug, Clone)]
pub struct DiscoverySchema {
    /// The platform an entity of this schema belongs to
    pub platform: PlatformKind,
    /// Accepted generic device classes, absent = any
    pub generic_device_class: Option<Vec<u8>>,
    /// Accepted specific device classes, absent = any
    pub specific_device_class: Option<Vec<u8>>,
    /// Named value slots; `primary` is always present and required
    pub values: HashMap<&'static str, ValueSchema>,
}

/// Per-binding narrowing applied on top of an immutable schema template.
///
/// Built when a collector is created: the collector only accepts values from
/// its own node and endpoint instance.
#[derive(Debug, Clone, Default)]
pub struct SchemaOverlay {
    /// Accepted node ids, absent = any
    pub node_ids: Option<Vec<u8>>,
    /// Accepted endpoint instances, absent = any
    pub instances: Option<Vec<u8>>,
}

impl SchemaOverlay {
    /// Overlay pinning one node and one endpoint instance
    pub fn for_binding(node_id: u8, instance: u8) -> Self {
        Self {
            node_ids: Some(vec![node_id]),
            instances: Some(vec![instance]),
        }
    }
}

fn allows<T: PartialEq>(allowed: &Option<Vec<T>>, actual: &T) -> bool {
    match allowed {
        Some(allowed) => allowed.contains(actual),
        None => true,
    }
}

/// Check whether a node matches a schema's node-level constraints
pub fn check_node_schema(node: &ZwaveNode, schema: &DiscoverySchema, overlay: &SchemaOverlay) -> bool {
    allows(&overlay.node_ids, &node.node_id)
        && allows(&schema.generic_device_class, &node.generic)
        && allows(&schema.specific_device_class, &node.specific)
}

/// Check whether a value matches one slot's constraints
pub fn check_value_schema(value: &ZwaveValue, schema: &ValueSchema, overlay: &SchemaOverlay) -> bool {
    allows(&schema.command_class, &value.command_class)
        && allows(&schema.index, &value.index)
        && allows(&schema.value_type, &value.value_type)
        && allows(&schema.genre, &value.genre)
        && allows(&schema.instance, &value.instance)
        && allows(&overlay.instances, &value.instance)
}

fn slot(
    command_class: &[CommandClass],
    index: Option<Vec<u8>>,
    value_type: Option<Vec<ValueType>>,
    genre: Option<Vec<ValueGenre>>,
    optional: bool,
) -> ValueSchema {
    ValueSchema {
        command_class: Some(command_class.to_vec()),
        index,
        value_type,
        genre,
        instance: None,
        optional,
    }
}

/// The built-in discovery schemas
pub fn discovery_schemas() -> Vec<DiscoverySchema> {
    vec![
        DiscoverySchema {
            platform: PlatformKind::Switch,
            generic_device_class: None,
            specific_device_class: None,
            values: HashMap::from([(
                PRIMARY,
                slot(
                    &[CommandClass::SwitchBinary],
                    Some(vec![0]),
                    Some(vec![ValueType::Bool]),
                    Some(vec![ValueGenre::User]),
                    false,
                ),
            )]),
        },
        DiscoverySchema {
            platform: PlatformKind::Light,
            generic_device_class: Some(vec![GENERIC_TYPE_SWITCH_MULTILEVEL]),
            specific_device_class: Some(vec![
                SPECIFIC_TYPE_NOT_USED,
                SPECIFIC_TYPE_POWER_SWITCH_MULTILEVEL,
                SPECIFIC_TYPE_SCENE_SWITCH_MULTILEVEL,
            ]),
            values: HashMap::from([
                (
                    PRIMARY,
                    slot(
                        &[CommandClass::SwitchMultilevel],
                        Some(vec![0]),
                        Some(vec![ValueType::Byte]),
                        Some(vec![ValueGenre::User]),
                        false,
                    ),
                ),
                (
                    "dimming_duration",
                    slot(&[CommandClass::SwitchMultilevel], Some(vec![5]), None, None, true),
                ),
            ]),
        },
        DiscoverySchema {
            platform: PlatformKind::BinarySensor,
            generic_device_class: None,
            specific_device_class: None,
            values: HashMap::from([(
                PRIMARY,
                slot(
                    &[CommandClass::SensorBinary],
                    None,
                    Some(vec![ValueType::Bool]),
                    Some(vec![ValueGenre::User]),
                    false,
                ),
            )]),
        },
        DiscoverySchema {
            platform: PlatformKind::Sensor,
            generic_device_class: None,
            specific_device_class: None,
            values: HashMap::from([(
                PRIMARY,
                slot(
                    &[
                        CommandClass::SensorMultilevel,
                        CommandClass::Meter,
                        CommandClass::Battery,
                    ],
                    None,
                    None,
                    Some(vec![ValueGenre::User]),
                    false,
                ),
            )]),
        },
        DiscoverySchema {
            platform: PlatformKind::Lock,
            generic_device_class: Some(vec![GENERIC_TYPE_ENTRY_CONTROL]),
            specific_device_class: Some(vec![
                SPECIFIC_TYPE_DOOR_LOCK,
                SPECIFIC_TYPE_ADVANCED_DOOR_LOCK,
                SPECIFIC_TYPE_SECURE_KEYPAD_DOOR_LOCK,
            ]),
            values: HashMap::from([
                (
                    PRIMARY,
                    slot(
                        &[CommandClass::DoorLock],
                        Some(vec![0]),
                        Some(vec![ValueType::Bool]),
                        Some(vec![ValueGenre::User]),
                        false,
                    ),
                ),
                (
                    "access_control",
                    slot(
                        &[CommandClass::Alarm],
                        Some(vec![INDEX_ALARM_ACCESS_CONTROL]),
                        None,
                        None,
                        true,
                    ),
                ),
                (
                    "alarm_type",
                    slot(&[CommandClass::Alarm], Some(vec![INDEX_ALARM_TYPE]), None, None, true),
                ),
                (
                    "alarm_level",
                    slot(&[CommandClass::Alarm], Some(vec![INDEX_ALARM_LEVEL]), None, None, true),
                ),
            ]),
        },
        DiscoverySchema {
            platform: PlatformKind::Cover,
            generic_device_class: Some(vec![GENERIC_TYPE_SWITCH_MULTILEVEL]),
            specific_device_class: Some(vec![
                SPECIFIC_TYPE_MOTOR_MULTIPOSITION,
                SPECIFIC_TYPE_CLASS_A_MOTOR_CONTROL,
                SPECIFIC_TYPE_CLASS_B_MOTOR_CONTROL,
                SPECIFIC_TYPE_CLASS_C_MOTOR_CONTROL,
            ]),
            values: HashMap::from([
                (
                    PRIMARY,
                    slot(
                        &[CommandClass::SwitchMultilevel],
                        Some(vec![0]),
                        None,
                        Some(vec![ValueGenre::User]),
                        false,
                    ),
                ),
                (
                    "open",
                    slot(&[CommandClass::SwitchMultilevel], Some(vec![1]), None, None, true),
                ),
                (
                    "close",
                    slot(&[CommandClass::SwitchMultilevel], Some(vec![2]), None, None, true),
                ),
            ]),
        },
        DiscoverySchema {
            platform: PlatformKind::Fan,
            generic_device_class: Some(vec![GENERIC_TYPE_SWITCH_MULTILEVEL]),
            specific_device_class: Some(vec![SPECIFIC_TYPE_FAN_SWITCH]),
            values: HashMap::from([(
                PRIMARY,
                slot(
                    &[CommandClass::SwitchMultilevel],
                    Some(vec![0]),
                    Some(vec![ValueType::Byte]),
                    Some(vec![ValueGenre::User]),
                    false,
                ),
            )]),
        },
        DiscoverySchema {
            platform: PlatformKind::Climate,
            generic_device_class: Some(vec![GENERIC_TYPE_THERMOSTAT]),
            specific_device_class: None,
            values: HashMap::from([
                (
                    PRIMARY,
                    slot(
                        &[CommandClass::ThermostatSetpoint],
                        None,
                        None,
                        Some(vec![ValueGenre::User]),
                        false,
                    ),
                ),
                (
                    "temperature",
                    slot(&[CommandClass::SensorMultilevel], Some(vec![1]), None, None, true),
                ),
            ]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use buslink_core::types::Value;

    fn lock_node() -> Arc<ZwaveNode> {
        ZwaveNode::new(
            7,
            "Front Door",
            "0x003B",
            "0x6341",
            "0x5044",
            GENERIC_TYPE_ENTRY_CONTROL,
            SPECIFIC_TYPE_SECURE_KEYPAD_DOOR_LOCK,
        )
        .unwrap()
    }

    fn lock_value(instance: u8) -> Arc<ZwaveValue> {
        ZwaveValue::new(
            1001,
            CommandClass::DoorLock,
            0,
            instance,
            ValueGenre::User,
            ValueType::Bool,
            "Locked",
            Value::Bool(false),
        )
    }

    fn schema_for(kind: PlatformKind) -> DiscoverySchema {
        discovery_schemas()
            .into_iter()
            .find(|schema| schema.platform == kind)
            .unwrap()
    }

    #[test]
    fn test_node_schema_matching() {
        let schema = schema_for(PlatformKind::Lock);
        let node = lock_node();
        assert!(check_node_schema(&node, &schema, &SchemaOverlay::default()));

        // Wrong device class
        let plain = ZwaveNode::new(8, "Plug", "0x0086", "0x0003", "0x0060", 0x10, 0x00).unwrap();
        assert!(!check_node_schema(&plain, &schema, &SchemaOverlay::default()));

        // Overlay pins the node id
        let overlay = SchemaOverlay::for_binding(9, 1);
        assert!(!check_node_schema(&node, &schema, &overlay));
    }

    #[test]
    fn test_value_schema_and_semantics() {
        let schema = schema_for(PlatformKind::Lock);
        let primary = schema.values.get(PRIMARY).unwrap();
        let overlay = SchemaOverlay::for_binding(7, 1);

        assert!(check_value_schema(&lock_value(1), primary, &overlay));
        // Instance outside the overlay fails even though the template allows it
        assert!(!check_value_schema(&lock_value(2), primary, &overlay));

        // Wrong index fails a populated allow-list
        let alarm = ZwaveValue::new(
            1002,
            CommandClass::Alarm,
            INDEX_ALARM_LEVEL,
            1,
            ValueGenre::User,
            ValueType::Byte,
            "Alarm Level",
            Value::Integer(0),
        );
        assert!(!check_value_schema(
            &alarm,
            schema.values.get("alarm_type").unwrap(),
            &overlay
        ));
        assert!(check_value_schema(
            &alarm,
            schema.values.get("alarm_level").unwrap(),
            &overlay
        ));
    }

    #[test]
    fn test_matching_is_pure() {
        let schema = schema_for(PlatformKind::Lock);
        let node = lock_node();
        let value = lock_value(1);
        let overlay = SchemaOverlay::for_binding(7, 1);

        for _ in 0..3 {
            assert!(check_node_schema(&node, &schema, &overlay));
            assert!(check_value_schema(&value, schema.values.get(PRIMARY).unwrap(), &overlay));
        }
    }

    #[test]
    fn test_every_schema_has_a_required_primary() {
        for schema in discovery_schemas() {
            let primary = schema.values.get(PRIMARY).expect("schema without primary");
            assert!(!primary.optional);
        }
    }
}
