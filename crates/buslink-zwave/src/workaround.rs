/*!
 * Device workaround tables.
 *
 * Some devices deviate from the command class specs; these lookup tables
 * key behavioral overrides on the manufacturer/product identifiers parsed at
 * node construction. A miss is the overwhelmingly common case and never an
 * error.
 */
use crate::platform::PlatformKind;
use crate::value::{ZwaveNode, ZwaveValue};

/// Fibaro System
pub const FIBARO: u16 = 0x010f;
/// Philio Technology
pub const PHILIO: u16 = 0x013c;
/// Somfy
pub const SOMFY: u16 = 0x0047;
/// Wenzhou TKB Control System
pub const WENZHOU: u16 = 0x0118;
/// Leviton
pub const LEVITON: u16 = 0x001d;
/// GOAP (Qubino)
pub const GOAP: u16 = 0x0159;

/// Behavioral override for a quirky device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkaroundKind {
    /// Device never sends an off event; synthesize one
    NoOffEvent,
    /// Device cannot report a position
    NoPosition,
    /// Open and close are wired backwards
    ReverseOpenClose,
    /// Refresh the whole node when this value updates
    RefreshNodeOnUpdate,
}

/// Platform override outcome; `Ignore` is the only terminal no-entity
/// workaround
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformOverride {
    /// Bind the value group to this platform instead of the schema's
    Use(PlatformKind),
    /// Create no entity at all; terminal
    Ignore,
}

/// Fully-qualified workarounds: (manufacturer, product type, product id,
/// value index)
const WORKAROUNDS: &[((u16, u16, u16, u8), WorkaroundKind)] = &[
    // Philio slim multisensor never sends sensor off events
    ((PHILIO, 0x0002, 0x0002, 0), WorkaroundKind::NoOffEvent),
];

/// Coarse workarounds: (manufacturer, product type)
const WORKAROUNDS_COARSE: &[((u16, u16), WorkaroundKind)] = &[
    // Somfy ILT blinds report no position
    ((SOMFY, 0x5a52), WorkaroundKind::NoPosition),
    // TKB dimmers report stale values without a node refresh
    ((WENZHOU, 0x0177), WorkaroundKind::RefreshNodeOnUpdate),
    ((LEVITON, 0x3501), WorkaroundKind::RefreshNodeOnUpdate),
    // Fibaro FGRM-222 ships with reversed open/close
    ((FIBARO, 0x0301), WorkaroundKind::ReverseOpenClose),
];

/// Platform overrides: (manufacturer, product type)
const PLATFORM_OVERRIDES: &[((u16, u16), PlatformOverride)] = &[
    // Fibaro FGFS-101 flood sensor exposes its alarm as a binary sensor
    ((FIBARO, 0x0b00), PlatformOverride::Use(PlatformKind::BinarySensor)),
    ((WENZHOU, 0x0177), PlatformOverride::Use(PlatformKind::Light)),
];

/// Platform overrides keyed on the endpoint instance as well
const PLATFORM_OVERRIDES_INSTANCE: &[((u16, u16, u8), PlatformOverride)] = &[
    // Qubino flush shutter: endpoint 2 mirrors endpoint 1
    ((GOAP, 0x0003, 2), PlatformOverride::Ignore),
];

/// Resolve the behavioral workaround for a value.
///
/// The fully-qualified key wins; the coarse (manufacturer, product type) key
/// is the fallback.
pub fn resolve(node: &ZwaveNode, value: &ZwaveValue) -> Option<WorkaroundKind> {
    let full = (
        node.manufacturer_id,
        node.product_type,
        node.product_id,
        value.index,
    );
    if let Some((_, kind)) = WORKAROUNDS.iter().find(|(key, _)| *key == full) {
        return Some(*kind);
    }
    let coarse = (node.manufacturer_id, node.product_type);
    WORKAROUNDS_COARSE
        .iter()
        .find(|(key, _)| *key == coarse)
        .map(|(_, kind)| *kind)
}

/// Resolve the platform override for a value group's primary value
pub fn resolve_platform(node: &ZwaveNode, value: &ZwaveValue) -> Option<PlatformOverride> {
    let with_instance = (node.manufacturer_id, node.product_type, value.instance);
    if let Some((_, kind)) = PLATFORM_OVERRIDES_INSTANCE
        .iter()
        .find(|(key, _)| *key == with_instance)
    {
        return Some(*kind);
    }
    let coarse = (node.manufacturer_id, node.product_type);
    PLATFORM_OVERRIDES
        .iter()
        .find(|(key, _)| *key == coarse)
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use buslink_core::types::Value;

    use crate::value::{CommandClass, ValueGenre, ValueType};

    fn node(manufacturer: &str, product_type: &str, product_id: &str) -> Arc<ZwaveNode> {
        ZwaveNode::new(5, "Test", manufacturer, product_type, product_id, 0x20, 0x00).unwrap()
    }

    fn value(index: u8, instance: u8) -> Arc<ZwaveValue> {
        ZwaveValue::new(
            9,
            CommandClass::SensorBinary,
            index,
            instance,
            ValueGenre::User,
            ValueType::Bool,
            "Sensor",
            Value::Bool(false),
        )
    }

    #[test]
    fn test_fully_qualified_key_wins_over_coarse() {
        let philio = node("0x013c", "0x0002", "0x0002");
        assert_eq!(
            resolve(&philio, &value(0, 1)),
            Some(WorkaroundKind::NoOffEvent)
        );
        // Same product, different index: full key misses, no coarse entry
        assert_eq!(resolve(&philio, &value(3, 1)), None);
    }

    #[test]
    fn test_coarse_fallback() {
        let somfy = node("0x0047", "0x5a52", "0x0000");
        assert_eq!(resolve(&somfy, &value(0, 1)), Some(WorkaroundKind::NoPosition));
    }

    #[test]
    fn test_miss_is_the_common_case() {
        let plain = node("0x0086", "0x0003", "0x0060");
        assert_eq!(resolve(&plain, &value(0, 1)), None);
        assert_eq!(resolve_platform(&plain, &value(0, 1)), None);
    }

    #[test]
    fn test_platform_override_and_instance_ignore() {
        let fibaro = node("0x010f", "0x0b00", "0x1001");
        assert_eq!(
            resolve_platform(&fibaro, &value(0, 1)),
            Some(PlatformOverride::Use(PlatformKind::BinarySensor))
        );

        let qubino = node("0x0159", "0x0003", "0x0052");
        assert_eq!(
            resolve_platform(&qubino, &value(0, 2)),
            Some(PlatformOverride::Ignore)
        );
        assert_eq!(resolve_platform(&qubino, &value(0, 1)), None);
    }
}
