/*!
 * Per-entity device configuration.
 *
 * Users can tune or suppress individual entities by entity id; a domain-level
 * table ("all locks") provides the fallback when no exact entry exists.
 */
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceEntityConfig {
    /// Never create this entity
    pub ignored: bool,
    /// Poll intensity for the primary value, 0 = no polling
    pub polling_intensity: u32,
    /// Refresh the value after issuing a command
    pub refresh_value: bool,
    /// Seconds to wait before the refresh
    pub delay: u32,
    /// Swap the open and close buttons
    pub invert_openclose_buttons: bool,
    /// Invert reported percentages
    pub invert_percent: bool,
}

impl Default for DeviceEntityConfig {
    fn default() -> Self {
        Self {
            ignored: false,
            polling_intensity: 0,
            refresh_value: false,
            delay: 5,
            invert_openclose_buttons: false,
            invert_percent: false,
        }
    }
}

/// Lookup table for device entity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfigMap {
    /// Entries keyed by full entity id
    #[serde(default)]
    pub entities: HashMap<String, DeviceEntityConfig>,
    /// Entries keyed by entity domain (e.g. "lock")
    #[serde(default)]
    pub domains: HashMap<String, DeviceEntityConfig>,
}

impl DeviceConfigMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the configuration for an entity id.
    ///
    /// Exact entity entries win over domain entries; a double miss yields
    /// the defaults.
    pub fn lookup(&self, entity_id: &str) -> DeviceEntityConfig {
        if let Some(config) = self.entities.get(entity_id) {
            return config.clone();
        }
        if let Some(domain) = entity_id.split('.').next() {
            if let Some(config) = self.domains.get(domain) {
                return config.clone();
            }
        }
        DeviceEntityConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_precedence() {
        let mut map = DeviceConfigMap::new();
        map.domains.insert(
            "lock".to_string(),
            DeviceEntityConfig {
                polling_intensity: 2,
                ..Default::default()
            },
        );
        map.entities.insert(
            "lock.front_door".to_string(),
            DeviceEntityConfig {
                ignored: true,
                ..Default::default()
            },
        );

        assert!(map.lookup("lock.front_door").ignored);
        assert_eq!(map.lookup("lock.back_door").polling_intensity, 2);
        assert_eq!(map.lookup("switch.garage"), DeviceEntityConfig::default());
    }
}
