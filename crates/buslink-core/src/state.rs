/*!
 * Host entity-state model.
 *
 * The protocol pipelines do not own the host's state machine; they only
 * exchange state snapshots with it. A device update becomes a
 * [`StateChangedEvent`] published on the event bus, and the KNX exposure
 * engine consumes the same events in the opposite direction.
 */
use crate::types::{Metadata, Value};

/// State string for a binary entity that is on
pub const STATE_ON: &str = "on";
/// State string for a binary entity that is off
pub const STATE_OFF: &str = "off";
/// State string for an entity whose state is not known yet
pub const STATE_UNKNOWN: &str = "unknown";
/// State string for an entity whose backing device is unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// A snapshot of one entity's state plus its attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityState {
    /// The primary state value
    pub state: Value,
    /// Additional entity attributes
    pub attributes: Metadata,
}

impl EntityState {
    /// Create a state snapshot with no attributes
    pub fn new<V: Into<Value>>(state: V) -> Self {
        Self {
            state: state.into(),
            attributes: Metadata::new(),
        }
    }

    /// Create a state snapshot with attributes
    pub fn with_attributes<V: Into<Value>>(state: V, attributes: Metadata) -> Self {
        Self {
            state: state.into(),
            attributes,
        }
    }

    /// Get an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Whether the state carries a usable value.
    ///
    /// `unknown` and `unavailable` states are placeholders and must never be
    /// mirrored onto a bus.
    pub fn is_usable(&self) -> bool {
        match &self.state {
            Value::Null => false,
            Value::String(s) => s != STATE_UNKNOWN && s != STATE_UNAVAILABLE,
            _ => true,
        }
    }
}

/// Event published whenever an entity's state or attributes change
#[derive(Debug, Clone)]
pub struct StateChangedEvent {
    /// The entity whose state changed
    pub entity_id: String,
    /// The previous state, if the entity existed before
    pub old_state: Option<EntityState>,
    /// The new state, absent when the entity was removed
    pub new_state: Option<EntityState>,
}

/// Event published when a protocol pipeline creates a new entity
#[derive(Debug, Clone)]
pub struct EntityAddedEvent {
    /// The platform the entity belongs to (e.g. "switch", "lock")
    pub platform: String,
    /// The generated entity id
    pub entity_id: String,
    /// The stable unique id, when the device reported one
    pub unique_id: Option<String>,
}
