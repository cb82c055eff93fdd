/*!
 * Prelude module for buslink core.
 *
 * Re-exports commonly used types and functions to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{Id, Metadata, SharedValue, Value};

// Re-export event types
pub use crate::event::{EventBus, EventReceiver, SharedEventBus};

// Re-export the host-state model
pub use crate::state::{
    EntityAddedEvent, EntityState, StateChangedEvent, STATE_OFF, STATE_ON, STATE_UNAVAILABLE,
    STATE_UNKNOWN,
};

// Re-export config types
pub use crate::config::{Config, SharedConfig};

// Re-export utility functions
pub use crate::utils::{slugify, spawn_and_log, with_timeout};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
