/*!
 * BusLink Z-Wave
 *
 * This crate implements the Z-Wave side of the BusLink bridge: the node and
 * value model, discovery schemas with per-binding overlays, device-quirk
 * workaround tables, the entity binding engine, the network signal plumbing
 * and JSON management views.
 */

#![warn(missing_docs)]

// Re-export core types
pub use buslink_core::prelude;

pub mod api;
pub mod config;
pub mod entity_values;
pub mod error;
pub mod lock;
pub mod network;
pub mod platform;
pub mod schema;
pub mod signal;
pub mod value;
pub mod workaround;

// Re-export the types most integrations touch
pub use entity_values::{BindingState, EntityValues};
pub use error::{Result, ZwaveError};
pub use network::ZwaveNetwork;
pub use platform::{PlatformKind, ZwaveDeviceEntity};
pub use schema::{DiscoverySchema, SchemaOverlay};
pub use signal::{Signal, SignalBus};
pub use value::{CommandClass, ZwaveNode, ZwaveValue};

/// BusLink Z-Wave crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the Z-Wave subsystem
pub fn init() -> Result<()> {
    tracing::info!("BusLink Z-Wave {} initialized", VERSION);
    Ok(())
}
