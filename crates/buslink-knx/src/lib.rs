/*!
 * BusLink KNX
 *
 * This crate implements the KNX side of the BusLink bridge: group address
 * parsing and filtering, DPT transcoding, telegram dispatch, device/entity
 * binding, the exposure engine and the user-facing bus services.
 */

#![warn(missing_docs)]

// Re-export core types
pub use buslink_core::prelude;

pub mod address;
pub mod device;
pub mod dispatcher;
pub mod dpt;
pub mod error;
pub mod event;
pub mod expose;
pub mod history;
pub mod project;
pub mod service;
pub mod telegram;
pub mod transport;

// Re-export the types most integrations touch
pub use address::{AddressFilter, GroupAddress, IndividualAddress};
pub use device::{GroupDevice, KnxEntity};
pub use dispatcher::TelegramDispatcher;
pub use dpt::{DptTranscoder, TranscoderRegistry};
pub use error::{KnxError, Result};
pub use telegram::{Telegram, TelegramDirection, TelegramPayload};

/// BusLink KNX crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the KNX subsystem
pub fn init() -> Result<()> {
    tracing::info!("BusLink KNX {} initialized", VERSION);
    Ok(())
}
