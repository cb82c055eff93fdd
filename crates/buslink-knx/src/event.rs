/*!
 * Bus event surface.
 *
 * Telegrams matching the user's event filters are republished on the core
 * event bus so automations can react to raw group traffic. Enrichment is
 * fail-open: a payload the configured DPT cannot decode still produces an
 * event, just without a decoded value.
 */
use std::sync::Arc;

use tracing::warn;

use buslink_core::event::SharedEventBus;
use buslink_core::types::Value;

use crate::address::AddressFilter;
use crate::dispatcher::{telegram_callback, RegistrationHandle, TelegramDispatcher};
use crate::error::Result;
use crate::project::GroupObjectDirectory;
use crate::telegram::Telegram;

/// Event published for every telegram matching an event filter
#[derive(Debug, Clone)]
pub struct KnxEvent {
    /// Raw payload bytes, absent for read requests
    pub data: Option<Vec<u8>>,
    /// Destination group address in its display form
    pub destination: String,
    /// Project name of the destination group object, empty when unknown
    pub destination_name: String,
    /// "Incoming" or "Outgoing"
    pub direction: String,
    /// Decoded value, absent when no DPT is known or decoding failed
    pub value: Option<Value>,
    /// Source individual address in its display form
    pub source: String,
    /// Project name of the sending device, empty when unknown
    pub source_name: String,
    /// Payload type name
    pub telegramtype: String,
}

impl KnxEvent {
    /// Build an event from a telegram, enriching through the directory
    pub fn from_telegram(telegram: &Telegram, directory: &GroupObjectDirectory) -> Self {
        let object = directory.object(&telegram.destination);
        let value = match object.and_then(|info| info.transcoder.as_ref()) {
            Some(transcoder) => telegram.payload.raw().and_then(|raw| {
                match transcoder.from_knx(raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(
                            "Event for {} could not decode with DPT {}: {}",
                            telegram,
                            transcoder.dpt_id(),
                            e
                        );
                        None
                    }
                }
            }),
            None => None,
        };

        Self {
            data: telegram.payload.raw().map(|raw| raw.to_vec()),
            destination: telegram.destination.to_string(),
            destination_name: object.map(|info| info.name.clone()).unwrap_or_default(),
            direction: telegram.direction.to_string(),
            value,
            source: telegram.source.to_string(),
            source_name: directory
                .sender_name(telegram.source.raw())
                .unwrap_or_default()
                .to_string(),
            telegramtype: telegram.payload.telegram_type().to_string(),
        }
    }
}

/// Republishes matching telegrams as [`KnxEvent`]s on the core bus
pub struct EventRelay {
    events: SharedEventBus,
    directory: Arc<GroupObjectDirectory>,
}

impl std::fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRelay").finish()
    }
}

impl EventRelay {
    /// Create a relay publishing on the given bus
    pub fn new(events: SharedEventBus, directory: Arc<GroupObjectDirectory>) -> Arc<Self> {
        Arc::new(Self { events, directory })
    }

    /// Register on a dispatcher for the user's event filters.
    ///
    /// Sees outgoing telegrams too; events for traffic this integration sent
    /// are part of the contract.
    pub fn attach(
        self: &Arc<Self>,
        dispatcher: &TelegramDispatcher,
        filters: Vec<AddressFilter>,
    ) -> Result<RegistrationHandle> {
        let relay = Arc::clone(self);
        dispatcher.register(
            telegram_callback(move |telegram| {
                let relay = Arc::clone(&relay);
                async move {
                    let event = KnxEvent::from_telegram(&telegram, &relay.directory);
                    relay.events.publish(event)?;
                    Ok(())
                }
            }),
            filters,
            true,
        )
    }
}
