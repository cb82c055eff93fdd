/*!
 * KNX device objects and the entity update-callback binding.
 *
 * A group device owns its group addresses, a DPT codec and the last decoded
 * value, plus an explicit observer list. Every observer runs before a
 * mutation returns, so the entity's observable state is always consistent
 * with the device by the time the caller resumes.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use buslink_core::event::SharedEventBus;
use buslink_core::state::{EntityState, StateChangedEvent};
use buslink_core::types::Value;

use crate::address::GroupAddress;
use crate::dpt::DptTranscoder;
use crate::error::{KnxError, Result};
use crate::telegram::{Telegram, TelegramPayload};
use crate::transport::GroupWriter;

/// Callback invoked with the device's decoded value after every update
pub type DeviceObserver = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle for one registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// A device bound to one group address (plus an optional state address)
pub struct GroupDevice {
    name: String,
    group_address: GroupAddress,
    state_address: Option<GroupAddress>,
    transcoder: Option<Arc<dyn DptTranscoder>>,
    value: Mutex<Value>,
    observers: Mutex<Vec<(u64, DeviceObserver)>>,
    next_observer_id: AtomicU64,
}

impl std::fmt::Debug for GroupDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupDevice")
            .field("name", &self.name)
            .field("group_address", &self.group_address)
            .field("state_address", &self.state_address)
            .finish()
    }
}

impl GroupDevice {
    /// Create a new group device
    pub fn new(
        name: impl Into<String>,
        group_address: GroupAddress,
        state_address: Option<GroupAddress>,
        transcoder: Option<Arc<dyn DptTranscoder>>,
    ) -> Self {
        Self {
            name: name.into(),
            group_address,
            state_address,
            transcoder,
            value: Mutex::new(Value::Null),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    /// The device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The addresses this device listens on
    pub fn addresses(&self) -> Vec<GroupAddress> {
        let mut addresses = vec![self.group_address.clone()];
        if let Some(state_address) = &self.state_address {
            addresses.push(state_address.clone());
        }
        addresses
    }

    /// The last decoded value
    pub fn value(&self) -> Value {
        self.value.lock().map(|v| v.clone()).unwrap_or(Value::Null)
    }

    /// Register an update callback; it fires after every successful mutation
    pub fn register_update_callback(&self, observer: DeviceObserver) -> ObserverHandle {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.observers.lock() {
            observers.push((id, observer));
        }
        ObserverHandle(id)
    }

    /// Remove an update callback
    pub fn unregister_update_callback(&self, handle: ObserverHandle) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|(id, _)| *id != handle.0);
        }
    }

    fn notify(&self, value: &Value) {
        let observers: Vec<DeviceObserver> = match self.observers.lock() {
            Ok(observers) => observers.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return,
        };
        for observer in observers {
            observer(value);
        }
    }

    fn store_and_notify(&self, value: Value) {
        if let Ok(mut stored) = self.value.lock() {
            *stored = value.clone();
        }
        self.notify(&value);
    }

    /// Apply a telegram to this device.
    ///
    /// Returns true when the telegram was addressed to this device. A decode
    /// failure is logged and stored as a null value; the update callbacks
    /// still fire so the entity can reflect the unknown state.
    pub fn process(&self, telegram: &Telegram) -> bool {
        let for_us = telegram.destination == self.group_address
            || self
                .state_address
                .as_ref()
                .map(|state| *state == telegram.destination)
                .unwrap_or(false);
        if !for_us {
            return false;
        }

        let raw = match telegram.payload.raw() {
            Some(raw) => raw,
            // Read requests carry no state for us to absorb
            None => return true,
        };

        let value = match &self.transcoder {
            Some(transcoder) => match transcoder.from_knx(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        "Device '{}' could not decode {} with DPT {}: {}",
                        self.name,
                        telegram,
                        transcoder.dpt_id(),
                        e
                    );
                    Value::Null
                }
            },
            None => Value::Binary(raw.to_vec()),
        };

        debug!("Device '{}' updated from {}", self.name, telegram);
        self.store_and_notify(value);
        true
    }

    /// Encode a value and send it to the device's group address.
    ///
    /// The local value and the observers are only updated after the write
    /// succeeds.
    pub async fn set(&self, value: Value, writer: &dyn GroupWriter) -> Result<()> {
        let raw = match &self.transcoder {
            Some(transcoder) => transcoder.to_knx(&value)?,
            None => match &value {
                Value::Binary(bytes) => bytes::Bytes::from(bytes.clone()),
                other => {
                    return Err(KnxError::conversion(format!(
                        "Device '{}' has no DPT and cannot encode {:?}",
                        self.name, other
                    )))
                }
            },
        };

        // The transport stamps the real source address on the wire
        let telegram = Telegram::outgoing(
            crate::address::IndividualAddress::from_raw(0),
            self.group_address.clone(),
            TelegramPayload::GroupValueWrite(raw),
        );
        writer.send(telegram).await?;

        self.store_and_notify(value);
        Ok(())
    }
}

/// A climate device with an independent mode child object.
///
/// The mode child has its own callback slot; entity wrappers must register
/// and unregister on both in lockstep, which this type enforces.
#[derive(Debug)]
pub struct ClimateModeDevice {
    primary: Arc<GroupDevice>,
    mode: Arc<GroupDevice>,
}

/// Paired observer handles for a climate device and its mode child
#[derive(Debug, Clone, Copy)]
pub struct ClimateObserverHandle {
    primary: ObserverHandle,
    mode: ObserverHandle,
}

impl ClimateModeDevice {
    /// Create a climate device from its setpoint and mode children
    pub fn new(primary: Arc<GroupDevice>, mode: Arc<GroupDevice>) -> Self {
        Self { primary, mode }
    }

    /// The setpoint device
    pub fn primary(&self) -> &Arc<GroupDevice> {
        &self.primary
    }

    /// The mode child device
    pub fn mode(&self) -> &Arc<GroupDevice> {
        &self.mode
    }

    /// Register one observer on both children in lockstep
    pub fn register_update_callback(&self, observer: DeviceObserver) -> ClimateObserverHandle {
        ClimateObserverHandle {
            primary: self.primary.register_update_callback(observer.clone()),
            mode: self.mode.register_update_callback(observer),
        }
    }

    /// Unregister from both children in lockstep
    pub fn unregister_update_callback(&self, handle: ClimateObserverHandle) {
        self.primary.unregister_update_callback(handle.primary);
        self.mode.unregister_update_callback(handle.mode);
    }
}

/// Entity wrapper around exactly one group device.
///
/// Registers itself as an observer when added and forwards every device
/// update into the host state as a [`StateChangedEvent`].
pub struct KnxEntity {
    entity_id: String,
    device: Arc<GroupDevice>,
    events: SharedEventBus,
    observer: Mutex<Option<ObserverHandle>>,
    last_state: Arc<Mutex<Option<EntityState>>>,
}

impl std::fmt::Debug for KnxEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnxEntity")
            .field("entity_id", &self.entity_id)
            .field("device", &self.device)
            .finish()
    }
}

impl KnxEntity {
    /// Create an entity wrapper for a device
    pub fn new(entity_id: impl Into<String>, device: Arc<GroupDevice>, events: SharedEventBus) -> Self {
        Self {
            entity_id: entity_id.into(),
            device,
            events,
            observer: Mutex::new(None),
            last_state: Arc::new(Mutex::new(None)),
        }
    }

    /// The entity id
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Register the update callback; call when the entity joins the host
    pub fn added_to_host(&self) {
        let entity_id = self.entity_id.clone();
        let events = self.events.clone();
        let last_state = self.last_state.clone();

        let handle = self.device.register_update_callback(Arc::new(move |value| {
            let new_state = EntityState::new(value.clone());
            let old_state = match last_state.lock() {
                Ok(mut last) => last.replace(new_state.clone()),
                Err(_) => None,
            };
            if let Err(e) = events.publish(StateChangedEvent {
                entity_id: entity_id.clone(),
                old_state,
                new_state: Some(new_state),
            }) {
                warn!("Entity {} failed to publish state: {}", entity_id, e);
            }
        }));

        if let Ok(mut observer) = self.observer.lock() {
            *observer = Some(handle);
        }
    }

    /// Unregister the update callback; call when the entity leaves the host
    pub fn will_remove_from_host(&self) {
        if let Ok(mut observer) = self.observer.lock() {
            if let Some(handle) = observer.take() {
                self.device.unregister_update_callback(handle);
            }
        }
    }
}
