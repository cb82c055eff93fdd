/*!
 * Exposure engine.
 *
 * Exposures run opposite to the device pipeline: they mirror a host entity's
 * state (or one of its attributes) onto a group address whenever a state
 * change event for that entity arrives. Attribute exposures de-duplicate so
 * an unchanged attribute does not generate bus traffic on unrelated state
 * updates.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use buslink_core::event::SharedEventBus;
use buslink_core::state::{StateChangedEvent, STATE_OFF, STATE_ON};
use buslink_core::types::Value;

use crate::address::GroupAddress;
use crate::dpt::DptTranscoder;
use crate::error::{KnxError, Result};
use crate::telegram::{Telegram, TelegramPayload};
use crate::transport::GroupWriter;

/// Configuration for one exposure
#[derive(Clone)]
pub struct ExposureSpec {
    /// The entity whose state is mirrored
    pub entity_id: String,
    /// Mirror this attribute instead of the entity state
    pub attribute: Option<String>,
    /// Substitute for a missing attribute value
    pub default: Option<Value>,
    /// Codec for the target group object; raw bool/bytes when absent
    pub transcoder: Option<Arc<dyn DptTranscoder>>,
    /// The group address written to
    pub address: GroupAddress,
}

impl std::fmt::Debug for ExposureSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposureSpec")
            .field("entity_id", &self.entity_id)
            .field("attribute", &self.attribute)
            .field("address", &self.address)
            .finish()
    }
}

/// Handle for a registered exposure; pass to [`ExposureEngine::remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExposureHandle(u64);

struct Exposure {
    spec: ExposureSpec,
    last_sent: Option<Value>,
}

impl Exposure {
    /// Decide what this exposure should send for a state change, if anything.
    fn value_to_send(&self, event: &StateChangedEvent) -> Option<Value> {
        let new_state = event.new_state.as_ref()?;
        if !new_state.is_usable() {
            return None;
        }

        match &self.spec.attribute {
            None => {
                // Entity-level exposures always re-evaluate; only the
                // last-sent debounce below suppresses repeats.
                Some(new_state.state.clone())
            }
            Some(attribute) => {
                let new_value = new_state.attribute(attribute);
                if let Some(old_state) = &event.old_state {
                    if old_state.attribute(attribute) == new_value && new_value.is_some() {
                        return None;
                    }
                }
                match new_value {
                    Some(value) => Some(value.clone()),
                    None => self.spec.default.clone(),
                }
            }
        }
    }

    fn encode(&self, value: &Value) -> Result<TelegramPayload> {
        let value = self.translate_binary(value)?;
        let raw = match &self.spec.transcoder {
            Some(transcoder) => transcoder.to_knx(&value)?,
            None => match &value {
                Value::Bool(b) => bytes::Bytes::from(vec![u8::from(*b)]),
                Value::Binary(bytes) => bytes::Bytes::from(bytes.clone()),
                other => {
                    return Err(KnxError::conversion(format!(
                        "Exposure for {} has no DPT and cannot encode {:?}",
                        self.spec.entity_id, other
                    )))
                }
            },
        };
        Ok(TelegramPayload::GroupValueWrite(raw))
    }

    /// Binary exposures accept the host's on/off state strings.
    fn translate_binary(&self, value: &Value) -> Result<Value> {
        let is_binary = self
            .spec
            .transcoder
            .as_ref()
            .map(|t| t.dpt_id() == "1.001")
            .unwrap_or(false);
        if !is_binary {
            return Ok(value.clone());
        }
        match value {
            Value::String(s) if s == STATE_ON => Ok(Value::Bool(true)),
            Value::String(s) if s == STATE_OFF => Ok(Value::Bool(false)),
            other => Ok(other.clone()),
        }
    }
}

/// Mirrors entity state changes onto the bus
pub struct ExposureEngine {
    writer: Arc<dyn GroupWriter>,
    exposures: Arc<Mutex<HashMap<u64, Exposure>>>,
    next_id: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ExposureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.exposures.lock().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("ExposureEngine")
            .field("exposures", &count)
            .finish()
    }
}

impl ExposureEngine {
    /// Create an engine writing through the given transport
    pub fn new(writer: Arc<dyn GroupWriter>) -> Self {
        Self {
            writer,
            exposures: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            task: Mutex::new(None),
        }
    }

    /// Register an exposure
    pub fn register(&self, spec: ExposureSpec) -> Result<ExposureHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut exposures = self
            .exposures
            .lock()
            .map_err(|_| KnxError::other("Failed to lock exposure table"))?;
        exposures.insert(
            id,
            Exposure {
                spec,
                last_sent: None,
            },
        );
        Ok(ExposureHandle(id))
    }

    /// Remove an exposure; its listener state is dropped with it
    pub fn remove(&self, handle: ExposureHandle) -> Result<()> {
        let mut exposures = self
            .exposures
            .lock()
            .map_err(|_| KnxError::other("Failed to lock exposure table"))?;
        exposures.remove(&handle.0);
        Ok(())
    }

    /// Number of registered exposures
    pub fn len(&self) -> usize {
        self.exposures.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no exposures are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start consuming state change events from the bus
    pub fn start(self: &Arc<Self>, events: &SharedEventBus) -> Result<()> {
        let mut rx = events.subscribe::<StateChangedEvent>()?;
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                engine.handle_state_change(&event).await;
            }
            debug!("Exposure engine event stream closed");
        });
        if let Ok(mut slot) = self.task.lock() {
            if let Some(old) = slot.replace(task) {
                old.abort();
            }
        }
        Ok(())
    }

    /// Stop the event consumer; registered exposures stay in place
    pub fn stop(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    /// Evaluate one state change against every registered exposure.
    ///
    /// A send failure is logged and leaves the debounce state untouched, so
    /// the same value is retried on the next state change.
    pub async fn handle_state_change(&self, event: &StateChangedEvent) {
        let pending: Vec<(u64, GroupAddress, Value, Result<TelegramPayload>)> = {
            let exposures = match self.exposures.lock() {
                Ok(exposures) => exposures,
                Err(_) => return,
            };
            exposures
                .iter()
                .filter(|(_, exposure)| exposure.spec.entity_id == event.entity_id)
                .filter_map(|(id, exposure)| {
                    let value = exposure.value_to_send(event)?;
                    if exposure.last_sent.as_ref() == Some(&value) {
                        return None;
                    }
                    let payload = exposure.encode(&value);
                    Some((*id, exposure.spec.address.clone(), value, payload))
                })
                .collect()
        };

        for (id, address, value, payload) in pending {
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Exposure for {} cannot encode value: {}", event.entity_id, e);
                    continue;
                }
            };
            // The transport stamps the real source address on the wire
            let telegram = Telegram::outgoing(
                crate::address::IndividualAddress::from_raw(0),
                address,
                payload,
            );
            match self.writer.send(telegram).await {
                Ok(()) => {
                    if let Ok(mut exposures) = self.exposures.lock() {
                        if let Some(exposure) = exposures.get_mut(&id) {
                            exposure.last_sent = Some(value);
                        }
                    }
                }
                Err(e) => {
                    warn!("Exposure send for {} failed: {}", event.entity_id, e);
                }
            }
        }
    }
}
