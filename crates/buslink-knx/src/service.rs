/*!
 * User-facing bus services.
 *
 * `send` writes an encoded or raw payload to one or more group addresses,
 * `read` requests a group value. Validation happens before anything touches
 * the bus: a bad address, unknown DPT or out-of-domain payload fails the
 * whole call synchronously and no telegram is sent.
 */
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use buslink_core::types::Value;

use crate::address::{AddressFilter, GroupAddress, IndividualAddress};
use crate::dpt::TranscoderRegistry;
use crate::error::{KnxError, Result};
use crate::telegram::{Telegram, TelegramPayload};
use crate::transport::GroupWriter;

/// Parameters of a send call
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// One or more destination addresses
    pub addresses: Vec<String>,
    /// The payload to send
    pub payload: Value,
    /// DPT identifier or alias to encode with; raw payload when absent
    pub value_type: Option<String>,
    /// Send a `GroupValueResponse` instead of a `GroupValueWrite`
    pub response: bool,
}

impl SendRequest {
    /// Send a value to one address as a write
    pub fn to_address(address: impl Into<String>, payload: Value) -> Self {
        Self {
            addresses: vec![address.into()],
            payload,
            value_type: None,
            response: false,
        }
    }

    /// Encode the payload with the given DPT
    pub fn with_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }
}

/// Bus service endpoints
pub struct KnxServices {
    writer: Arc<dyn GroupWriter>,
    transcoders: TranscoderRegistry,
    source: IndividualAddress,
}

impl std::fmt::Debug for KnxServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnxServices")
            .field("source", &self.source)
            .finish()
    }
}

impl KnxServices {
    /// Create the service layer over a transport
    pub fn new(
        writer: Arc<dyn GroupWriter>,
        transcoders: TranscoderRegistry,
        source: IndividualAddress,
    ) -> Self {
        Self {
            writer,
            transcoders,
            source,
        }
    }

    /// Send a payload to every requested address.
    ///
    /// All addresses and the payload are validated up front; a request that
    /// fails validation sends nothing at all.
    pub async fn send(&self, request: SendRequest) -> Result<()> {
        if request.addresses.is_empty() {
            return Err(KnxError::validation("send requires at least one address"));
        }
        let destinations = request
            .addresses
            .iter()
            .map(|raw| GroupAddress::parse(raw))
            .collect::<Result<Vec<_>>>()?;
        let raw = self.encode_payload(&request)?;

        for destination in destinations {
            let payload = if request.response {
                TelegramPayload::GroupValueResponse(raw.clone())
            } else {
                TelegramPayload::GroupValueWrite(raw.clone())
            };
            let telegram = Telegram::outgoing(self.source, destination, payload);
            debug!("Service send: {}", telegram);
            self.writer.send(telegram).await?;
        }
        Ok(())
    }

    /// Request the current value of every listed group object
    pub async fn read(&self, addresses: &[String]) -> Result<()> {
        if addresses.is_empty() {
            return Err(KnxError::validation("read requires at least one address"));
        }
        let destinations = addresses
            .iter()
            .map(|raw| GroupAddress::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        for destination in destinations {
            let telegram =
                Telegram::outgoing(self.source, destination, TelegramPayload::GroupValueRead);
            debug!("Service read: {}", telegram);
            self.writer.send(telegram).await?;
        }
        Ok(())
    }

    fn encode_payload(&self, request: &SendRequest) -> Result<Bytes> {
        match &request.value_type {
            Some(value_type) => {
                let transcoder = self.transcoders.parse_transcoder(value_type).ok_or_else(|| {
                    KnxError::validation(format!("Unknown value type '{}'", value_type))
                })?;
                transcoder.to_knx(&request.payload)
            }
            None => raw_payload(&request.payload),
        }
    }
}

/// Encode a raw payload without a DPT: a bool, a single byte, or byte lists
fn raw_payload(payload: &Value) -> Result<Bytes> {
    match payload {
        Value::Bool(b) => Ok(Bytes::from(vec![u8::from(*b)])),
        Value::Integer(i) if (0..=255).contains(i) => Ok(Bytes::from(vec![*i as u8])),
        Value::Binary(bytes) => Ok(Bytes::from(bytes.clone())),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| match item {
                    Value::Integer(i) if (0..=255).contains(i) => Ok(*i as u8),
                    other => Err(KnxError::validation(format!(
                        "Raw payload element {:?} is not a byte",
                        other
                    ))),
                })
                .collect::<Result<Vec<u8>>>()?;
            Ok(Bytes::from(bytes))
        }
        other => Err(KnxError::validation(format!(
            "Cannot send {:?} without a value type",
            other
        ))),
    }
}

/// Validate configured address filters.
///
/// Structured and free-style patterns cannot be mixed in one filter list;
/// the mismatching style would silently never match anything at runtime, so
/// it is rejected here instead.
pub fn validate_filters(patterns: &[String]) -> Result<Vec<AddressFilter>> {
    let filters = patterns
        .iter()
        .map(|pattern| AddressFilter::parse(pattern))
        .collect::<Result<Vec<_>>>()?;

    let mut styles = filters.iter().map(AddressFilter::style);
    if let Some(first) = styles.next() {
        if styles.any(|style| style != first) {
            return Err(KnxError::validation(
                "Address filters cannot mix structured and free styles",
            ));
        }
    }
    Ok(filters)
}
