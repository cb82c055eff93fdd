/*!
 * Telegram value objects.
 *
 * A telegram is one KNX bus message: source, destination, direction and a
 * group-value payload. Telegrams are immutable; the dispatcher consumes each
 * one exactly once.
 */
use std::fmt;

use bytes::Bytes;

use crate::address::{GroupAddress, IndividualAddress};

/// Direction of a telegram relative to this integration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramDirection {
    /// Received from the bus
    Incoming,
    /// Sent by this integration
    Outgoing,
}

impl fmt::Display for TelegramDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelegramDirection::Incoming => write!(f, "Incoming"),
            TelegramDirection::Outgoing => write!(f, "Outgoing"),
        }
    }
}

/// The group-value payload of a telegram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramPayload {
    /// Read request, carries no data
    GroupValueRead,
    /// Write with raw DPT payload
    GroupValueWrite(Bytes),
    /// Response to a read, with raw DPT payload
    GroupValueResponse(Bytes),
}

impl TelegramPayload {
    /// The raw payload bytes, absent for read requests
    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            TelegramPayload::GroupValueRead => None,
            TelegramPayload::GroupValueWrite(raw) | TelegramPayload::GroupValueResponse(raw) => {
                Some(raw)
            }
        }
    }

    /// The payload type name used on the event surface
    pub fn telegram_type(&self) -> &'static str {
        match self {
            TelegramPayload::GroupValueRead => "GroupValueRead",
            TelegramPayload::GroupValueWrite(_) => "GroupValueWrite",
            TelegramPayload::GroupValueResponse(_) => "GroupValueResponse",
        }
    }
}

/// One KNX bus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    /// The individual address of the sender
    pub source: IndividualAddress,
    /// The group address the telegram is for
    pub destination: GroupAddress,
    /// Direction relative to this integration
    pub direction: TelegramDirection,
    /// The group-value payload
    pub payload: TelegramPayload,
}

impl Telegram {
    /// Create an incoming telegram
    pub fn incoming(
        source: IndividualAddress,
        destination: GroupAddress,
        payload: TelegramPayload,
    ) -> Self {
        Self {
            source,
            destination,
            direction: TelegramDirection::Incoming,
            payload,
        }
    }

    /// Create an outgoing telegram
    pub fn outgoing(
        source: IndividualAddress,
        destination: GroupAddress,
        payload: TelegramPayload,
    ) -> Self {
        Self {
            source,
            destination,
            direction: TelegramDirection::Outgoing,
            payload,
        }
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Telegram {} {} -> {} {}>",
            self.direction,
            self.source,
            self.destination,
            self.payload.telegram_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> IndividualAddress {
        IndividualAddress::parse("1.1.5").unwrap()
    }

    #[test]
    fn test_payload_accessors() {
        assert_eq!(TelegramPayload::GroupValueRead.raw(), None);
        assert_eq!(
            TelegramPayload::GroupValueRead.telegram_type(),
            "GroupValueRead"
        );

        let payload = TelegramPayload::GroupValueWrite(Bytes::from_static(&[0xfc]));
        assert_eq!(payload.raw().map(|raw| raw.as_ref()), Some(&[0xfc][..]));
        assert_eq!(payload.telegram_type(), "GroupValueWrite");
    }

    #[test]
    fn test_display() {
        let telegram = Telegram::incoming(
            source(),
            GroupAddress::parse("1/2/3").unwrap(),
            TelegramPayload::GroupValueWrite(Bytes::from_static(&[1])),
        );
        assert_eq!(
            telegram.to_string(),
            "<Telegram Incoming 1.1.5 -> 1/2/3 GroupValueWrite>"
        );
    }
}
