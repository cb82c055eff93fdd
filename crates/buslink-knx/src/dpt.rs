/*!
 * DPT transcoding for KNX payloads.
 *
 * A transcoder maps one data-point-type identifier to an encode/decode pair
 * over raw telegram payloads. The registry is populated once at startup and
 * read-only afterwards; looking up an unknown DPT is a normal outcome that
 * means "treat the payload as opaque bytes".
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use buslink_core::types::Value;

use crate::error::{KnxError, Result};

/// Encode/decode pair for one data point type
pub trait DptTranscoder: Debug + Send + Sync {
    /// The DPT identifier (`"main.sub"`, e.g. `"9.001"`)
    fn dpt_id(&self) -> &'static str;

    /// The unit of the decoded value, if any
    fn unit(&self) -> Option<&'static str> {
        None
    }

    /// Decode a raw payload into a value.
    ///
    /// Fails with a conversion error on malformed payload length or range;
    /// callers at the dispatch layer must catch and degrade to `value = None`
    /// rather than drop the telegram.
    fn from_knx(&self, raw: &[u8]) -> Result<Value>;

    /// Encode a value into a raw payload.
    ///
    /// Fails with a conversion error when the value is outside the DPT's
    /// domain.
    fn to_knx(&self, value: &Value) -> Result<Bytes>;
}

/// DPT 1.001 switch (boolean)
#[derive(Debug, Default)]
pub struct SwitchTranscoder;

impl DptTranscoder for SwitchTranscoder {
    fn dpt_id(&self) -> &'static str {
        "1.001"
    }

    fn from_knx(&self, raw: &[u8]) -> Result<Value> {
        match raw {
            [0] => Ok(Value::Bool(false)),
            [1] => Ok(Value::Bool(true)),
            [b] => Err(KnxError::conversion(format!(
                "DPT 1.001 payload {:#04x} is not 0 or 1",
                b
            ))),
            _ => Err(payload_length_error("1.001", 1, raw)),
        }
    }

    fn to_knx(&self, value: &Value) -> Result<Bytes> {
        let switch = value
            .as_bool()
            .ok_or_else(|| KnxError::conversion(format!("DPT 1.001 cannot encode {:?}", value)))?;
        Ok(Bytes::from(vec![u8::from(switch)]))
    }
}

/// DPT 5.001 scaling (percent).
///
/// Maps 0..=100 onto one byte 0..=255 with round-half-up in both directions.
/// The mapping is not exact for every byte, so a decoded value may differ by
/// one percent from the value that produced it.
#[derive(Debug, Default)]
pub struct ScalingTranscoder;

impl DptTranscoder for ScalingTranscoder {
    fn dpt_id(&self) -> &'static str {
        "5.001"
    }

    fn unit(&self) -> Option<&'static str> {
        Some("%")
    }

    fn from_knx(&self, raw: &[u8]) -> Result<Value> {
        match raw {
            [b] => Ok(Value::Integer((u32::from(*b) * 100 + 127) as i64 / 255)),
            _ => Err(payload_length_error("5.001", 1, raw)),
        }
    }

    fn to_knx(&self, value: &Value) -> Result<Bytes> {
        let percent = value
            .as_integer()
            .filter(|v| (0..=100).contains(v))
            .ok_or_else(|| {
                KnxError::conversion(format!("DPT 5.001 requires 0..=100, got {:?}", value))
            })?;
        let byte = ((percent as u32 * 255 + 50) / 100) as u8;
        Ok(Bytes::from(vec![byte]))
    }
}

/// DPT 7.001 2-byte unsigned counter
#[derive(Debug, Default)]
pub struct Unsigned16Transcoder;

impl DptTranscoder for Unsigned16Transcoder {
    fn dpt_id(&self) -> &'static str {
        "7.001"
    }

    fn from_knx(&self, raw: &[u8]) -> Result<Value> {
        match raw {
            [high, low] => Ok(Value::Integer(i64::from(u16::from_be_bytes([*high, *low])))),
            _ => Err(payload_length_error("7.001", 2, raw)),
        }
    }

    fn to_knx(&self, value: &Value) -> Result<Bytes> {
        let counter = value
            .as_integer()
            .filter(|v| (0..=0xffff).contains(v))
            .ok_or_else(|| {
                KnxError::conversion(format!("DPT 7.001 requires 0..=65535, got {:?}", value))
            })?;
        Ok(Bytes::copy_from_slice(&(counter as u16).to_be_bytes()))
    }
}

/// DPT 9.001 2-byte float temperature.
///
/// Wire format is `SEEEEMMM MMMMMMMM`: a 4-bit exponent and a 12-bit
/// two's-complement mantissa (sign bit included) at 0.01 resolution, giving
/// -671088.64..=670760.96 overall and -273 as the domain floor.
#[derive(Debug, Default)]
pub struct TemperatureTranscoder;

const TEMPERATURE_MIN: f64 = -273.0;
const TEMPERATURE_MAX: f64 = 670_760.96;

impl DptTranscoder for TemperatureTranscoder {
    fn dpt_id(&self) -> &'static str {
        "9.001"
    }

    fn unit(&self) -> Option<&'static str> {
        Some("°C")
    }

    fn from_knx(&self, raw: &[u8]) -> Result<Value> {
        let [high, low] = match raw {
            [high, low] => [*high, *low],
            _ => return Err(payload_length_error("9.001", 2, raw)),
        };
        let exponent = (high >> 3) & 0x0f;
        let mut mantissa = i32::from(high & 0x07) << 8 | i32::from(low);
        if high & 0x80 != 0 {
            mantissa -= 0x800;
        }
        Ok(Value::Float(
            f64::from(mantissa) * 0.01 * f64::from(1u32 << exponent),
        ))
    }

    fn to_knx(&self, value: &Value) -> Result<Bytes> {
        let temperature = value.as_float().ok_or_else(|| {
            KnxError::conversion(format!("DPT 9.001 cannot encode {:?}", value))
        })?;
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature) {
            return Err(KnxError::conversion(format!(
                "DPT 9.001 temperature {} outside {}..={}",
                temperature, TEMPERATURE_MIN, TEMPERATURE_MAX
            )));
        }

        let mut scaled = (temperature * 100.0).round();
        let mut exponent: u8 = 0;
        while !(-2048.0..=2047.0).contains(&scaled) {
            scaled /= 2.0;
            exponent += 1;
        }
        let mantissa = scaled.round() as i32;

        let sign = if mantissa < 0 { 0x80 } else { 0x00 };
        let high = sign | (exponent << 3) | ((mantissa >> 8) & 0x07) as u8;
        let low = (mantissa & 0xff) as u8;
        Ok(Bytes::from(vec![high, low]))
    }
}

fn payload_length_error(dpt: &str, expected: usize, raw: &[u8]) -> KnxError {
    KnxError::conversion(format!(
        "DPT {} expects {} payload byte(s), got {}",
        dpt,
        expected,
        raw.len()
    ))
}

/// Registry of DPT transcoders, keyed by identifier and friendly alias
#[derive(Debug, Default)]
pub struct TranscoderRegistry {
    transcoders: HashMap<String, Arc<dyn DptTranscoder>>,
}

impl TranscoderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in transcoders and their aliases
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SwitchTranscoder), &["binary"]);
        registry.register(Arc::new(ScalingTranscoder), &["percent"]);
        registry.register(Arc::new(Unsigned16Transcoder), &["2byte_unsigned"]);
        registry.register(Arc::new(TemperatureTranscoder), &["temperature"]);
        registry
    }

    /// Register a transcoder under its DPT identifier plus optional aliases
    pub fn register(&mut self, transcoder: Arc<dyn DptTranscoder>, aliases: &[&str]) {
        self.transcoders
            .insert(transcoder.dpt_id().to_string(), transcoder.clone());
        for alias in aliases {
            self.transcoders
                .insert((*alias).to_string(), transcoder.clone());
        }
    }

    /// Look up a transcoder by DPT identifier or alias.
    ///
    /// Absence is a normal outcome; the payload is then treated as opaque
    /// bytes.
    pub fn parse_transcoder(&self, identifier: &str) -> Option<Arc<dyn DptTranscoder>> {
        self.transcoders.get(identifier).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_round_trip() {
        let codec = SwitchTranscoder;
        for switch in [true, false] {
            let raw = codec.to_knx(&Value::Bool(switch)).unwrap();
            assert_eq!(codec.from_knx(&raw).unwrap(), Value::Bool(switch));
        }
        assert!(codec.from_knx(&[2]).is_err());
        assert!(codec.from_knx(&[0, 1]).is_err());
        assert!(codec.to_knx(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_percent_wire_scenario() {
        // 99 % encodes to 0xFC and decodes back to 99
        let codec = ScalingTranscoder;
        let raw = codec.to_knx(&Value::Integer(99)).unwrap();
        assert_eq!(raw.as_ref(), &[0xfc]);
        assert_eq!(codec.from_knx(&[0xfc]).unwrap(), Value::Integer(99));
    }

    #[test]
    fn test_percent_round_trip_over_domain() {
        let codec = ScalingTranscoder;
        for percent in 0..=100i64 {
            let raw = codec.to_knx(&Value::Integer(percent)).unwrap();
            assert_eq!(
                codec.from_knx(&raw).unwrap(),
                Value::Integer(percent),
                "percent {} did not round-trip",
                percent
            );
        }
    }

    #[test]
    fn test_percent_domain_errors() {
        let codec = ScalingTranscoder;
        assert!(codec.to_knx(&Value::Integer(101)).is_err());
        assert!(codec.to_knx(&Value::Integer(-1)).is_err());
        assert!(codec.to_knx(&Value::Bool(true)).is_err());
        assert!(codec.from_knx(&[]).is_err());
    }

    #[test]
    fn test_unsigned16_round_trip() {
        let codec = Unsigned16Transcoder;
        for counter in [0i64, 1, 255, 256, 65535] {
            let raw = codec.to_knx(&Value::Integer(counter)).unwrap();
            assert_eq!(codec.from_knx(&raw).unwrap(), Value::Integer(counter));
        }
        assert!(codec.to_knx(&Value::Integer(65536)).is_err());
        assert!(codec.from_knx(&[1]).is_err());
    }

    #[test]
    fn test_temperature_round_trip() {
        let codec = TemperatureTranscoder;
        // Half-degree steps are exactly representable in this range
        let mut temperature = -20.0f64;
        while temperature <= 40.0 {
            let raw = codec.to_knx(&Value::Float(temperature)).unwrap();
            assert_eq!(
                codec.from_knx(&raw).unwrap(),
                Value::Float(temperature),
                "temperature {} did not round-trip",
                temperature
            );
            temperature += 0.5;
        }
    }

    #[test]
    fn test_temperature_known_encoding() {
        // 21.0 °C = mantissa 2100 at exponent 1 -> 0x0C1A
        let codec = TemperatureTranscoder;
        let raw = codec.to_knx(&Value::Float(21.0)).unwrap();
        assert_eq!(raw.as_ref(), &[0x0c, 0x1a]);
        assert_eq!(codec.from_knx(&[0x0c, 0x1a]).unwrap(), Value::Float(21.0));
    }

    #[test]
    fn test_temperature_domain_errors() {
        let codec = TemperatureTranscoder;
        assert!(codec.to_knx(&Value::Float(-300.0)).is_err());
        assert!(codec.to_knx(&Value::String("warm".to_string())).is_err());
        assert!(codec.from_knx(&[1]).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TranscoderRegistry::with_defaults();
        assert!(registry.parse_transcoder("9.001").is_some());
        assert!(registry.parse_transcoder("temperature").is_some());
        assert!(registry.parse_transcoder("percent").is_some());
        assert!(registry.parse_transcoder("20.105").is_none());

        let unit = registry.parse_transcoder("5.001").unwrap().unit();
        assert_eq!(unit, Some("%"));
    }
}
