/*!
 * KNX addressing model.
 *
 * Group addresses come in three styles: the structured area/line/device form,
 * the free flat-integer form used by some installations, and internal
 * addresses that never leave the integration. Address filters support
 * wildcard and range segments per level.
 */
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{KnxError, Result};

/// Prefix marking an internal (integration-local) group address
pub const INTERNAL_ADDRESS_PREFIX: &str = "i-";

const MAX_AREA: u16 = 0x1f;
const MAX_LINE: u16 = 0x07;
const MAX_DEVICE: u16 = 0xff;
const MAX_FREE: u32 = 0xffff;

/// A KNX group address
///
/// Equality and hashing compare the normalized 16-bit value, so a structured
/// `1/2/3` equals the free address `2563`. Internal addresses compare by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GroupAddress {
    /// Structured three-level address (area/line/device, 5/3/8 bits)
    Standard(u16),
    /// Flat 16-bit address without level structure
    Free(u16),
    /// Internal address, scoped to the integration
    Internal(String),
}

impl GroupAddress {
    /// Parse a group address from its string form
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(KnxError::address_format("empty group address"));
        }

        if let Some(name) = raw.strip_prefix(INTERNAL_ADDRESS_PREFIX) {
            if name.is_empty() {
                return Err(KnxError::address_format(format!(
                    "internal address '{}' has no name",
                    raw
                )));
            }
            return Ok(GroupAddress::Internal(name.to_string()));
        }

        if raw.contains('/') {
            let parts: Vec<&str> = raw.split('/').collect();
            if parts.len() != 3 {
                return Err(KnxError::address_format(format!(
                    "'{}' is not an <area>/<line>/<device> address",
                    raw
                )));
            }
            let area = parse_level(parts[0], MAX_AREA, raw)?;
            let line = parse_level(parts[1], MAX_LINE, raw)?;
            let device = parse_level(parts[2], MAX_DEVICE, raw)?;
            return Ok(GroupAddress::Standard(area << 11 | line << 8 | device));
        }

        let value: u32 = raw
            .parse()
            .map_err(|_| KnxError::address_format(format!("'{}' is not a group address", raw)))?;
        Self::from_raw(value)
    }

    /// Create a free-format address from a raw integer
    pub fn from_raw(value: u32) -> Result<Self> {
        if value > MAX_FREE {
            return Err(KnxError::address_format(format!(
                "{} is outside the group address range 0..=65535",
                value
            )));
        }
        Ok(GroupAddress::Free(value as u16))
    }

    /// The normalized 16-bit value, absent for internal addresses
    pub fn raw(&self) -> Option<u16> {
        match self {
            GroupAddress::Standard(raw) | GroupAddress::Free(raw) => Some(*raw),
            GroupAddress::Internal(_) => None,
        }
    }

    /// The (area, line, device) triple of a structured address
    pub fn levels(&self) -> Option<(u16, u16, u16)> {
        match self {
            GroupAddress::Standard(raw) => Some((raw >> 11, (raw >> 8) & MAX_LINE, raw & MAX_DEVICE)),
            _ => None,
        }
    }

    /// Whether this is an internal address
    pub fn is_internal(&self) -> bool {
        matches!(self, GroupAddress::Internal(_))
    }
}

fn parse_level(part: &str, max: u16, raw: &str) -> Result<u16> {
    let value: u16 = part
        .parse()
        .map_err(|_| KnxError::address_format(format!("'{}' has a non-numeric level", raw)))?;
    if value > max {
        return Err(KnxError::address_format(format!(
            "'{}' level {} exceeds maximum {}",
            raw, value, max
        )));
    }
    Ok(value)
}

impl PartialEq for GroupAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GroupAddress::Internal(a), GroupAddress::Internal(b)) => a == b,
            (a, b) => match (a.raw(), b.raw()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for GroupAddress {}

impl Hash for GroupAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            GroupAddress::Internal(name) => name.hash(state),
            other => other.raw().hash(state),
        }
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupAddress::Standard(_) => {
                let (area, line, device) = self.levels().unwrap_or((0, 0, 0));
                write!(f, "{}/{}/{}", area, line, device)
            }
            GroupAddress::Free(raw) => write!(f, "{}", raw),
            GroupAddress::Internal(name) => write!(f, "{}{}", INTERNAL_ADDRESS_PREFIX, name),
        }
    }
}

impl From<GroupAddress> for String {
    fn from(address: GroupAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for GroupAddress {
    type Error = KnxError;

    fn try_from(raw: String) -> Result<Self> {
        GroupAddress::parse(&raw)
    }
}

/// A KNX individual (physical) address, used as telegram source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IndividualAddress(u16);

impl IndividualAddress {
    /// Parse an individual address from its dotted form (`area.line.device`)
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(KnxError::address_format(format!(
                "'{}' is not an <area>.<line>.<device> address",
                raw
            )));
        }
        let area = parse_level(parts[0], 0x0f, raw)?;
        let line = parse_level(parts[1], 0x0f, raw)?;
        let device = parse_level(parts[2], 0xff, raw)?;
        Ok(Self(area << 12 | line << 8 | device))
    }

    /// Build from a raw 16-bit value; every value is a valid address
    pub fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// The raw 16-bit value
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0 >> 12, (self.0 >> 8) & 0x0f, self.0 & 0xff)
    }
}

impl From<IndividualAddress> for String {
    fn from(address: IndividualAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for IndividualAddress {
    type Error = KnxError;

    fn try_from(raw: String) -> Result<Self> {
        IndividualAddress::parse(&raw)
    }
}

/// A single level of an address filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFilter {
    /// Matches any value at this level
    Any,
    /// Matches exactly one value
    Single(u16),
    /// Matches an inclusive decimal range
    Range(u16, u16),
}

impl LevelFilter {
    fn parse(part: &str, max: u16, raw: &str) -> Result<Self> {
        if part == "*" {
            return Ok(LevelFilter::Any);
        }
        if let Some((low, high)) = part.split_once('-') {
            let low = parse_level(low, max, raw)?;
            let high = parse_level(high, max, raw)?;
            if low > high {
                return Err(KnxError::address_format(format!(
                    "'{}' has an empty range {}-{}",
                    raw, low, high
                )));
            }
            return Ok(LevelFilter::Range(low, high));
        }
        Ok(LevelFilter::Single(parse_level(part, max, raw)?))
    }

    fn matches(&self, value: u16) -> bool {
        match self {
            LevelFilter::Any => true,
            LevelFilter::Single(single) => *single == value,
            LevelFilter::Range(low, high) => (*low..=*high).contains(&value),
        }
    }
}

/// The address style a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStyle {
    /// Three-level area/line/device filters
    Structured,
    /// Flat single-level filters
    Free,
}

/// A pattern over group addresses with wildcard and range segments.
///
/// Structured filters only match structured addresses and free filters only
/// match free addresses; mixed configurations are rejected up front by
/// [`crate::service::validate_filters`]. Matching a mismatched pair returns
/// false rather than panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFilter {
    style: FilterStyle,
    levels: Vec<LevelFilter>,
}

impl AddressFilter {
    /// Parse an address filter pattern (e.g. `"1/3-6/*"` or `"512-1023"`)
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(KnxError::address_format("empty address filter"));
        }

        if raw.contains('/') {
            let parts: Vec<&str> = raw.split('/').collect();
            if parts.len() != 3 {
                return Err(KnxError::address_format(format!(
                    "'{}' is not an <area>/<line>/<device> filter",
                    raw
                )));
            }
            let levels = vec![
                LevelFilter::parse(parts[0], MAX_AREA, raw)?,
                LevelFilter::parse(parts[1], MAX_LINE, raw)?,
                LevelFilter::parse(parts[2], MAX_DEVICE, raw)?,
            ];
            return Ok(Self {
                style: FilterStyle::Structured,
                levels,
            });
        }

        let level = LevelFilter::parse(raw, u16::MAX, raw)?;
        Ok(Self {
            style: FilterStyle::Free,
            levels: vec![level],
        })
    }

    /// The address style this filter applies to
    pub fn style(&self) -> FilterStyle {
        self.style
    }

    /// Check whether the filter matches a group address.
    ///
    /// Each level matches independently, so the whole check is O(levels).
    pub fn matches(&self, address: &GroupAddress) -> bool {
        match (self.style, address) {
            (FilterStyle::Structured, GroupAddress::Standard(_)) => {
                let (area, line, device) = match address.levels() {
                    Some(levels) => levels,
                    None => return false,
                };
                self.levels[0].matches(area)
                    && self.levels[1].matches(line)
                    && self.levels[2].matches(device)
            }
            (FilterStyle::Free, GroupAddress::Free(raw)) => self.levels[0].matches(*raw),
            _ => false,
        }
    }
}
