//! KNX addressing system.
//!
//! KNX uses three kinds of addresses:
//! - Individual addresses for physical devices (Area.Line.Device)
//! - Group addresses for logical grouping (Main/Middle/Sub, Main/Sub or free)
//! - Internal group addresses, named and never put on the bus
//!
//! [`Address`] unifies them for code that accepts any textual form.

pub mod group;
pub mod individual;
pub mod internal;

use core::fmt;

pub use group::{GroupAddress, GroupAddressType};
pub use individual::IndividualAddress;
pub use internal::InternalGroupAddress;

use crate::error::{KnxError, Result};

/// Parse a decimal address component of at most `max_digits` digits, bounded by `max`.
pub(crate) fn parse_component(part: &str, max_digits: usize, max: u16) -> Option<u16> {
    if part.is_empty() || part.len() > max_digits || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = part
        .bytes()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
    u16::try_from(value).ok().filter(|v| *v <= max)
}

/// Any KNX address.
///
/// Equality only holds between addresses of the same variant, so an
/// individual and a group address with the same raw value are different.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    Individual(IndividualAddress),
    Group(GroupAddress),
    Internal(InternalGroupAddress),
}

impl Address {
    /// Parse any address literal.
    ///
    /// Tokens with the `i`/`I` prefix are tried as internal addresses first,
    /// then tokens containing `.` as individual addresses, then everything
    /// else as a group address.
    pub fn parse(token: &str) -> Result<Self> {
        if InternalGroupAddress::has_prefix(token) {
            if let Ok(internal) = token.parse() {
                return Ok(Self::Internal(internal));
            }
        }
        if token.contains('.') {
            return token.parse().map(Self::Individual);
        }
        token.parse().map(Self::Group)
    }

    /// Packed wire value. `None` for internal addresses.
    pub fn to_raw(&self) -> Option<u16> {
        match self {
            Self::Individual(addr) => Some(addr.raw()),
            Self::Group(addr) => Some(addr.raw()),
            Self::Internal(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual(addr) => addr.fmt(f),
            Self::Group(addr) => addr.fmt(f),
            Self::Internal(addr) => addr.fmt(f),
        }
    }
}

impl core::str::FromStr for Address {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<IndividualAddress> for Address {
    fn from(addr: IndividualAddress) -> Self {
        Self::Individual(addr)
    }
}

impl From<GroupAddress> for Address {
    fn from(addr: GroupAddress) -> Self {
        Self::Group(addr)
    }
}

impl From<InternalGroupAddress> for Address {
    fn from(addr: InternalGroupAddress) -> Self {
        Self::Internal(addr)
    }
}

/// Destination of a device binding: a bus group address or an internal one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceGroupAddress {
    Group(GroupAddress),
    Internal(InternalGroupAddress),
}

impl fmt::Display for DeviceGroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(addr) => addr.fmt(f),
            Self::Internal(addr) => addr.fmt(f),
        }
    }
}

/// Parse a group or internal group address.
///
/// The internal grammar wins for `i`-prefixed tokens. Fails with an
/// address parse error carrying `token` when neither grammar matches.
///
/// ```
/// use knx_tunnel::addressing::{parse_device_group_address, DeviceGroupAddress};
///
/// assert!(matches!(parse_device_group_address("1/2/3"), Ok(DeviceGroupAddress::Group(_))));
/// assert!(matches!(parse_device_group_address("i-door"), Ok(DeviceGroupAddress::Internal(_))));
/// assert!(parse_device_group_address("1.1.1").is_err());
/// ```
pub fn parse_device_group_address(token: &str) -> Result<DeviceGroupAddress> {
    if let Ok(internal) = token.parse::<InternalGroupAddress>() {
        return Ok(DeviceGroupAddress::Internal(internal));
    }
    token
        .parse::<GroupAddress>()
        .map(DeviceGroupAddress::Group)
        .map_err(|_| KnxError::invalid_address(token))
}
