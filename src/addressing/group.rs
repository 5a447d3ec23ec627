//! KNX Group Address implementation.
//!
//! Group addresses represent logical groupings of devices for functional control.
//! Three presentations of the same 16-bit value exist:
//! - Free: a flat integer (e.g., 2415)
//! - Short (2-level): Main/Sub (e.g., 1/367), main 5 bits, sub 11 bits
//! - Long (3-level): Main/Middle/Sub (e.g., 1/1/111), main 5 bits, middle 3 bits, sub 8 bits
//!
//! The presentation only affects formatting and component accessors;
//! equality and hashing look at the raw value alone.

use super::parse_component;
use crate::error::{KnxError, Result};
use core::fmt;
use core::hash::{Hash, Hasher};

/// Presentation of a group address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupAddressType {
    /// Flat 16-bit number.
    Free,
    /// `main/sub`
    #[default]
    Short,
    /// `main/middle/sub`
    Long,
}

/// KNX Group Address
///
/// # Examples
///
/// ```
/// use knx_tunnel::{GroupAddress, GroupAddressType};
///
/// let addr: GroupAddress = "1/1/111".parse().unwrap();
/// assert_eq!(addr.raw(), 2415);
/// assert_eq!(addr.middle(), Some(1));
///
/// let short = addr.with_type(GroupAddressType::Short);
/// assert_eq!(short.to_string(), "1/367");
/// assert_eq!(short, addr);
/// ```
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
    kind: GroupAddressType,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_SHORT: u16 = 2047;

    /// Create a new 3-level Group Address (Main/Middle/Sub).
    ///
    /// # Errors
    ///
    /// Returns an address parse error if `main > 31` or `middle > 7`.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            let mut token = heapless::String::<16>::new();
            let _ = fmt::Write::write_fmt(&mut token, format_args!("{main}/{middle}/{sub}"));
            return Err(KnxError::invalid_group_address(&token));
        }
        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self::with_raw(raw, GroupAddressType::Long))
    }

    /// Create a new 2-level Group Address (Main/Sub).
    ///
    /// # Errors
    ///
    /// Returns an address parse error if `main > 31` or `sub > 2047`.
    pub fn new_short(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_SHORT {
            let mut token = heapless::String::<16>::new();
            let _ = fmt::Write::write_fmt(&mut token, format_args!("{main}/{sub}"));
            return Err(KnxError::invalid_group_address(&token));
        }
        Ok(Self::with_raw((u16::from(main) << 11) | sub, GroupAddressType::Short))
    }

    /// Create from a raw value with the default (short) presentation.
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self::with_raw(raw, GroupAddressType::Short)
    }

    /// Create from a raw value with an explicit presentation.
    #[inline]
    pub const fn with_raw(raw: u16, kind: GroupAddressType) -> Self {
        Self { raw, kind }
    }

    /// Create from the two wire bytes `(high, low)`.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self::from_raw(u16::from_be_bytes(bytes))
    }

    /// Same address, different presentation.
    #[inline]
    #[must_use]
    pub const fn with_type(self, kind: GroupAddressType) -> Self {
        Self::with_raw(self.raw, kind)
    }

    /// Get raw u16 value
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Presentation of this address.
    #[inline]
    pub const fn address_type(self) -> GroupAddressType {
        self.kind
    }

    /// Main group. `None` for the free presentation.
    pub const fn main(self) -> Option<u8> {
        match self.kind {
            GroupAddressType::Free => None,
            GroupAddressType::Short | GroupAddressType::Long => Some((self.raw >> 11) as u8),
        }
    }

    /// Middle group. Only the long presentation has one.
    pub const fn middle(self) -> Option<u8> {
        match self.kind {
            GroupAddressType::Long => Some(((self.raw >> 8) & 0x07) as u8),
            GroupAddressType::Free | GroupAddressType::Short => None,
        }
    }

    /// Sub group: the whole value (free), the low 11 bits (short) or the low 8 bits (long).
    pub const fn sub(self) -> u16 {
        match self.kind {
            GroupAddressType::Free => self.raw,
            GroupAddressType::Short => self.raw & Self::MAX_SUB_SHORT,
            GroupAddressType::Long => self.raw & 0xFF,
        }
    }

    /// Wire representation (big-endian).
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Encode to bytes (big-endian)
    ///
    /// # Errors
    ///
    /// Returns a buffer error if `buf` is shorter than 2 bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..2).ok_or_else(KnxError::buffer_too_small)?;
        out.copy_from_slice(&self.to_bytes());
        Ok(2)
    }

    /// Decode from bytes (big-endian)
    ///
    /// # Errors
    ///
    /// Returns a frame-too-small error if `buf` is shorter than 2 bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self::from_bytes([*hi, *lo])),
            _ => Err(KnxError::frame_too_small()),
        }
    }
}

impl PartialEq for GroupAddress {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for GroupAddress {}

impl Hash for GroupAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl From<u16> for GroupAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}

impl From<[u8; 2]> for GroupAddress {
    #[inline]
    fn from(bytes: [u8; 2]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<GroupAddress> for u16 {
    #[inline]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl TryFrom<u32> for GroupAddress {
    type Error = KnxError;

    fn try_from(value: u32) -> Result<Self> {
        u16::try_from(value).map(Self::from_raw).map_err(|_| {
            let mut token = heapless::String::<16>::new();
            let _ = fmt::Write::write_fmt(&mut token, format_args!("{value}"));
            KnxError::invalid_group_address(&token)
        })
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = self.raw >> 11;
        match self.kind {
            GroupAddressType::Free => write!(f, "{}", self.raw),
            GroupAddressType::Short => write!(f, "{}/{}", main, self.raw & Self::MAX_SUB_SHORT),
            GroupAddressType::Long => {
                write!(f, "{}/{}/{}", main, (self.raw >> 8) & 0x07, self.raw & 0xFF)
            }
        }
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Parse `main/middle/sub`, `main/sub` or a bare integer.
    ///
    /// The presentation of the result follows the form of the token.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KnxError::invalid_group_address(s);

        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(free), None, None, None) => parse_component(free, 5, u16::MAX)
                .map(|raw| Self::with_raw(raw, GroupAddressType::Free))
                .ok_or_else(invalid),
            (Some(main), Some(sub), None, None) => {
                let main = parse_component(main, 2, u16::from(Self::MAX_MAIN)).ok_or_else(invalid)?;
                let sub = parse_component(sub, 4, Self::MAX_SUB_SHORT).ok_or_else(invalid)?;
                Ok(Self::with_raw((main << 11) | sub, GroupAddressType::Short))
            }
            (Some(main), Some(middle), Some(sub), None) => {
                let main = parse_component(main, 2, u16::from(Self::MAX_MAIN)).ok_or_else(invalid)?;
                let middle =
                    parse_component(middle, 1, u16::from(Self::MAX_MIDDLE)).ok_or_else(invalid)?;
                let sub = parse_component(sub, 3, 255).ok_or_else(invalid)?;
                Ok(Self::with_raw((main << 11) | (middle << 8) | sub, GroupAddressType::Long))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level_valid() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), Some(1));
        assert_eq!(addr.middle(), Some(2));
        assert_eq!(addr.sub(), 3);
    }

    #[test]
    fn test_new_3level_invalid() {
        assert!(GroupAddress::new(32, 0, 0).is_err());
        assert!(GroupAddress::new(0, 8, 0).is_err());
    }

    #[test]
    fn test_new_short() {
        let addr = GroupAddress::new_short(1, 234).unwrap();
        assert_eq!(addr.to_string(), "1/234");
        assert!(GroupAddress::new_short(0, 2048).is_err());
    }

    #[test]
    fn test_valid_literals() {
        let cases = [
            ("0/0", 0),
            ("0/2047", 2047),
            ("0/0/255", 255),
            ("0/1/11", 267),
            ("0/1/111", 367),
            ("0/7/255", 2047),
            ("1/0", 2048),
            ("1/0/0", 2048),
            ("1/1/111", 2415),
            ("1/7/255", 4095),
            ("31/7/255", 65535),
            ("1", 1),
            ("0", 0),
            ("65535", 65535),
        ];
        for (literal, raw) in cases {
            let addr: GroupAddress = literal.parse().unwrap();
            assert_eq!(addr.raw(), raw, "literal {literal}");
        }
    }

    #[test]
    fn test_non_string_inputs() {
        assert_eq!(GroupAddress::from_bytes([0xFF, 0xFF]).raw(), 65535);
        assert_eq!(GroupAddress::from(65535u16).raw(), 65535);
        assert_eq!(GroupAddress::default().raw(), 0);
        assert!(GroupAddress::try_from(65536u32).unwrap_err().is_address_parse());
    }

    #[test]
    fn test_invalid_literals() {
        for literal in [
            "0/2049", "0/8/0", "0/0/256", "32/0", "0/0a", "a0/0", "abc", "1.1.1", "0.0", "65536",
            "1/1/1/1", "", "/1",
        ] {
            let err = literal.parse::<GroupAddress>().unwrap_err();
            assert!(err.is_address_parse(), "literal {literal}");
        }
    }

    #[test]
    fn test_accessors_per_type() {
        let raw = GroupAddress::from_raw(2415);
        let free = raw.with_type(GroupAddressType::Free);
        assert_eq!(free.main(), None);
        assert_eq!(free.middle(), None);
        assert_eq!(free.sub(), 2415);

        let short = raw.with_type(GroupAddressType::Short);
        assert_eq!(short.main(), Some(1));
        assert_eq!(short.middle(), None);
        assert_eq!(short.sub(), 367);

        let long = raw.with_type(GroupAddressType::Long);
        assert_eq!(long.main(), Some(1));
        assert_eq!(long.middle(), Some(1));
        assert_eq!(long.sub(), 111);
    }

    #[test]
    fn test_display_per_type() {
        let zero = GroupAddress::from_raw(0);
        assert_eq!(zero.with_type(GroupAddressType::Free).to_string(), "0");
        assert_eq!(zero.with_type(GroupAddressType::Short).to_string(), "0/0");
        assert_eq!(zero.with_type(GroupAddressType::Long).to_string(), "0/0/0");
    }

    #[test]
    fn test_parse_format_round_trip() {
        for literal in ["1/1/111", "31/7/255", "1/367", "0/2047", "2415"] {
            let addr: GroupAddress = literal.parse().unwrap();
            assert_eq!(addr.to_string(), literal);
        }
    }

    #[test]
    fn test_equality_ignores_presentation() {
        let long: GroupAddress = "1/1/111".parse().unwrap();
        let short: GroupAddress = "1/367".parse().unwrap();
        let free: GroupAddress = "2415".parse().unwrap();
        assert_eq!(long, short);
        assert_eq!(short, free);
    }

    #[test]
    fn test_encode_decode() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        let mut buf = [0u8; 2];
        addr.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x0A, 0x03]);
        assert_eq!(GroupAddress::decode(&buf).unwrap(), addr);
    }
}
