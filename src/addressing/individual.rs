//! KNX Individual Address implementation.
//!
//! Individual addresses identify physical devices on the KNX bus.
//! Format: Area.Line.Device (e.g., 1.1.5)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Device: 0-255 (8 bits)
//!
//! A bare integer 0-65535 is accepted as the free form of the raw value.

use super::parse_component;
use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Individual Address (Area.Line.Device)
///
/// # Examples
///
/// ```
/// use knx_tunnel::IndividualAddress;
///
/// let addr = IndividualAddress::new(1, 1, 5).unwrap();
/// assert_eq!(addr.to_string(), "1.1.5");
///
/// let addr: IndividualAddress = "11.11.111".parse().unwrap();
/// assert_eq!(addr.raw(), 47983);
///
/// let addr: IndividualAddress = "123".parse().unwrap();
/// assert_eq!(addr.raw(), 123);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Create a new Individual Address from components.
    ///
    /// # Errors
    ///
    /// Returns an address parse error if `area` or `line` exceed 15.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            let mut token = heapless::String::<16>::new();
            let _ = fmt::Write::write_fmt(&mut token, format_args!("{area}.{line}.{device}"));
            return Err(KnxError::invalid_individual_address(&token));
        }
        Ok(Self::from_raw(
            (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        ))
    }

    /// Create from a packed 16-bit value.
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// Parse `area.line.device` in a const context, panicking when invalid.
    /// Whitespace is skipped. Backs the [`ia!`](crate::ia) macro.
    #[doc(hidden)]
    pub const fn from_literal(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut parts = [0u16; 3];
        let mut index = 0;
        let mut digits = 0;
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'.' {
                assert!(digits > 0 && index < 2, "Individual address must be area.line.device");
                index += 1;
                digits = 0;
            } else if b.is_ascii_digit() {
                assert!(digits < 3, "Individual address component too long");
                parts[index] = parts[index] * 10 + (b - b'0') as u16;
                digits += 1;
            } else {
                assert!(b.is_ascii_whitespace(), "Individual address must be area.line.device");
            }
            i += 1;
        }
        assert!(digits > 0 && index == 2, "Individual address must be area.line.device");
        assert!(parts[0] <= Self::MAX_AREA as u16, "Area must be 0-15");
        assert!(parts[1] <= Self::MAX_LINE as u16, "Line must be 0-15");
        assert!(parts[2] <= 255, "Device must be 0-255");
        Self::from_raw((parts[0] << 12) | (parts[1] << 8) | parts[2])
    }

    /// Create from the two wire bytes `(high, low)`.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self::from_raw(u16::from_be_bytes(bytes))
    }

    /// Get raw u16 value
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Get area component
    #[inline]
    pub const fn area(self) -> u8 {
        (self.raw >> 12) as u8
    }

    /// Get line component
    #[inline]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Get device component
    #[inline]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// True for a line coupler address (device part is zero).
    #[inline]
    pub const fn is_line(self) -> bool {
        self.device() == 0
    }

    /// True for an end device address (device part is non-zero).
    #[inline]
    pub const fn is_device(self) -> bool {
        self.device() != 0
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

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}

impl From<[u8; 2]> for IndividualAddress {
    #[inline]
    fn from(bytes: [u8; 2]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<IndividualAddress> for u16 {
    #[inline]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl TryFrom<u32> for IndividualAddress {
    type Error = KnxError;

    fn try_from(value: u32) -> Result<Self> {
        u16::try_from(value).map(Self::from_raw).map_err(|_| {
            let mut token = heapless::String::<16>::new();
            let _ = fmt::Write::write_fmt(&mut token, format_args!("{value}"));
            KnxError::invalid_individual_address(&token)
        })
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KnxError::invalid_individual_address(s);

        if !s.contains('.') {
            return parse_component(s, 5, u16::MAX)
                .map(Self::from_raw)
                .ok_or_else(invalid);
        }

        let mut parts = s.split('.');
        let (Some(area), Some(line), Some(device), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let area = parse_component(area, 2, u16::from(Self::MAX_AREA)).ok_or_else(invalid)?;
        let line = parse_component(line, 2, u16::from(Self::MAX_LINE)).ok_or_else(invalid)?;
        let device = parse_component(device, 3, 255).ok_or_else(invalid)?;

        Ok(Self::from_raw((area << 12) | (line << 8) | device))
    }
}
