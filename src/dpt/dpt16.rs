//! DPT 16.000 - ASCII string, fixed 14 bytes.
//!
//! Shorter strings are padded with NUL bytes; trailing NULs are stripped
//! on decode.

use super::{fixed, DptCodec};
use crate::error::{KnxError, Result};

/// Encoded length of a DPT 16 string.
pub const STRING_LENGTH: usize = 14;

/// DPT 16.000 ASCII string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptString;

impl DptString {
    /// Encode a `&str` without building a `heapless::String` first.
    ///
    /// # Errors
    ///
    /// Conversion error for non-ASCII text or text longer than 14 bytes.
    pub fn to_knx_str(value: &str) -> Result<[u8; STRING_LENGTH]> {
        if value.len() > STRING_LENGTH || !value.is_ascii() {
            return Err(KnxError::conversion(value));
        }
        let mut raw = [0u8; STRING_LENGTH];
        raw[..value.len()].copy_from_slice(value.as_bytes());
        Ok(raw)
    }
}

impl DptCodec for DptString {
    type Value = heapless::String<STRING_LENGTH>;
    type Raw = [u8; STRING_LENGTH];

    const IDENTIFIER: &'static str = "16.000";
    const PAYLOAD_LENGTH: usize = STRING_LENGTH;

    fn to_knx(value: &Self::Value) -> Result<Self::Raw> {
        Self::to_knx_str(value)
    }

    fn from_knx(raw: &[u8]) -> Result<Self::Value> {
        let raw = fixed::<STRING_LENGTH>(raw)?;
        let mut value = heapless::String::new();
        for &byte in raw.iter().filter(|b| **b != 0) {
            if !byte.is_ascii() {
                return Err(KnxError::conversion(&raw[..]));
            }
            // At most 14 pushes into a 14-byte string.
            let _ = value.push(char::from(byte));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNX_IS_OK: [u8; 14] = [
        0x4B, 0x4E, 0x58, 0x20, 0x69, 0x73, 0x20, 0x4F, 0x4B, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_encode_pads_with_zero() {
        assert_eq!(DptString::to_knx_str("KNX is OK").unwrap(), KNX_IS_OK);
    }

    #[test]
    fn test_decode_strips_padding() {
        assert_eq!(DptString::from_knx(&KNX_IS_OK).unwrap().as_str(), "KNX is OK");
    }

    #[test]
    fn test_full_length() {
        let raw = DptString::to_knx_str("AbCdEfGhIjKlMn").unwrap();
        assert_eq!(DptString::from_knx(&raw).unwrap().as_str(), "AbCdEfGhIjKlMn");
    }

    #[test]
    fn test_empty() {
        assert_eq!(DptString::to_knx_str("").unwrap(), [0u8; 14]);
        assert_eq!(DptString::from_knx(&[0u8; 14]).unwrap().as_str(), "");
    }

    #[test]
    fn test_too_long() {
        assert!(DptString::to_knx_str("AAAAABBBBBCCCCx").unwrap_err().is_conversion());
    }

    #[test]
    fn test_non_ascii() {
        assert!(DptString::to_knx_str("Grüße").is_err());
        let mut raw = [0u8; 14];
        raw[0] = 0xE4;
        assert!(DptString::from_knx(&raw).is_err());
    }

    #[test]
    fn test_wrong_length() {
        assert!(DptString::from_knx(&[0x41; 13]).is_err());
        assert!(DptString::from_knx(&[0x41; 15]).is_err());
    }

    #[test]
    fn test_codec_value_round_trip() {
        let value: heapless::String<14> = heapless::String::try_from("Hello").unwrap();
        let raw = DptString::to_knx(&value).unwrap();
        assert_eq!(DptString::from_knx(&raw).unwrap(), value);
        assert_eq!(DptString::PAYLOAD_LENGTH, 14);
    }
}
