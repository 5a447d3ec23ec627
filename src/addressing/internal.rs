//! Internal group addresses.
//!
//! Software-only group addresses that never reach the bus. Written as
//! `i<sep><name>` where the `i` is case-insensitive and `<sep>` is an optional
//! `-`, `_` or run of spaces. Names compare case-insensitively.

use crate::error::{KnxError, Result};
use core::fmt;
use core::hash::{Hash, Hasher};

/// Maximum length of an internal group address name, in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// A named, non wire-encodable group address.
///
/// ```
/// use knx_tunnel::InternalGroupAddress;
///
/// let a: InternalGroupAddress = "i-Kitchen Lights".parse().unwrap();
/// let b: InternalGroupAddress = "I kitchen lights".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.name(), "Kitchen Lights");
/// assert_eq!(a.to_string(), "i-Kitchen Lights");
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternalGroupAddress {
    name: heapless::String<MAX_NAME_LEN>,
}

impl InternalGroupAddress {
    /// The name, trimmed and with its original case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when `token` starts with the internal address prefix.
    pub(crate) fn has_prefix(token: &str) -> bool {
        token.starts_with(['i', 'I'])
    }
}

impl core::str::FromStr for InternalGroupAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KnxError::invalid_internal_address(s);

        let rest = s.strip_prefix(['i', 'I']).ok_or_else(invalid)?;
        let rest = rest
            .strip_prefix(['-', '_'])
            .unwrap_or_else(|| rest.trim_start_matches(' '));
        let name = rest.trim();
        if name.is_empty() {
            return Err(invalid());
        }

        let name = heapless::String::try_from(name).map_err(|_| invalid())?;
        Ok(Self { name })
    }
}

impl PartialEq for InternalGroupAddress {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for InternalGroupAddress {}

impl Hash for InternalGroupAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.name.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for InternalGroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i-{}", self.name)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InternalGroupAddress {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "i-{=str}", self.name.as_str());
    }
}
