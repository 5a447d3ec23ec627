//! Remote values: the last known state of a group address, kept in sync
//! from telegrams.

use crate::addressing::GroupAddress;
use crate::dpt::dpt16::STRING_LENGTH;
use crate::dpt::{DptArray, DptCodec, DptString, Payload};
use crate::error::{KnxError, Result};
use crate::telegram::{Apci, DestinationAddress, Telegram};

/// Remote value of a DPT 16.000 ASCII string.
///
/// ```rust
/// use knx_tunnel::remote_value::RemoteValueString;
/// use knx_tunnel::telegram::{Apci, DestinationAddress, Telegram};
/// use knx_tunnel::dpt::Payload;
/// use knx_tunnel::ga;
///
/// let mut remote = RemoteValueString::new(ga!(1/2/3));
/// let write = remote.set("asdf")?;
/// assert_eq!(write.destination, DestinationAddress::Group(ga!(1/2/3)));
///
/// let update = Telegram::new(ga!(1/2/3), Apci::GroupValueWrite(Payload::array(b"AAAAABBBBBCCCC")?));
/// assert!(remote.process(&update));
/// assert_eq!(remote.value(), Some("AAAAABBBBBCCCC"));
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValueString {
    group_address: GroupAddress,
    value: Option<heapless::String<STRING_LENGTH>>,
}

impl RemoteValueString {
    pub const fn new(group_address: GroupAddress) -> Self {
        Self {
            group_address,
            value: None,
        }
    }

    #[inline]
    pub const fn group_address(&self) -> GroupAddress {
        self.group_address
    }

    /// Last value seen on the bus.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Check that `payload` can hold a string: a 14-byte array.
    ///
    /// # Errors
    ///
    /// Conversion error for binary payloads and arrays of another length.
    pub fn payload_valid(payload: &Payload) -> Result<&DptArray> {
        match payload {
            Payload::Array(array) if array.value().len() == STRING_LENGTH => Ok(array),
            Payload::Array(array) => Err(KnxError::conversion(array.value())),
            Payload::Binary(binary) => Err(KnxError::conversion(binary.value())),
        }
    }

    /// Encode a string payload.
    ///
    /// # Errors
    ///
    /// Conversion error for non-ASCII text or more than 14 characters.
    pub fn to_knx(value: &str) -> Result<Payload> {
        Payload::array(&DptString::to_knx_str(value)?)
    }

    /// Decode a string payload.
    ///
    /// # Errors
    ///
    /// Conversion error when the payload is not a valid string array.
    pub fn from_knx(payload: &Payload) -> Result<heapless::String<STRING_LENGTH>> {
        DptString::from_knx(Self::payload_valid(payload)?.value())
    }

    /// Telegram writing `value` to the group address.
    ///
    /// # Errors
    ///
    /// Conversion error when `value` cannot be encoded.
    pub fn set(&self, value: &str) -> Result<Telegram> {
        let payload = Self::to_knx(value)?;
        Ok(Telegram::new(self.group_address, Apci::GroupValueWrite(payload)))
    }

    /// Telegram requesting the current value.
    pub fn read(&self) -> Telegram {
        Telegram::new(self.group_address, Apci::GroupValueRead)
    }

    /// Update from a telegram. Returns whether the value was taken.
    ///
    /// Only writes and responses addressed to the group address count. An
    /// invalid payload is logged and leaves the value unchanged.
    pub fn process(&mut self, telegram: &Telegram) -> bool {
        if telegram.destination != DestinationAddress::Group(self.group_address) {
            return false;
        }
        let payload = match &telegram.payload {
            Apci::GroupValueWrite(payload) | Apci::GroupValueResponse(payload) => payload,
            _ => return false,
        };
        match Self::from_knx(payload) {
            Ok(value) => {
                self.value = Some(value);
                true
            }
            Err(_) => {
                crate::knx_log!(
                    warn,
                    "Invalid string payload for group address {}",
                    self.group_address.raw()
                );
                false
            }
        }
    }
}
