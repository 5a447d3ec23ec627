//! KNX Datapoint Types (DPT)
//!
//! Stateless codecs between application values and the raw bytes carried
//! in a group value telegram. Each codec declares a fixed payload length
//! and a unit string.
//!
//! ## Supported DPT Families
//!
//! - **DPT 3.xxx** - 4-bit control/step code, stepwise percentage, start/stop dimming and blinds
//! - **DPT 9.xxx** - 2-byte float: temperature, lux, humidity, ppm, voltage, enthalpy and generic values
//! - **DPT 14.xxx** - 4-byte IEEE float: current, potential, frequency, phase angle, power and generic values
//! - **DPT 16.000** - 14-byte ASCII string
//!
//! ## Usage
//!
//! ```rust
//! use knx_tunnel::dpt::{DptCodec, DptControlStepwise, DptString};
//!
//! assert_eq!(DptControlStepwise::to_knx(&-25)?, [0x03]);
//! assert_eq!(DptControlStepwise::from_knx(&[0x0B])?, 25);
//!
//! let raw = DptString::to_knx_str("KNX is OK")?;
//! assert_eq!(DptString::from_knx(&raw)?.as_str(), "KNX is OK");
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};

pub mod dpt14;
pub mod dpt16;
pub mod dpt3;
pub mod dpt9;

#[doc(inline)]
pub use dpt14::{
    Dpt4ByteFloat, DptElectricCurrent, DptElectricPotential, DptFrequency, DptPhaseAngleDeg, DptPower,
};
#[doc(inline)]
pub use dpt16::DptString;
#[doc(inline)]
pub use dpt3::{
    BlindsDirection, ControlStepCode, DimmingDirection, DptControlStepCode, DptControlStepwise,
    DptStartStopBlinds, DptStartStopDimming,
};
#[doc(inline)]
pub use dpt9::{
    Dpt2ByteFloat, DptEnthalpy, DptHumidity, DptLux, DptPartsPerMillion, DptTemperature, DptVoltage,
};

/// Capacity of a [`DptArray`] payload.
pub const MAX_ARRAY_LEN: usize = 64;

/// A datapoint codec.
///
/// `to_knx` and `from_knx` are pure and round-trip for every value in the
/// declared domain. Values outside it, and raw data of the wrong length,
/// fail with a conversion error.
pub trait DptCodec {
    /// Application value.
    type Value;
    /// Encoded form, always [`Self::PAYLOAD_LENGTH`] bytes long.
    type Raw: AsRef<[u8]>;

    /// DPT number, e.g. "3.007".
    const IDENTIFIER: &'static str;
    /// Number of raw bytes.
    const PAYLOAD_LENGTH: usize;
    /// Unit of the value, empty when dimensionless.
    const UNIT: &'static str = "";

    /// Encode an application value.
    fn to_knx(value: &Self::Value) -> Result<Self::Raw>;

    /// Decode raw bytes.
    fn from_knx(raw: &[u8]) -> Result<Self::Value>;
}

/// Check the length of raw codec input.
pub(crate) fn fixed<const N: usize>(raw: &[u8]) -> Result<[u8; N]> {
    raw.try_into().map_err(|_| KnxError::conversion(raw))
}

/// Up to six bits packed into the APCI octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DptBinary(u8);

impl DptBinary {
    /// Largest value that fits the six APCI data bits.
    pub const MAX: u8 = 0x3F;

    /// Create a binary payload.
    ///
    /// # Errors
    ///
    /// Conversion error for values above [`Self::MAX`].
    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(KnxError::conversion(value));
        }
        Ok(Self(value))
    }

    /// The packed value.
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Bytes following the APCI octets. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DptArray(heapless::Vec<u8, MAX_ARRAY_LEN>);

impl DptArray {
    /// Create an array payload.
    ///
    /// # Errors
    ///
    /// Conversion error when `bytes` is empty or exceeds [`MAX_ARRAY_LEN`].
    /// An empty array would encode like a zero binary payload.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(KnxError::conversion(0usize));
        }
        heapless::Vec::from_slice(bytes)
            .map(Self)
            .map_err(|_| KnxError::conversion(bytes.len()))
    }

    /// The payload bytes.
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.0
    }
}

/// Value carried by a group value write or response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    Binary(DptBinary),
    Array(DptArray),
}

impl Payload {
    /// Binary payload shorthand.
    ///
    /// # Errors
    ///
    /// Conversion error for values above [`DptBinary::MAX`].
    pub fn binary(value: u8) -> Result<Self> {
        DptBinary::new(value).map(Self::Binary)
    }

    /// Array payload shorthand.
    ///
    /// # Errors
    ///
    /// Conversion error when `bytes` is empty or too long.
    pub fn array(bytes: &[u8]) -> Result<Self> {
        DptArray::new(bytes).map(Self::Array)
    }

    /// Array payload holding the output of a codec.
    ///
    /// # Errors
    ///
    /// Propagates the codec's conversion error.
    pub fn encode<C: DptCodec>(value: &C::Value) -> Result<Self> {
        let raw = C::to_knx(value)?;
        Self::array(raw.as_ref())
    }
}
