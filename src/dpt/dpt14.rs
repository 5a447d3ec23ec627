//! DPT 14.xxx - 4-byte Float (IEEE 754 single precision)
//!
//! ## Format
//!
//! ```text
//! Byte 0-3: SEEEEEEE EMMMMMMM MMMMMMMM MMMMMMMM (big-endian)
//! ```
//!
//! Every bit pattern is a value, including NaN, the infinities and -0.

use super::{fixed, DptCodec};
use crate::error::Result;

macro_rules! float_4byte {
    ($(#[$meta:meta])* $name:ident, $id:literal, $unit:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl DptCodec for $name {
            type Value = f32;
            type Raw = [u8; 4];

            const IDENTIFIER: &'static str = $id;
            const PAYLOAD_LENGTH: usize = 4;
            const UNIT: &'static str = $unit;

            fn to_knx(value: &f32) -> Result<[u8; 4]> {
                Ok(value.to_be_bytes())
            }

            fn from_knx(raw: &[u8]) -> Result<f32> {
                fixed::<4>(raw).map(f32::from_be_bytes)
            }
        }
    };
}

float_4byte!(
    /// DPT 14 generic 4-byte float.
    Dpt4ByteFloat, "14", ""
);
float_4byte!(
    /// DPT 14.019 electric current.
    DptElectricCurrent, "14.019", "A"
);
float_4byte!(
    /// DPT 14.027 electric potential.
    DptElectricPotential, "14.027", "V"
);
float_4byte!(
    /// DPT 14.033 frequency.
    DptFrequency, "14.033", "Hz"
);
float_4byte!(
    /// DPT 14.055 phase angle in degrees.
    DptPhaseAngleDeg, "14.055", "°"
);
float_4byte!(
    /// DPT 14.056 power.
    DptPower, "14.056", "W"
);
