//! DPT 9.xxx - 2-byte Float (16-bit floating point)
//!
//! ## Format
//!
//! ```text
//! Byte 0: SEEE EMMM
//! Byte 1: MMMM MMMM
//!
//! S = Sign bit (bit 15)
//! E = Exponent (bits 14-11: 4 bits, unsigned, range 0-15)
//! M = Mantissa (bits 10-0, two's complement together with S)
//!
//! Value = (0.01 * M) * 2^E
//! ```
//!
//! ## Range
//!
//! - Min: -671088.64
//! - Max: +670760.96
//!
//! The mantissa is rounded half to even, so 500.00 encodes as `2E 1A`
//! (499.84) rather than `2E 1B` (500.16).

use super::{fixed, DptCodec};
use crate::error::{KnxError, Result};

const MANTISSA_MIN: f64 = -2048.0;
const MANTISSA_MAX: f64 = 2047.0;
const MAX_EXPONENT: u8 = 15;

/// Round to the nearest integer, ties to even. `f64::round_ties_even` needs std.
fn round_half_even(x: f64) -> i64 {
    let truncated = x as i64;
    let frac = x - truncated as f64;
    let odd = truncated % 2 != 0;
    if frac > 0.5 || (frac == 0.5 && odd) {
        truncated + 1
    } else if frac < -0.5 || (frac == -0.5 && odd) {
        truncated - 1
    } else {
        truncated
    }
}

fn encode_float(value: f32, min: f32, max: f32) -> Result<[u8; 2]> {
    if value.is_nan() || value < min || value > max {
        return Err(KnxError::conversion(value));
    }

    let mut scaled = f64::from(value) * 100.0;
    let mut exponent = 0u8;
    while !(MANTISSA_MIN..=MANTISSA_MAX).contains(&scaled) {
        exponent += 1;
        scaled /= 2.0;
    }
    let mut mantissa = round_half_even(scaled);
    if mantissa > MANTISSA_MAX as i64 {
        exponent += 1;
        mantissa = round_half_even(scaled / 2.0);
    }
    if exponent > MAX_EXPONENT {
        return Err(KnxError::conversion(value));
    }

    let sign = mantissa < 0;
    let bits = (if sign { mantissa + 2048 } else { mantissa }) as u16 & 0x07FF;
    let word = (u16::from(sign) << 15) | (u16::from(exponent) << 11) | bits;
    Ok(word.to_be_bytes())
}

fn decode_float(raw: &[u8], min: f32, max: f32) -> Result<f32> {
    let word = u16::from_be_bytes(fixed::<2>(raw)?);
    let exponent = (word >> 11) & 0x0F;
    let mut mantissa = i32::from(word & 0x07FF);
    if word & 0x8000 != 0 {
        mantissa -= 2048;
    }
    let value = (f64::from(mantissa) * f64::from(1u32 << exponent) / 100.0) as f32;
    if value < min || value > max {
        return Err(KnxError::conversion(value));
    }
    Ok(value)
}

/// Declares a 2-byte float codec with its own range and unit.
macro_rules! float_2byte {
    ($(#[$meta:meta])* $name:ident, $id:literal, $unit:literal, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl $name {
            /// Smallest accepted value.
            pub const VALUE_MIN: f32 = $min;
            /// Largest accepted value.
            pub const VALUE_MAX: f32 = $max;
        }

        impl DptCodec for $name {
            type Value = f32;
            type Raw = [u8; 2];

            const IDENTIFIER: &'static str = $id;
            const PAYLOAD_LENGTH: usize = 2;
            const UNIT: &'static str = $unit;

            fn to_knx(value: &f32) -> Result<[u8; 2]> {
                encode_float(*value, Self::VALUE_MIN, Self::VALUE_MAX)
            }

            fn from_knx(raw: &[u8]) -> Result<f32> {
                decode_float(raw, Self::VALUE_MIN, Self::VALUE_MAX)
            }
        }
    };
}

float_2byte!(
    /// DPT 9 generic 2-byte float.
    Dpt2ByteFloat, "9", "", -671_088.64, 670_760.96
);
float_2byte!(
    /// DPT 9.001 temperature. The lower bound is absolute zero, rounded.
    DptTemperature, "9.001", "°C", -273.0, 670_760.0
);
float_2byte!(
    /// DPT 9.004 illuminance.
    DptLux, "9.004", "lx", 0.0, 670_760.0
);
float_2byte!(
    /// DPT 9.007 relative humidity.
    DptHumidity, "9.007", "%", 0.0, 670_760.0
);
float_2byte!(
    /// DPT 9.008 air quality.
    DptPartsPerMillion, "9.008", "ppm", 0.0, 670_760.0
);
float_2byte!(
    /// DPT 9.020 voltage.
    DptVoltage, "9.020", "mV", -670_760.0, 670_760.0
);
float_2byte!(
    /// Enthalpy. No fixed sub number is assigned.
    DptEnthalpy, "9.*", "H", -670_760.0, 670_760.0
);
