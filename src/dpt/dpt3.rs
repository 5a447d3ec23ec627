//! DPT 3.xxx - 4-bit controlled (dimming and blinds)
//!
//! ## Format
//!
//! ```text
//! ┌─────────┬─────────────┐
//! │ Control │  Stepcode   │
//! │  (1b)   │    (3b)     │
//! └─────────┴─────────────┘
//!    Bit 3     Bits 0-2
//! ```
//!
//! Three views of the same nibble are provided:
//! - [`DptControlStepCode`]: the raw `{control, step_code}` pair
//! - [`DptControlStepwise`]: a signed percentage step (`±100, ±50, ... ±1, 0`)
//! - [`DptStartStopDimming`] / [`DptStartStopBlinds`]: start moving or stop
//!
//! The blinds directions share their wire values with the dimming ones:
//! up is encoded like decrease and down like increase.

use core::fmt;

use super::{fixed, DptCodec};
use crate::error::{KnxError, Result};

/// Highest raw value of a 4-bit datapoint.
const MAX_NIBBLE: u8 = 0x0F;
const CONTROL_BIT: u8 = 0x08;
const STEP_MASK: u8 = 0x07;

fn check_nibble(raw: &[u8]) -> Result<u8> {
    let [byte] = fixed::<1>(raw)?;
    if byte > MAX_NIBBLE {
        return Err(KnxError::conversion(byte));
    }
    Ok(byte)
}

/// Decoded control nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlStepCode {
    /// Direction bit: false = decrease/up, true = increase/down
    pub control: bool,
    /// Step code (0 = break, 1-7 = 1..64 intervals)
    pub step_code: u8,
}

/// DPT 3 raw control/step-code pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptControlStepCode;

impl DptCodec for DptControlStepCode {
    type Value = ControlStepCode;
    type Raw = [u8; 1];

    const IDENTIFIER: &'static str = "3";
    const PAYLOAD_LENGTH: usize = 1;

    fn to_knx(value: &ControlStepCode) -> Result<[u8; 1]> {
        if value.step_code > STEP_MASK {
            return Err(KnxError::conversion(value));
        }
        Ok([(u8::from(value.control) << 3) | value.step_code])
    }

    fn from_knx(raw: &[u8]) -> Result<ControlStepCode> {
        let byte = check_nibble(raw)?;
        Ok(ControlStepCode {
            control: byte & CONTROL_BIT != 0,
            step_code: byte & STEP_MASK,
        })
    }
}

/// Percentage change per step code. Index is the step code.
const STEPWISE_PERCENT: [i32; 8] = [0, 100, 50, 25, 12, 6, 3, 1];

/// DPT 3.007 as a signed relative percentage.
///
/// Only the exact staircase values are accepted: `0, ±1, ±3, ±6, ±12, ±25, ±50, ±100`.
/// Both `0x0` and `0x8` decode to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptControlStepwise;

impl DptCodec for DptControlStepwise {
    type Value = i32;
    type Raw = [u8; 1];

    const IDENTIFIER: &'static str = "3.007";
    const PAYLOAD_LENGTH: usize = 1;
    const UNIT: &'static str = "%";

    fn to_knx(value: &i32) -> Result<[u8; 1]> {
        let magnitude = value.unsigned_abs();
        let step_code = STEPWISE_PERCENT
            .iter()
            .position(|p| p.unsigned_abs() == magnitude)
            .ok_or_else(|| KnxError::conversion(value))?;
        let control = if *value > 0 { CONTROL_BIT } else { 0 };
        Ok([control | step_code as u8])
    }

    fn from_knx(raw: &[u8]) -> Result<i32> {
        let byte = check_nibble(raw)?;
        let percent = STEPWISE_PERCENT[usize::from(byte & STEP_MASK)];
        Ok(if byte & CONTROL_BIT != 0 { percent } else { -percent })
    }
}

/// Direction of a start/stop dimming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DimmingDirection {
    Decrease = 0,
    Increase = 1,
    Stop = 2,
}

/// Direction of a start/stop blinds command.
///
/// `Up` and `Down` share the discriminants (and wire values) of
/// [`DimmingDirection::Decrease`] and [`DimmingDirection::Increase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BlindsDirection {
    Up = 0,
    Down = 1,
    Stop = 2,
}

impl fmt::Display for DimmingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Increase => "Increase",
            Self::Decrease => "Decrease",
            Self::Stop => "Stop",
        })
    }
}

impl fmt::Display for BlindsDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Stop => "Stop",
        })
    }
}

impl From<BlindsDirection> for DimmingDirection {
    fn from(direction: BlindsDirection) -> Self {
        match direction {
            BlindsDirection::Up => Self::Decrease,
            BlindsDirection::Down => Self::Increase,
            BlindsDirection::Stop => Self::Stop,
        }
    }
}

impl From<DimmingDirection> for BlindsDirection {
    fn from(direction: DimmingDirection) -> Self {
        match direction {
            DimmingDirection::Decrease => Self::Up,
            DimmingDirection::Increase => Self::Down,
            DimmingDirection::Stop => Self::Stop,
        }
    }
}

fn encode_direction(direction: DimmingDirection) -> [u8; 1] {
    match direction {
        DimmingDirection::Increase => [CONTROL_BIT | 1],
        DimmingDirection::Decrease => [1],
        DimmingDirection::Stop => [0],
    }
}

fn decode_direction(raw: &[u8]) -> Result<DimmingDirection> {
    let byte = check_nibble(raw)?;
    Ok(match byte {
        0 | CONTROL_BIT => DimmingDirection::Stop,
        b if b > CONTROL_BIT => DimmingDirection::Increase,
        _ => DimmingDirection::Decrease,
    })
}

/// DPT 3.007 reduced to start increasing, start decreasing or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptStartStopDimming;

impl DptCodec for DptStartStopDimming {
    type Value = DimmingDirection;
    type Raw = [u8; 1];

    const IDENTIFIER: &'static str = "3.007";
    const PAYLOAD_LENGTH: usize = 1;

    fn to_knx(value: &DimmingDirection) -> Result<[u8; 1]> {
        Ok(encode_direction(*value))
    }

    fn from_knx(raw: &[u8]) -> Result<DimmingDirection> {
        decode_direction(raw)
    }
}

/// DPT 3.008 reduced to start moving up, start moving down or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptStartStopBlinds;

impl DptCodec for DptStartStopBlinds {
    type Value = BlindsDirection;
    type Raw = [u8; 1];

    const IDENTIFIER: &'static str = "3.008";
    const PAYLOAD_LENGTH: usize = 1;

    fn to_knx(value: &BlindsDirection) -> Result<[u8; 1]> {
        Ok(encode_direction((*value).into()))
    }

    fn from_knx(raw: &[u8]) -> Result<BlindsDirection> {
        decode_direction(raw).map(Into::into)
    }
}
