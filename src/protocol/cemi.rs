//! Common External Message Interface (cEMI) data link layer frames.
//!
//! cEMI is the container that carries a KNX telegram inside a KNXnet/IP
//! tunnelling request or routing indication.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable, skipped)      │
//! ├──────────────────────────────────────────┤
//! │ Flags (Control Field 1 + 2, 2 bytes)     │
//! │ Source Address (2 bytes)                 │
//! │ Destination Address (2 bytes)            │
//! │ MPDU Length (1 byte)                     │
//! │ TPCI/APCI (2 bytes)                      │
//! │ Data (MPDU Length - 1 bytes)             │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::addressing::GroupAddress;
//! use knx_tunnel::dpt::Payload;
//! use knx_tunnel::protocol::cemi::CemiFrame;
//! use knx_tunnel::protocol::constants::CemiMessageCode;
//! use knx_tunnel::telegram::{Apci, Telegram};
//!
//! let telegram = Telegram::new(
//!     GroupAddress::new(1, 2, 3)?,
//!     Apci::GroupValueWrite(Payload::binary(1)?),
//! );
//! let cemi = CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataReq);
//!
//! let mut buf = [0u8; 32];
//! let len = cemi.to_knx(&mut buf)?;
//! assert_eq!(&buf[..len], &[0x11, 0x00, 0xBC, 0xE0, 0x00, 0x00, 0x0A, 0x03, 0x01, 0x00, 0x81]);
//!
//! let (parsed, consumed) = CemiFrame::from_knx(&buf[..len])?;
//! assert_eq!(consumed, len);
//! assert_eq!(parsed.telegram()?.destination, telegram.destination);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::cemi_flags::{
    BROADCAST, CONFIRM_NO_ERROR, DESTINATION_GROUP_ADDRESS, DO_NOT_REPEAT, FRAME_TYPE_STANDARD,
    HOP_COUNT_1ST, HOP_COUNT_MASK, NO_ACK_REQUESTED, PRIORITY_LOW,
};
use crate::protocol::constants::CemiMessageCode;
use crate::telegram::{Apci, DestinationAddress, Telegram, TelegramDirection};

/// Message code, additional info length, flags, addresses and `mpdu_len`
/// plus the first TPCI/APCI octet.
const MIN_DATA_LINK_SIZE: usize = 11;

/// KNX telegram priority (bits 3-2 of control field 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    /// System priority (highest)
    System = 0b00,
    /// Normal priority
    Normal = 0b01,
    /// Urgent priority
    Urgent = 0b10,
    /// Low priority (default for group telegrams)
    Low = 0b11,
}

impl Priority {
    /// Convert two bits to `Priority`
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }
}

/// A cEMI `L_Data` frame.
///
/// Fields left `None` fail the encode with a missing-field error, so a
/// frame is either parsed from the wire or built from a [`Telegram`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CemiFrame {
    pub code: CemiMessageCode,
    /// Control field 1 in the high byte, control field 2 in the low byte.
    pub flags: u16,
    pub src_addr: Option<IndividualAddress>,
    pub dst_addr: Option<DestinationAddress>,
    /// MPDU length as read from the wire. Recomputed on encode.
    pub mpdu_len: u8,
    pub payload: Option<Apci>,
}

impl Default for CemiFrame {
    fn default() -> Self {
        Self::new(CemiMessageCode::LDataInd)
    }
}

impl CemiFrame {
    /// Empty frame with the given message code.
    pub const fn new(code: CemiMessageCode) -> Self {
        Self {
            code,
            flags: 0,
            src_addr: None,
            dst_addr: None,
            mpdu_len: 0,
            payload: None,
        }
    }

    /// Build a frame carrying `telegram`.
    pub fn from_telegram(telegram: &Telegram, code: CemiMessageCode) -> Self {
        let mut frame = Self::new(code);
        frame.src_addr = Some(telegram.source);
        frame.set_telegram(telegram);
        frame
    }

    /// Take destination and payload from `telegram` and reset the flags.
    ///
    /// Flags become standard frame, do not repeat, broadcast, low priority,
    /// no ack, no error and hop count 6, plus the group bit for a group
    /// destination. The source address is left untouched.
    pub fn set_telegram(&mut self, telegram: &Telegram) {
        self.flags = FRAME_TYPE_STANDARD
            | DO_NOT_REPEAT
            | BROADCAST
            | PRIORITY_LOW
            | NO_ACK_REQUESTED
            | CONFIRM_NO_ERROR
            | HOP_COUNT_1ST;
        if telegram.destination.is_group() {
            self.flags |= DESTINATION_GROUP_ADDRESS;
        }
        self.dst_addr = Some(telegram.destination);
        self.payload = Some(telegram.payload.clone());
    }

    /// The telegram carried by this frame.
    ///
    /// Frames received from the gateway (`L_Data.ind`) are incoming, the
    /// rest outgoing.
    pub fn telegram(&self) -> Result<Telegram> {
        let direction = if self.code == CemiMessageCode::LDataInd {
            TelegramDirection::Incoming
        } else {
            TelegramDirection::Outgoing
        };
        Ok(Telegram {
            source: self.src_addr.ok_or_else(|| KnxError::missing_field("src_addr"))?,
            destination: self.dst_addr.ok_or_else(|| KnxError::missing_field("dst_addr"))?,
            direction,
            payload: self
                .payload
                .clone()
                .ok_or_else(|| KnxError::missing_field("payload"))?,
        })
    }

    /// Replace the hop count (0-7).
    pub fn set_hops(&mut self, hops: u8) {
        self.flags &= !HOP_COUNT_MASK;
        self.flags |= (u16::from(hops) << 4) & HOP_COUNT_MASK;
    }

    /// Hop count from control field 2.
    #[inline]
    pub const fn hops(&self) -> u8 {
        ((self.flags & HOP_COUNT_MASK) >> 4) as u8
    }

    /// Priority from control field 1.
    #[inline]
    pub const fn priority(&self) -> Priority {
        Priority::from_u8((self.flags >> 10) as u8)
    }

    /// Whether the group bit of control field 2 is set.
    #[inline]
    pub const fn is_group_destination(&self) -> bool {
        self.flags & DESTINATION_GROUP_ADDRESS != 0
    }

    /// Encoded length: 10 bytes of fixed fields plus the APDU after the TPCI octet.
    pub fn calculated_length(&self) -> Result<usize> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| KnxError::missing_field("payload"))?;
        Ok(10 + payload.calculated_length())
    }

    /// Parse a cEMI frame. Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - `UnhandleableMessage` for a message code with no defined meaning
    /// - `UnsupportedMessage` for codes other than `L_Data.req/ind/con`, or an unknown APCI
    /// - `FrameTooSmall` when the fixed fields are not all present
    /// - `MalformedFrame` when `mpdu_len` disagrees with the bytes present
    pub fn from_knx(raw: &[u8]) -> Result<(Self, usize)> {
        let first = *raw.first().ok_or_else(KnxError::frame_too_small)?;
        let code = CemiMessageCode::from_u8(first).ok_or_else(|| {
            crate::knx_log!(debug, "cEMI message code 0x{:02X} not handleable", first);
            KnxError::unhandleable_message()
        })?;
        if !code.is_data_link() {
            crate::knx_log!(debug, "cEMI message code 0x{:02X} not implemented", first);
            return Err(KnxError::unsupported_message());
        }
        Self::from_knx_data_link_layer(code, raw)
    }

    fn from_knx_data_link_layer(code: CemiMessageCode, cemi: &[u8]) -> Result<(Self, usize)> {
        if cemi.len() < MIN_DATA_LINK_SIZE {
            return Err(KnxError::frame_too_small());
        }
        // Additional information is skipped, only its length is honoured.
        let addil = usize::from(cemi[1]);
        if cemi.len() < MIN_DATA_LINK_SIZE + addil {
            return Err(KnxError::frame_too_small());
        }
        let service = &cemi[2 + addil..];

        let flags = u16::from_be_bytes([service[0], service[1]]);
        let src_addr = IndividualAddress::from_bytes([service[2], service[3]]);
        let dst_bytes = [service[4], service[5]];
        let dst_addr = if flags & DESTINATION_GROUP_ADDRESS != 0 {
            DestinationAddress::Group(GroupAddress::from_bytes(dst_bytes))
        } else {
            DestinationAddress::Individual(IndividualAddress::from_bytes(dst_bytes))
        };
        let mpdu_len = service[6];

        let apdu = &service[7..];
        if apdu.len() != usize::from(mpdu_len) + 1 {
            crate::knx_log!(
                warn,
                "APDU LEN should be {} but is {}",
                mpdu_len,
                apdu.len()
            );
            return Err(KnxError::malformed_frame());
        }
        let payload = Apci::from_knx(apdu)?;

        let frame = Self {
            code,
            flags,
            src_addr: Some(src_addr),
            dst_addr: Some(dst_addr),
            mpdu_len,
            payload: Some(payload),
        };
        Ok((frame, 10 + addil + usize::from(mpdu_len)))
    }

    /// Encode into `buf`. Returns the number of bytes written.
    ///
    /// The additional info length is always 0 and `mpdu_len` is recomputed
    /// from the payload.
    ///
    /// # Errors
    ///
    /// - `MissingField("src_addr")`, `MissingField("dst_addr")` or `MissingField("payload")`
    /// - `BufferTooSmall` when `buf` cannot hold the frame
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| KnxError::missing_field("payload"))?;
        let src = self.src_addr.ok_or_else(|| KnxError::missing_field("src_addr"))?;
        let dst = self.dst_addr.ok_or_else(|| KnxError::missing_field("dst_addr"))?;

        let mpdu_len = payload.calculated_length();
        let len = 10 + mpdu_len;
        if buf.len() < len {
            return Err(KnxError::buffer_too_small());
        }
        let mpdu_len = u8::try_from(mpdu_len).map_err(|_| KnxError::conversion(mpdu_len))?;

        let mut flags = self.flags & !DESTINATION_GROUP_ADDRESS;
        if dst.is_group() {
            flags |= DESTINATION_GROUP_ADDRESS;
        }

        buf[0] = self.code.to_u8();
        buf[1] = 0x00;
        buf[2..4].copy_from_slice(&flags.to_be_bytes());
        buf[4..6].copy_from_slice(&src.to_bytes());
        buf[6..8].copy_from_slice(&dst.to_bytes());
        buf[8] = mpdu_len;
        payload.to_knx(&mut buf[9..len])?;
        Ok(len)
    }
}
