//! Description Information Blocks (DIBs) carried by search and description responses.
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ Structure Len│ DIB Type     │   Data (len - 2)    │
//! │   (1 byte)   │   (1 byte)   │                     │
//! └──────────────┴──────────────┴─────────────────────┘
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::Ipv4Addr;
use crate::protocol::constants::{DIB_DEVICE_INFO, DIB_SUPP_SVC_FAMILIES};
use crate::protocol::frame::{require, require_buf};

/// Maximum number of DIBs kept per response.
pub const MAX_DIBS: usize = 8;
/// Maximum number of service families in one DIB.
pub const MAX_SERVICE_FAMILIES: usize = 16;
/// Maximum data bytes of a DIB type this crate does not interpret.
pub const MAX_GENERIC_DIB_DATA: usize = 64;
/// Length of the friendly name field.
pub const DEVICE_NAME_LEN: usize = 30;

/// DIBs of one response.
pub type Dibs = heapless::Vec<Dib, MAX_DIBS>;

/// Device information DIB (type 0x01, 54 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub knx_medium: u8,
    pub programming_mode: bool,
    pub individual_address: IndividualAddress,
    pub project_installation_id: u16,
    pub serial_number: [u8; 6],
    pub multicast_address: Ipv4Addr,
    pub mac_address: [u8; 6],
    pub name: heapless::String<DEVICE_NAME_LEN>,
}

impl DeviceInfo {
    pub const LENGTH: usize = 54;

    fn from_knx(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LENGTH {
            return Err(KnxError::malformed_frame());
        }
        let mut serial_number = [0u8; 6];
        serial_number.copy_from_slice(&data[8..14]);
        let mut mac_address = [0u8; 6];
        mac_address.copy_from_slice(&data[18..24]);

        let mut name = heapless::String::new();
        for &b in data[24..54].iter().filter(|&&b| b != 0) {
            name.push(char::from(b)).map_err(|_| KnxError::malformed_frame())?;
        }

        Ok(Self {
            knx_medium: data[2],
            programming_mode: data[3] & 0x01 != 0,
            individual_address: IndividualAddress::from_bytes([data[4], data[5]]),
            project_installation_id: u16::from_be_bytes([data[6], data[7]]),
            serial_number,
            multicast_address: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            mac_address,
            name,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, Self::LENGTH)?;
        buf[0] = Self::LENGTH as u8;
        buf[1] = DIB_DEVICE_INFO;
        buf[2] = self.knx_medium;
        buf[3] = u8::from(self.programming_mode);
        buf[4..6].copy_from_slice(&self.individual_address.to_bytes());
        buf[6..8].copy_from_slice(&self.project_installation_id.to_be_bytes());
        buf[8..14].copy_from_slice(&self.serial_number);
        buf[14..18].copy_from_slice(&self.multicast_address.octets());
        buf[18..24].copy_from_slice(&self.mac_address);
        let name = &mut buf[24..54];
        name.fill(0);
        for (dst, b) in name.iter_mut().zip(self.name.bytes()) {
            *dst = b;
        }
        Ok(Self::LENGTH)
    }
}

/// One supported service family and its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceFamily {
    pub family: u8,
    pub version: u8,
}

impl ServiceFamily {
    pub const CORE: u8 = 0x02;
    pub const DEVICE_MANAGEMENT: u8 = 0x03;
    pub const TUNNELLING: u8 = 0x04;
    pub const ROUTING: u8 = 0x05;
}

/// A description information block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dib {
    DeviceInfo(DeviceInfo),
    SupportedServiceFamilies(heapless::Vec<ServiceFamily, MAX_SERVICE_FAMILIES>),
    Generic {
        dib_type: u8,
        data: heapless::Vec<u8, MAX_GENERIC_DIB_DATA>,
    },
}

impl Dib {
    /// Encoded length including the two header bytes.
    pub fn calculated_length(&self) -> usize {
        match self {
            Self::DeviceInfo(_) => DeviceInfo::LENGTH,
            Self::SupportedServiceFamilies(families) => 2 + families.len() * 2,
            Self::Generic { data, .. } => 2 + data.len(),
        }
    }

    /// Parse one DIB from the start of `data`. Returns the DIB and its length.
    ///
    /// # Errors
    ///
    /// `FrameTooSmall` with fewer than two bytes, `MalformedFrame` when the
    /// structure length is invalid or exceeds `data`.
    pub fn from_knx(data: &[u8]) -> Result<(Self, usize)> {
        require(data, 2)?;
        let len = usize::from(data[0]);
        if len < 2 || len > data.len() {
            return Err(KnxError::malformed_frame());
        }
        let raw = &data[..len];
        let dib = match data[1] {
            DIB_DEVICE_INFO => Self::DeviceInfo(DeviceInfo::from_knx(raw)?),
            DIB_SUPP_SVC_FAMILIES => {
                if len % 2 != 0 {
                    return Err(KnxError::malformed_frame());
                }
                let mut families = heapless::Vec::new();
                for pair in raw[2..].chunks_exact(2) {
                    families
                        .push(ServiceFamily {
                            family: pair[0],
                            version: pair[1],
                        })
                        .map_err(|_| KnxError::malformed_frame())?;
                }
                Self::SupportedServiceFamilies(families)
            }
            dib_type => Self::Generic {
                dib_type,
                data: heapless::Vec::from_slice(&raw[2..]).map_err(|_| KnxError::malformed_frame())?,
            },
        };
        Ok((dib, len))
    }

    /// Encode into `buf`.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when `buf` cannot hold the DIB.
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.calculated_length();
        require_buf(buf, len)?;
        match self {
            Self::DeviceInfo(info) => return info.to_knx(buf),
            Self::SupportedServiceFamilies(families) => {
                buf[1] = DIB_SUPP_SVC_FAMILIES;
                for (pair, family) in buf[2..len].chunks_exact_mut(2).zip(families) {
                    pair[0] = family.family;
                    pair[1] = family.version;
                }
            }
            Self::Generic { dib_type, data } => {
                buf[1] = *dib_type;
                buf[2..len].copy_from_slice(data);
            }
        }
        buf[0] = len as u8;
        Ok(len)
    }
}

/// Parse consecutive DIBs filling `data` exactly.
pub(crate) fn dibs_from_knx(mut data: &[u8]) -> Result<Dibs> {
    let mut dibs = Dibs::new();
    while !data.is_empty() {
        let (dib, len) = Dib::from_knx(data)?;
        if dibs.push(dib).is_err() {
            crate::knx_log!(debug, "More than {} DIBs in one response", MAX_DIBS);
            return Err(KnxError::malformed_frame());
        }
        data = &data[len..];
    }
    Ok(dibs)
}

pub(crate) fn dibs_length(dibs: &[Dib]) -> usize {
    dibs.iter().map(Dib::calculated_length).sum()
}

pub(crate) fn dibs_to_knx(dibs: &[Dib], buf: &mut [u8]) -> Result<usize> {
    let mut pos = 0;
    for dib in dibs {
        pos += dib.to_knx(&mut buf[pos..])?;
    }
    Ok(pos)
}
