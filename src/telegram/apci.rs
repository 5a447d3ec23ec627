//! Application layer services (APCI).
//!
//! ## Format
//!
//! ```text
//! Octet 0: TTTT TTAA   T = TPCI, A = APCI bits 9-8
//! Octet 1: AAAA AAAA   APCI bits 7-0, low 6 bits may carry data
//! Octet 2..: appended data
//! ```
//!
//! The service code is the 10-bit APCI value. Decoding takes the whole APDU,
//! starting at the TPCI octet.

use crate::addressing::IndividualAddress;
use crate::dpt::{DptBinary, Payload};
use crate::error::{KnxError, Result};

/// Largest memory block a single memory service can carry.
pub const MAX_MEMORY_DATA: usize = 63;

/// Bytes of a memory read/write/response.
pub type MemoryData = heapless::Vec<u8, MAX_MEMORY_DATA>;

/// Six data bits in the low APCI octet.
const APCI_DATA_MASK: u8 = 0x3F;

/// 10-bit APCI service codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ApciService {
    GroupValueRead = 0x0000,
    GroupValueResponse = 0x0040,
    GroupValueWrite = 0x0080,
    IndividualAddressWrite = 0x00C0,
    IndividualAddressRead = 0x0100,
    IndividualAddressResponse = 0x0140,
    AdcRead = 0x0180,
    AdcResponse = 0x01C0,
    MemoryRead = 0x0200,
    MemoryResponse = 0x0240,
    MemoryWrite = 0x0280,
    DeviceDescriptorRead = 0x0300,
    DeviceDescriptorResponse = 0x0340,
}

impl ApciService {
    /// Resolve a 10-bit APCI value. Data bits in the low six bits are ignored
    /// for every service that carries them.
    pub const fn resolve(apci: u16) -> Option<Self> {
        match apci & 0x03C0 {
            0x0000 => Some(Self::GroupValueRead),
            0x0040 => Some(Self::GroupValueResponse),
            0x0080 => Some(Self::GroupValueWrite),
            0x00C0 => Some(Self::IndividualAddressWrite),
            0x0100 => Some(Self::IndividualAddressRead),
            0x0140 => Some(Self::IndividualAddressResponse),
            0x0180 => Some(Self::AdcRead),
            0x01C0 => Some(Self::AdcResponse),
            0x0200 => Some(Self::MemoryRead),
            0x0240 => Some(Self::MemoryResponse),
            0x0280 => Some(Self::MemoryWrite),
            0x0300 => Some(Self::DeviceDescriptorRead),
            0x0340 => Some(Self::DeviceDescriptorResponse),
            // 0x03C0 escapes to the extended APCI range
            _ => None,
        }
    }

    /// The 10-bit code.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// An application layer service together with its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Apci {
    #[default]
    GroupValueRead,
    GroupValueResponse(Payload),
    GroupValueWrite(Payload),
    IndividualAddressWrite(IndividualAddress),
    IndividualAddressRead,
    IndividualAddressResponse,
    AdcRead { channel: u8, count: u8 },
    AdcResponse { channel: u8, count: u8, value: u16 },
    MemoryRead { address: u16, count: u8 },
    MemoryResponse { address: u16, data: MemoryData },
    MemoryWrite { address: u16, data: MemoryData },
    DeviceDescriptorRead { descriptor: u8 },
    DeviceDescriptorResponse { descriptor: u8, value: u16 },
}

impl Apci {
    /// The service this variant implements.
    pub const fn service(&self) -> ApciService {
        match self {
            Self::GroupValueRead => ApciService::GroupValueRead,
            Self::GroupValueResponse(_) => ApciService::GroupValueResponse,
            Self::GroupValueWrite(_) => ApciService::GroupValueWrite,
            Self::IndividualAddressWrite(_) => ApciService::IndividualAddressWrite,
            Self::IndividualAddressRead => ApciService::IndividualAddressRead,
            Self::IndividualAddressResponse => ApciService::IndividualAddressResponse,
            Self::AdcRead { .. } => ApciService::AdcRead,
            Self::AdcResponse { .. } => ApciService::AdcResponse,
            Self::MemoryRead { .. } => ApciService::MemoryRead,
            Self::MemoryResponse { .. } => ApciService::MemoryResponse,
            Self::MemoryWrite { .. } => ApciService::MemoryWrite,
            Self::DeviceDescriptorRead { .. } => ApciService::DeviceDescriptorRead,
            Self::DeviceDescriptorResponse { .. } => ApciService::DeviceDescriptorResponse,
        }
    }

    /// Group value payload of a write or response.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::GroupValueResponse(payload) | Self::GroupValueWrite(payload) => Some(payload),
            _ => None,
        }
    }

    /// Number of APDU bytes after the TPCI octet. This is the `mpdu_len` of a cEMI frame.
    pub fn calculated_length(&self) -> usize {
        match self {
            Self::GroupValueRead
            | Self::IndividualAddressRead
            | Self::IndividualAddressResponse
            | Self::DeviceDescriptorRead { .. } => 1,
            Self::GroupValueResponse(payload) | Self::GroupValueWrite(payload) => match payload {
                Payload::Binary(_) => 1,
                Payload::Array(array) => 1 + array.value().len(),
            },
            Self::AdcRead { .. } => 2,
            Self::IndividualAddressWrite(_)
            | Self::DeviceDescriptorResponse { .. }
            | Self::MemoryRead { .. } => 3,
            Self::AdcResponse { .. } => 4,
            Self::MemoryResponse { data, .. } | Self::MemoryWrite { data, .. } => 3 + data.len(),
        }
    }

    /// Decode an APDU (TPCI octet, APCI octet, data).
    ///
    /// # Errors
    ///
    /// - `UnsupportedMessage` for APCI values outside the known services
    /// - `MalformedFrame` when the APDU length does not fit the service
    pub fn from_knx(apdu: &[u8]) -> Result<Self> {
        if apdu.len() < 2 {
            return Err(KnxError::malformed_frame());
        }
        let tpci_apci = u16::from_be_bytes([apdu[0], apdu[1]]);
        let service =
            ApciService::resolve(tpci_apci & 0x03FF).ok_or_else(KnxError::unsupported_message)?;
        let data_bits = apdu[1] & APCI_DATA_MASK;

        let apci = match service {
            ApciService::GroupValueRead => Self::GroupValueRead,
            ApciService::GroupValueResponse => Self::GroupValueResponse(group_payload(apdu)?),
            ApciService::GroupValueWrite => Self::GroupValueWrite(group_payload(apdu)?),
            ApciService::IndividualAddressWrite => {
                let raw = exact::<4>(apdu)?;
                Self::IndividualAddressWrite(IndividualAddress::from_bytes([raw[2], raw[3]]))
            }
            ApciService::IndividualAddressRead => Self::IndividualAddressRead,
            ApciService::IndividualAddressResponse => Self::IndividualAddressResponse,
            ApciService::AdcRead => {
                let raw = exact::<3>(apdu)?;
                Self::AdcRead {
                    channel: data_bits,
                    count: raw[2],
                }
            }
            ApciService::AdcResponse => {
                let raw = exact::<5>(apdu)?;
                Self::AdcResponse {
                    channel: data_bits,
                    count: raw[2],
                    value: u16::from_be_bytes([raw[3], raw[4]]),
                }
            }
            ApciService::MemoryRead => {
                let raw = exact::<4>(apdu)?;
                Self::MemoryRead {
                    address: u16::from_be_bytes([raw[2], raw[3]]),
                    count: data_bits,
                }
            }
            ApciService::MemoryResponse | ApciService::MemoryWrite => {
                if apdu.len() < 4 {
                    return Err(KnxError::malformed_frame());
                }
                let address = u16::from_be_bytes([apdu[2], apdu[3]]);
                let data =
                    MemoryData::from_slice(&apdu[4..]).map_err(|_| KnxError::malformed_frame())?;
                if service == ApciService::MemoryWrite {
                    Self::MemoryWrite { address, data }
                } else {
                    Self::MemoryResponse { address, data }
                }
            }
            ApciService::DeviceDescriptorRead => Self::DeviceDescriptorRead {
                descriptor: data_bits,
            },
            ApciService::DeviceDescriptorResponse => {
                let raw = exact::<4>(apdu)?;
                Self::DeviceDescriptorResponse {
                    descriptor: data_bits,
                    value: u16::from_be_bytes([raw[2], raw[3]]),
                }
            }
        };
        Ok(apci)
    }

    /// Encode the APDU into `buf`, TPCI octet included (always 0). Returns
    /// the number of bytes written, `1 + calculated_length()`.
    ///
    /// # Errors
    ///
    /// - `BufferTooSmall` when `buf` cannot hold the APDU
    /// - Conversion error for data that does not fit its field
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let len = 1 + self.calculated_length();
        if buf.len() < len {
            return Err(KnxError::buffer_too_small());
        }
        let code = self.service().code();
        buf[0] = ((code >> 8) & 0x03) as u8;
        buf[1] = (code & 0xFF) as u8;

        match self {
            Self::GroupValueRead | Self::IndividualAddressRead | Self::IndividualAddressResponse => {}
            Self::GroupValueResponse(payload) | Self::GroupValueWrite(payload) => match payload {
                Payload::Binary(binary) => buf[1] |= binary.value(),
                Payload::Array(array) => buf[2..len].copy_from_slice(array.value()),
            },
            Self::IndividualAddressWrite(address) => buf[2..4].copy_from_slice(&address.to_bytes()),
            Self::AdcRead { channel, count } => {
                buf[1] |= data_bits(*channel)?;
                buf[2] = *count;
            }
            Self::AdcResponse {
                channel,
                count,
                value,
            } => {
                buf[1] |= data_bits(*channel)?;
                buf[2] = *count;
                buf[3..5].copy_from_slice(&value.to_be_bytes());
            }
            Self::MemoryRead { address, count } => {
                buf[1] |= data_bits(*count)?;
                buf[2..4].copy_from_slice(&address.to_be_bytes());
            }
            Self::MemoryResponse { address, data } | Self::MemoryWrite { address, data } => {
                // data.len() <= 63 by capacity
                buf[1] |= data.len() as u8;
                buf[2..4].copy_from_slice(&address.to_be_bytes());
                buf[4..len].copy_from_slice(data);
            }
            Self::DeviceDescriptorRead { descriptor } => buf[1] |= data_bits(*descriptor)?,
            Self::DeviceDescriptorResponse { descriptor, value } => {
                buf[1] |= data_bits(*descriptor)?;
                buf[2..4].copy_from_slice(&value.to_be_bytes());
            }
        }
        Ok(len)
    }
}

fn group_payload(apdu: &[u8]) -> Result<Payload> {
    if apdu.len() == 2 {
        Ok(Payload::Binary(DptBinary::new(apdu[1] & APCI_DATA_MASK)?))
    } else {
        Payload::array(&apdu[2..]).map_err(|_| KnxError::malformed_frame())
    }
}

fn exact<const N: usize>(apdu: &[u8]) -> Result<[u8; N]> {
    apdu.try_into().map_err(|_| KnxError::malformed_frame())
}

fn data_bits(value: u8) -> Result<u8> {
    if value > APCI_DATA_MASK {
        return Err(KnxError::conversion(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(apci: &Apci) -> heapless::Vec<u8, 80> {
        let mut buf = [0u8; 80];
        let len = apci.to_knx(&mut buf).unwrap();
        heapless::Vec::from_slice(&buf[..len]).unwrap()
    }

    #[test]
    fn test_group_value_read() {
        assert_eq!(Apci::from_knx(&[0x00, 0x00]).unwrap(), Apci::GroupValueRead);
        assert_eq!(encode(&Apci::GroupValueRead), [0x00, 0x00]);
        assert_eq!(Apci::GroupValueRead.calculated_length(), 1);
    }

    #[test]
    fn test_group_value_write_binary() {
        let apci = Apci::from_knx(&[0x00, 0x81]).unwrap();
        assert_eq!(apci, Apci::GroupValueWrite(Payload::binary(1).unwrap()));
        assert_eq!(apci.calculated_length(), 1);
        assert_eq!(encode(&apci), [0x00, 0x81]);
    }

    #[test]
    fn test_group_value_response_array() {
        let apci = Apci::from_knx(&[0x00, 0x40, 0x0C, 0x1A]).unwrap();
        assert_eq!(apci, Apci::GroupValueResponse(Payload::array(&[0x0C, 0x1A]).unwrap()));
        assert_eq!(apci.calculated_length(), 3);
        assert_eq!(encode(&apci), [0x00, 0x40, 0x0C, 0x1A]);
        assert_eq!(apci.payload(), Some(&Payload::array(&[0x0C, 0x1A]).unwrap()));
    }

    #[test]
    fn test_individual_address_services() {
        let apci = Apci::from_knx(&[0x00, 0xC0, 0x12, 0x03]).unwrap();
        assert_eq!(apci, Apci::IndividualAddressWrite(IndividualAddress::from_raw(0x1203)));
        assert_eq!(encode(&apci), [0x00, 0xC0, 0x12, 0x03]);
        assert_eq!(Apci::from_knx(&[0x01, 0x00]).unwrap(), Apci::IndividualAddressRead);
        assert_eq!(Apci::from_knx(&[0x01, 0x40]).unwrap(), Apci::IndividualAddressResponse);
        assert!(Apci::from_knx(&[0x00, 0xC0, 0x12]).unwrap_err().is_malformed_frame());
    }

    #[test]
    fn test_adc_services() {
        let read = Apci::AdcRead { channel: 5, count: 8 };
        assert_eq!(encode(&read), [0x01, 0x85, 0x08]);
        assert_eq!(Apci::from_knx(&[0x01, 0x85, 0x08]).unwrap(), read);

        let response = Apci::AdcResponse {
            channel: 5,
            count: 8,
            value: 0x0102,
        };
        assert_eq!(encode(&response), [0x01, 0xC5, 0x08, 0x01, 0x02]);
        assert_eq!(Apci::from_knx(&[0x01, 0xC5, 0x08, 0x01, 0x02]).unwrap(), response);
    }

    #[test]
    fn test_memory_services() {
        let read = Apci::MemoryRead {
            address: 0x1234,
            count: 11,
        };
        assert_eq!(read.calculated_length(), 3);
        assert_eq!(encode(&read), [0x02, 0x0B, 0x12, 0x34]);
        assert_eq!(Apci::from_knx(&[0x02, 0x0B, 0x12, 0x34]).unwrap(), read);

        let write = Apci::MemoryWrite {
            address: 0x1234,
            data: MemoryData::from_slice(&[0xAA, 0xBB, 0xCC]).unwrap(),
        };
        assert_eq!(write.calculated_length(), 6);
        assert_eq!(encode(&write), [0x02, 0x83, 0x12, 0x34, 0xAA, 0xBB, 0xCC]);
        assert_eq!(Apci::from_knx(&[0x02, 0x83, 0x12, 0x34, 0xAA, 0xBB, 0xCC]).unwrap(), write);

        let response = Apci::from_knx(&[0x02, 0x41, 0x00, 0x10, 0x7F]).unwrap();
        assert_eq!(
            response,
            Apci::MemoryResponse {
                address: 0x0010,
                data: MemoryData::from_slice(&[0x7F]).unwrap(),
            }
        );
    }

    #[test]
    fn test_device_descriptor_services() {
        let read = Apci::DeviceDescriptorRead { descriptor: 0 };
        assert_eq!(encode(&read), [0x03, 0x00]);
        let response = Apci::from_knx(&[0x03, 0x40, 0x07, 0xB0]).unwrap();
        assert_eq!(
            response,
            Apci::DeviceDescriptorResponse {
                descriptor: 0,
                value: 0x07B0,
            }
        );
        assert_eq!(encode(&response), [0x03, 0x40, 0x07, 0xB0]);
    }

    #[test]
    fn test_unsupported_apci() {
        assert!(Apci::from_knx(&[0xFF, 0xC0]).unwrap_err().is_unsupported_message());
        assert!(Apci::from_knx(&[0x03, 0xD1]).unwrap_err().is_unsupported_message());
    }

    #[test]
    fn test_short_apdu() {
        assert!(Apci::from_knx(&[0x00]).unwrap_err().is_malformed_frame());
        assert!(Apci::from_knx(&[]).is_err());
    }

    #[test]
    fn test_data_bits_out_of_range() {
        let mut buf = [0u8; 8];
        let read = Apci::DeviceDescriptorRead { descriptor: 0x40 };
        assert!(read.to_knx(&mut buf).unwrap_err().is_conversion());
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 3];
        let write = Apci::GroupValueWrite(Payload::array(&[1, 2, 3]).unwrap());
        assert!(write.to_knx(&mut buf).is_err());
    }
}
