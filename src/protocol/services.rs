//! KNXnet/IP service bodies.
//!
//! Each body knows its service type, its encoded length, and how to read and
//! write itself. Framing is done by [`KnxIpFrame`](crate::protocol::frame::KnxIpFrame).
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::protocol::frame::{Hpai, KnxIpFrame};
//! use knx_tunnel::protocol::services::ConnectRequest;
//!
//! let endpoint = Hpai::new("192.168.1.100:3671".parse()?);
//! let frame = KnxIpFrame::new(ConnectRequest::tunnel(endpoint, endpoint));
//! let bytes = frame.to_bytes()?;
//! assert_eq!(bytes.len(), 26);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                          Gateway
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELING_REQUEST ------>|
//!   |<------ TUNNELING_ACK ----------|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|  (every 60s)
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::IpEndpoint;
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{
    ErrorCode, ServiceType, KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR, MAX_CEMI_SIZE,
    TUNNEL_CONNECTION, TUNNEL_LINKLAYER,
};
use crate::protocol::dib::{dibs_from_knx, dibs_length, dibs_to_knx, Dib, Dibs};
use crate::protocol::frame::{require, require_buf, Hpai};

/// Raw CEMI bytes carried by tunnelling and routing bodies.
pub type RawCemi = heapless::Vec<u8, MAX_CEMI_SIZE>;

/// A KNXnet/IP body with a fixed service type.
pub trait ServiceBody: Sized {
    /// Service type identifying this body in the header.
    const SERVICE_TYPE: ServiceType;

    /// Encoded length of the body.
    fn calculated_length(&self) -> usize;

    /// Parse the body from exactly the bytes after the header.
    ///
    /// # Errors
    ///
    /// `FrameTooSmall` when the fixed layout does not fit, `MalformedFrame`
    /// for bad structure lengths or status codes.
    fn from_knx(data: &[u8]) -> Result<Self>;

    /// Encode into `buf`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when `buf` is shorter than [`Self::calculated_length`].
    fn to_knx(&self, buf: &mut [u8]) -> Result<usize>;
}

fn status_from_knx(raw: u8) -> Result<ErrorCode> {
    ErrorCode::from_u8(raw).ok_or_else(|| {
        crate::knx_log!(debug, "Unknown status code 0x{:02X}", raw);
        KnxError::malformed_frame()
    })
}

fn raw_cemi(data: &[u8]) -> Result<RawCemi> {
    RawCemi::from_slice(data).map_err(|_| KnxError::malformed_frame())
}

fn encode_cemi(cemi: &CemiFrame) -> Result<RawCemi> {
    let mut buf = [0u8; MAX_CEMI_SIZE];
    let len = cemi.to_knx(&mut buf)?;
    RawCemi::from_slice(&buf[..len]).map_err(|_| KnxError::buffer_too_small())
}

// =============================================================================
// Structures
// =============================================================================

/// Connection Request Information (CRI)
///
/// `04 <connection type> <knx layer> 00`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cri {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl Default for Cri {
    fn default() -> Self {
        Self::tunnel_link_layer()
    }
}

impl Cri {
    pub const SIZE: usize = 4;

    /// CRI for a link layer tunnel.
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        require(data, Self::SIZE)?;
        if usize::from(data[0]) != Self::SIZE {
            return Err(KnxError::malformed_frame());
        }
        Ok(Self {
            connection_type: data[1],
            knx_layer: data[2],
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, Self::SIZE)?;
        buf[0] = Self::SIZE as u8;
        buf[1] = self.connection_type;
        buf[2] = self.knx_layer;
        buf[3] = 0x00;
        Ok(Self::SIZE)
    }
}

/// Connection Response Data Block (CRD)
///
/// `04 04 <individual address>` for tunnels, `02 <type>` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crd {
    pub connection_type: u8,
    /// Address the gateway assigned to the tunnel.
    pub individual_address: Option<IndividualAddress>,
}

impl Crd {
    /// CRD of a tunnel with its assigned address.
    pub const fn tunnel(individual_address: IndividualAddress) -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            individual_address: Some(individual_address),
        }
    }

    pub const fn calculated_length(&self) -> usize {
        if self.individual_address.is_some() {
            4
        } else {
            2
        }
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        require(data, 2)?;
        match data[0] {
            2 => Ok(Self {
                connection_type: data[1],
                individual_address: None,
            }),
            4 => {
                require(data, 4)?;
                Ok(Self {
                    connection_type: data[1],
                    individual_address: Some(IndividualAddress::from_bytes([data[2], data[3]])),
                })
            }
            _ => Err(KnxError::malformed_frame()),
        }
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.calculated_length();
        require_buf(buf, len)?;
        buf[0] = len as u8;
        buf[1] = self.connection_type;
        if let Some(address) = self.individual_address {
            buf[2..4].copy_from_slice(&address.to_bytes());
        }
        Ok(len)
    }
}

/// Connection header of tunnelling requests and acks
///
/// `04 <channel> <sequence> <reserved or status>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionHeader {
    pub communication_channel_id: u8,
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    pub const SIZE: usize = 4;

    pub const fn new(communication_channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            communication_channel_id,
            sequence_counter,
        }
    }

    /// Decode, returning the header and its fourth byte.
    fn from_knx(data: &[u8]) -> Result<(Self, u8)> {
        require(data, Self::SIZE)?;
        if usize::from(data[0]) != Self::SIZE {
            return Err(KnxError::malformed_frame());
        }
        Ok((Self::new(data[1], data[2]), data[3]))
    }

    fn to_knx(&self, buf: &mut [u8], last: u8) -> Result<usize> {
        require_buf(buf, Self::SIZE)?;
        buf[0] = Self::SIZE as u8;
        buf[1] = self.communication_channel_id;
        buf[2] = self.sequence_counter;
        buf[3] = last;
        Ok(Self::SIZE)
    }
}

// =============================================================================
// Search and description
// =============================================================================

/// `SEARCH_REQUEST` (0x0201): discovery endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchRequest {
    pub discovery_endpoint: Hpai,
}

impl SearchRequest {
    pub const fn new(discovery_endpoint: Hpai) -> Self {
        Self { discovery_endpoint }
    }
}

impl Default for SearchRequest {
    /// Search answered to the KNXnet/IP multicast group.
    fn default() -> Self {
        Self::new(Hpai::new(IpEndpoint::new(
            KNXNETIP_MULTICAST_ADDR,
            KNXNETIP_DEFAULT_PORT,
        )))
    }
}

impl ServiceBody for SearchRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::SearchRequest;

    fn calculated_length(&self) -> usize {
        Hpai::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        Ok(Self::new(Hpai::from_knx(data)?))
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        self.discovery_endpoint.to_knx(buf)
    }
}

/// `SEARCH_RESPONSE` (0x0202): control endpoint followed by DIBs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchResponse {
    pub control_endpoint: Hpai,
    pub dibs: Dibs,
}

impl SearchResponse {
    /// Device information, if the gateway sent it.
    pub fn device_info(&self) -> Option<&crate::protocol::dib::DeviceInfo> {
        self.dibs.iter().find_map(|dib| match dib {
            Dib::DeviceInfo(info) => Some(info),
            _ => None,
        })
    }
}

impl ServiceBody for SearchResponse {
    const SERVICE_TYPE: ServiceType = ServiceType::SearchResponse;

    fn calculated_length(&self) -> usize {
        Hpai::SIZE + dibs_length(&self.dibs)
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let control_endpoint = Hpai::from_knx(data)?;
        let dibs = dibs_from_knx(&data[Hpai::SIZE..])?;
        Ok(Self {
            control_endpoint,
            dibs,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, self.calculated_length())?;
        let pos = self.control_endpoint.to_knx(buf)?;
        Ok(pos + dibs_to_knx(&self.dibs, &mut buf[pos..])?)
    }
}

/// `DESCRIPTION_REQUEST` (0x0203): control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptionRequest {
    pub control_endpoint: Hpai,
}

impl ServiceBody for DescriptionRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::DescriptionRequest;

    fn calculated_length(&self) -> usize {
        Hpai::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        Ok(Self {
            control_endpoint: Hpai::from_knx(data)?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        self.control_endpoint.to_knx(buf)
    }
}

/// `DESCRIPTION_RESPONSE` (0x0204): DIBs only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptionResponse {
    pub dibs: Dibs,
}

impl ServiceBody for DescriptionResponse {
    const SERVICE_TYPE: ServiceType = ServiceType::DescriptionResponse;

    fn calculated_length(&self) -> usize {
        dibs_length(&self.dibs)
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        Ok(Self {
            dibs: dibs_from_knx(data)?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, self.calculated_length())?;
        dibs_to_knx(&self.dibs, buf)
    }
}

// =============================================================================
// Connection management
// =============================================================================

/// `CONNECT_REQUEST` (0x0205)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectRequest {
    /// Control endpoint (for connection management)
    pub control_endpoint: Hpai,
    /// Data endpoint (for tunnelling data)
    pub data_endpoint: Hpai,
    pub cri: Cri,
}

impl ConnectRequest {
    /// Link layer tunnel request.
    pub const fn tunnel(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: Cri::tunnel_link_layer(),
        }
    }
}

impl ServiceBody for ConnectRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::ConnectRequest;

    fn calculated_length(&self) -> usize {
        Hpai::SIZE * 2 + Cri::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        require(data, Hpai::SIZE * 2 + Cri::SIZE)?;
        Ok(Self {
            control_endpoint: Hpai::from_knx(data)?,
            data_endpoint: Hpai::from_knx(&data[Hpai::SIZE..])?,
            cri: Cri::from_knx(&data[Hpai::SIZE * 2..])?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, self.calculated_length())?;
        let mut pos = self.control_endpoint.to_knx(buf)?;
        pos += self.data_endpoint.to_knx(&mut buf[pos..])?;
        pos += self.cri.to_knx(&mut buf[pos..])?;
        Ok(pos)
    }
}

/// `CONNECT_RESPONSE` (0x0206)
///
/// A refused connect may stop after the status byte, so the data endpoint
/// and CRD are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectResponse {
    pub communication_channel_id: u8,
    pub status_code: ErrorCode,
    /// Data endpoint assigned by the gateway
    pub data_endpoint: Option<Hpai>,
    pub crd: Option<Crd>,
}

impl ConnectResponse {
    /// Successful tunnel connect response.
    pub const fn accepted(
        communication_channel_id: u8,
        data_endpoint: Hpai,
        individual_address: IndividualAddress,
    ) -> Self {
        Self {
            communication_channel_id,
            status_code: ErrorCode::NoError,
            data_endpoint: Some(data_endpoint),
            crd: Some(Crd::tunnel(individual_address)),
        }
    }

    /// Refused connect response without endpoint or CRD.
    pub const fn refused(status_code: ErrorCode) -> Self {
        Self {
            communication_channel_id: 0,
            status_code,
            data_endpoint: None,
            crd: None,
        }
    }

    /// Check if connection was successful
    pub fn is_ok(&self) -> bool {
        self.status_code == ErrorCode::NoError
    }

    /// Address the gateway assigned to the tunnel.
    pub fn individual_address(&self) -> Option<IndividualAddress> {
        self.crd.and_then(|crd| crd.individual_address)
    }
}

impl ServiceBody for ConnectResponse {
    const SERVICE_TYPE: ServiceType = ServiceType::ConnectResponse;

    fn calculated_length(&self) -> usize {
        2 + self.data_endpoint.map_or(0, |_| Hpai::SIZE)
            + self.crd.map_or(0, |crd| crd.calculated_length())
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        require(data, 2)?;
        let communication_channel_id = data[0];
        let status_code = status_from_knx(data[1])?;
        if status_code != ErrorCode::NoError && data.len() == 2 {
            return Ok(Self {
                communication_channel_id,
                ..Self::refused(status_code)
            });
        }
        require(data, 2 + Hpai::SIZE + 2)?;
        Ok(Self {
            communication_channel_id,
            status_code,
            data_endpoint: Some(Hpai::from_knx(&data[2..])?),
            crd: Some(Crd::from_knx(&data[2 + Hpai::SIZE..])?),
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, self.calculated_length())?;
        buf[0] = self.communication_channel_id;
        buf[1] = self.status_code.to_u8();
        let mut pos = 2;
        if let Some(endpoint) = &self.data_endpoint {
            pos += endpoint.to_knx(&mut buf[pos..])?;
        }
        if let Some(crd) = &self.crd {
            pos += crd.to_knx(&mut buf[pos..])?;
        }
        Ok(pos)
    }
}

/// Channel id, reserved byte and HPAI, shared by connection state and
/// disconnect requests.
fn channel_request_from_knx(data: &[u8]) -> Result<(u8, Hpai)> {
    require(data, 2 + Hpai::SIZE)?;
    Ok((data[0], Hpai::from_knx(&data[2..])?))
}

fn channel_request_to_knx(channel: u8, endpoint: &Hpai, buf: &mut [u8]) -> Result<usize> {
    require_buf(buf, 2 + Hpai::SIZE)?;
    buf[0] = channel;
    buf[1] = 0x00;
    Ok(2 + endpoint.to_knx(&mut buf[2..])?)
}

fn channel_response_from_knx(data: &[u8]) -> Result<(u8, ErrorCode)> {
    require(data, 2)?;
    Ok((data[0], status_from_knx(data[1])?))
}

fn channel_response_to_knx(channel: u8, status: ErrorCode, buf: &mut [u8]) -> Result<usize> {
    require_buf(buf, 2)?;
    buf[0] = channel;
    buf[1] = status.to_u8();
    Ok(2)
}

/// `CONNECTIONSTATE_REQUEST` (0x0207)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionStateRequest {
    pub communication_channel_id: u8,
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    pub const fn new(communication_channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            communication_channel_id,
            control_endpoint,
        }
    }
}

impl ServiceBody for ConnectionStateRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::ConnectionStateRequest;

    fn calculated_length(&self) -> usize {
        2 + Hpai::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (channel, endpoint) = channel_request_from_knx(data)?;
        Ok(Self::new(channel, endpoint))
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        channel_request_to_knx(self.communication_channel_id, &self.control_endpoint, buf)
    }
}

/// `CONNECTIONSTATE_RESPONSE` (0x0208)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionStateResponse {
    pub communication_channel_id: u8,
    pub status_code: ErrorCode,
}

impl ConnectionStateResponse {
    pub const fn new(communication_channel_id: u8, status_code: ErrorCode) -> Self {
        Self {
            communication_channel_id,
            status_code,
        }
    }

    /// Check if connection is still alive
    pub fn is_ok(&self) -> bool {
        self.status_code == ErrorCode::NoError
    }
}

impl ServiceBody for ConnectionStateResponse {
    const SERVICE_TYPE: ServiceType = ServiceType::ConnectionStateResponse;

    fn calculated_length(&self) -> usize {
        2
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (channel, status) = channel_response_from_knx(data)?;
        Ok(Self::new(channel, status))
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        channel_response_to_knx(self.communication_channel_id, self.status_code, buf)
    }
}

/// `DISCONNECT_REQUEST` (0x0209)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisconnectRequest {
    pub communication_channel_id: u8,
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    pub const fn new(communication_channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            communication_channel_id,
            control_endpoint,
        }
    }
}

impl ServiceBody for DisconnectRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::DisconnectRequest;

    fn calculated_length(&self) -> usize {
        2 + Hpai::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (channel, endpoint) = channel_request_from_knx(data)?;
        Ok(Self::new(channel, endpoint))
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        channel_request_to_knx(self.communication_channel_id, &self.control_endpoint, buf)
    }
}

/// `DISCONNECT_RESPONSE` (0x020A)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisconnectResponse {
    pub communication_channel_id: u8,
    pub status_code: ErrorCode,
}

impl DisconnectResponse {
    pub const fn new(communication_channel_id: u8, status_code: ErrorCode) -> Self {
        Self {
            communication_channel_id,
            status_code,
        }
    }
}

impl ServiceBody for DisconnectResponse {
    const SERVICE_TYPE: ServiceType = ServiceType::DisconnectResponse;

    fn calculated_length(&self) -> usize {
        2
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (channel, status) = channel_response_from_knx(data)?;
        Ok(Self::new(channel, status))
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        channel_response_to_knx(self.communication_channel_id, self.status_code, buf)
    }
}

// =============================================================================
// Tunnelling and routing
// =============================================================================

/// `TUNNELING_REQUEST` (0x0420)
///
/// The CEMI frame is kept as raw bytes so a request can be acknowledged
/// even when its CEMI content does not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnellingRequest {
    pub connection_header: ConnectionHeader,
    pub raw_cemi: RawCemi,
}

impl TunnellingRequest {
    /// Wrap an encoded CEMI frame.
    ///
    /// # Errors
    ///
    /// `MissingField` or conversion errors from encoding `cemi`,
    /// `BufferTooSmall` when it exceeds [`MAX_CEMI_SIZE`].
    pub fn from_cemi(communication_channel_id: u8, sequence_counter: u8, cemi: &CemiFrame) -> Result<Self> {
        Ok(Self {
            connection_header: ConnectionHeader::new(communication_channel_id, sequence_counter),
            raw_cemi: encode_cemi(cemi)?,
        })
    }

    #[inline]
    pub fn communication_channel_id(&self) -> u8 {
        self.connection_header.communication_channel_id
    }

    #[inline]
    pub fn sequence_counter(&self) -> u8 {
        self.connection_header.sequence_counter
    }

    /// Decode the embedded CEMI frame.
    ///
    /// # Errors
    ///
    /// Any CEMI parse error.
    pub fn cemi(&self) -> Result<CemiFrame> {
        CemiFrame::from_knx(&self.raw_cemi).map(|(cemi, _)| cemi)
    }
}

impl ServiceBody for TunnellingRequest {
    const SERVICE_TYPE: ServiceType = ServiceType::TunnellingRequest;

    fn calculated_length(&self) -> usize {
        ConnectionHeader::SIZE + self.raw_cemi.len()
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (connection_header, _) = ConnectionHeader::from_knx(data)?;
        Ok(Self {
            connection_header,
            raw_cemi: raw_cemi(&data[ConnectionHeader::SIZE..])?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.calculated_length();
        require_buf(buf, len)?;
        self.connection_header.to_knx(buf, 0x00)?;
        buf[ConnectionHeader::SIZE..len].copy_from_slice(&self.raw_cemi);
        Ok(len)
    }
}

/// `TUNNELING_ACK` (0x0421)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnellingAck {
    pub connection_header: ConnectionHeader,
    pub status_code: ErrorCode,
}

impl TunnellingAck {
    pub const fn new(communication_channel_id: u8, sequence_counter: u8, status_code: ErrorCode) -> Self {
        Self {
            connection_header: ConnectionHeader::new(communication_channel_id, sequence_counter),
            status_code,
        }
    }

    #[inline]
    pub fn communication_channel_id(&self) -> u8 {
        self.connection_header.communication_channel_id
    }

    #[inline]
    pub fn sequence_counter(&self) -> u8 {
        self.connection_header.sequence_counter
    }

    /// Check if request was acknowledged successfully
    pub fn is_ok(&self) -> bool {
        self.status_code == ErrorCode::NoError
    }
}

impl ServiceBody for TunnellingAck {
    const SERVICE_TYPE: ServiceType = ServiceType::TunnellingAck;

    fn calculated_length(&self) -> usize {
        ConnectionHeader::SIZE
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        let (connection_header, status) = ConnectionHeader::from_knx(data)?;
        Ok(Self {
            connection_header,
            status_code: status_from_knx(status)?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        self.connection_header.to_knx(buf, self.status_code.to_u8())
    }
}

/// `ROUTING_INDICATION` (0x0530): a raw CEMI frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoutingIndication {
    pub raw_cemi: RawCemi,
}

impl RoutingIndication {
    /// Wrap an encoded CEMI frame.
    ///
    /// # Errors
    ///
    /// Errors from encoding `cemi`.
    pub fn from_cemi(cemi: &CemiFrame) -> Result<Self> {
        Ok(Self {
            raw_cemi: encode_cemi(cemi)?,
        })
    }

    /// Decode the embedded CEMI frame.
    ///
    /// # Errors
    ///
    /// Any CEMI parse error.
    pub fn cemi(&self) -> Result<CemiFrame> {
        CemiFrame::from_knx(&self.raw_cemi).map(|(cemi, _)| cemi)
    }
}

impl ServiceBody for RoutingIndication {
    const SERVICE_TYPE: ServiceType = ServiceType::RoutingIndication;

    fn calculated_length(&self) -> usize {
        self.raw_cemi.len()
    }

    fn from_knx(data: &[u8]) -> Result<Self> {
        Ok(Self {
            raw_cemi: raw_cemi(data)?,
        })
    }

    fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.raw_cemi.len();
        require_buf(buf, len)?;
        buf[..len].copy_from_slice(&self.raw_cemi);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::net::Ipv4Addr;
    use crate::protocol::constants::CemiMessageCode;
    use crate::protocol::frame::{KnxIpBody, KnxIpFrame};
    use crate::telegram::{Apci, Telegram};

    fn endpoint() -> Hpai {
        Hpai::new(IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 100), 3671))
    }

    fn encode<B: ServiceBody>(body: &B) -> heapless::Vec<u8, 128> {
        let mut buf = [0u8; 128];
        let len = body.to_knx(&mut buf).unwrap();
        assert_eq!(len, body.calculated_length());
        heapless::Vec::from_slice(&buf[..len]).unwrap()
    }

    #[test]
    fn test_connect_request_layout() {
        let request = ConnectRequest::tunnel(endpoint(), endpoint());
        let bytes = encode(&request);
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[16..], &[0x04, 0x04, 0x02, 0x00]);
        assert_eq!(ConnectRequest::from_knx(&bytes).unwrap(), request);

        let frame = KnxIpFrame::new(request).to_bytes().unwrap();
        assert_eq!(&frame[..6], &[0x06, 0x10, 0x02, 0x05, 0x00, 0x1A]);
    }

    #[test]
    fn test_connect_response_accepted() {
        let data = [0x15, 0x00, 0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57, 0x04, 0x04, 0x11, 0xFF];
        let response = ConnectResponse::from_knx(&data).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.communication_channel_id, 21);
        assert_eq!(response.individual_address().unwrap().to_string(), "1.1.255");
        assert_eq!(encode(&response).as_slice(), &data);
    }

    #[test]
    fn test_connect_response_refused_short() {
        let response = ConnectResponse::from_knx(&[0x00, 0x24]).unwrap();
        assert!(!response.is_ok());
        assert_eq!(response.status_code, ErrorCode::NoMoreConnections);
        assert_eq!(response.data_endpoint, None);
        assert_eq!(encode(&response).as_slice(), &[0x00, 0x24]);
    }

    #[test]
    fn test_connect_response_errors() {
        assert!(ConnectResponse::from_knx(&[0x15]).unwrap_err().is_frame_too_small());
        assert!(ConnectResponse::from_knx(&[0x15, 0x00]).unwrap_err().is_frame_too_small());
        assert!(ConnectResponse::from_knx(&[0x15, 0x99]).unwrap_err().is_malformed_frame());
    }

    #[test]
    fn test_connection_state() {
        let request = ConnectionStateRequest::new(7, endpoint());
        let bytes = encode(&request);
        assert_eq!(&bytes[..2], &[0x07, 0x00]);
        assert_eq!(ConnectionStateRequest::from_knx(&bytes).unwrap(), request);

        let response = ConnectionStateResponse::from_knx(&[0x07, 0x21]).unwrap();
        assert_eq!(response.status_code, ErrorCode::ConnectionId);
        assert!(!response.is_ok());
        assert_eq!(encode(&response).as_slice(), &[0x07, 0x21]);
    }

    #[test]
    fn test_disconnect_response() {
        let response = DisconnectResponse::new(21, ErrorCode::NoError);
        assert_eq!(encode(&response).as_slice(), &[0x15, 0x00]);
    }

    #[test]
    fn test_tunnelling_ack_layout() {
        let ack = TunnellingAck::new(3, 15, ErrorCode::NoError);
        assert_eq!(encode(&ack).as_slice(), &[0x04, 0x03, 0x0F, 0x00]);
        assert!(ack.is_ok());

        let frame = KnxIpFrame::new(ack).to_bytes().unwrap();
        assert_eq!(frame.as_slice(), &[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x03, 0x0F, 0x00]);
        assert!(TunnellingAck::from_knx(&[0x05, 0x03, 0x0F, 0x00]).unwrap_err().is_malformed_frame());
    }

    #[test]
    fn test_tunnelling_request_with_cemi() {
        let telegram = Telegram::new(GroupAddress::from_raw(0x0A03), Apci::GroupValueRead);
        let cemi = CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataReq);
        let request = TunnellingRequest::from_cemi(1, 5, &cemi).unwrap();
        assert_eq!(request.communication_channel_id(), 1);
        assert_eq!(request.sequence_counter(), 5);

        let bytes = encode(&request);
        assert_eq!(&bytes[..4], &[0x04, 0x01, 0x05, 0x00]);
        assert_eq!(bytes[4], 0x11);

        let parsed = TunnellingRequest::from_knx(&bytes).unwrap();
        let decoded = parsed.cemi().unwrap();
        assert_eq!(decoded.telegram().unwrap().destination, telegram.destination);
    }

    #[test]
    fn test_tunnelling_request_keeps_undecodable_cemi() {
        let data = [0x04, 0x01, 0x05, 0x00, 0x30, 0x00];
        let request = TunnellingRequest::from_knx(&data).unwrap();
        assert_eq!(request.sequence_counter(), 5);
        assert!(request.cemi().unwrap_err().is_unhandleable_message());
    }

    #[test]
    fn test_search_request_default_multicast() {
        let request = SearchRequest::default();
        assert_eq!(
            encode(&request).as_slice(),
            &[0x08, 0x01, 224, 0, 23, 12, 0x0E, 0x57]
        );
    }

    #[test]
    fn test_search_response_frame() {
        let mut raw = heapless::Vec::<u8, 64>::new();
        raw.extend_from_slice(&[0x06, 0x10, 0x02, 0x02, 0x00, 0x14]).unwrap();
        raw.extend_from_slice(&[0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57]).unwrap();
        raw.extend_from_slice(&[0x06, 0x02, 0x02, 0x01, 0x04, 0x01]).unwrap();

        let (frame, len) = KnxIpFrame::from_knx(&raw).unwrap();
        assert_eq!(len, 20);
        let KnxIpBody::SearchResponse(response) = &frame.body else {
            panic!("expected search response, got {:?}", frame.body);
        };
        assert_eq!(response.control_endpoint.port(), 3671);
        assert_eq!(response.dibs.len(), 1);
        assert!(response.device_info().is_none());
        assert_eq!(frame.to_bytes().unwrap().as_slice(), raw.as_slice());
    }

    #[test]
    fn test_routing_indication() {
        let raw = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x05, 0x0A, 0x03, 0x01, 0x00, 0x81];
        let indication = RoutingIndication::from_knx(&raw).unwrap();
        assert_eq!(encode(&indication).as_slice(), &raw);
        let cemi = indication.cemi().unwrap();
        assert_eq!(cemi.code, CemiMessageCode::LDataInd);
    }
}
