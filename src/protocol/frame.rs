//! KNXnet/IP frame parsing and encoding.
//!
//! ## Frame Structure
//!
//! All KNXnet/IP frames follow this structure:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! │  - Service-specific data    │
//! └─────────────────────────────┘
//! ```
//!
//! The body is a closed set of variants selected by the service type. A
//! frame always carries a body, and the header's total length is recomputed
//! from it on encode.
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::net::IpEndpoint;
//! use knx_tunnel::protocol::frame::{Hpai, KnxIpBody, KnxIpFrame};
//! use knx_tunnel::protocol::services::DisconnectRequest;
//!
//! let raw = [
//!     0x06, 0x10, 0x02, 0x09, 0x00, 0x10, 0x15, 0x00, 0x08, 0x01, 0xC0, 0xA8, 0xC8, 0x0C, 0xC3, 0xB4,
//! ];
//! let (frame, len) = KnxIpFrame::from_knx(&raw)?;
//! assert_eq!(len, 16);
//! let KnxIpBody::DisconnectRequest(body) = &frame.body else { panic!() };
//! assert_eq!(body.communication_channel_id, 21);
//! assert_eq!(body.control_endpoint, Hpai::new("192.168.200.12:50100".parse::<IpEndpoint>()?));
//!
//! let rebuilt = KnxIpFrame::new(DisconnectRequest::new(21, body.control_endpoint));
//! assert_eq!(rebuilt.to_bytes()?.as_slice(), &raw[..]);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::net::{IpEndpoint, Ipv4Addr};
use crate::protocol::constants::{
    HostProtocol, ServiceType, HEADER_SIZE_10, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse,
    DescriptionRequest, DescriptionResponse, DisconnectRequest, DisconnectResponse,
    RoutingIndication, SearchRequest, SearchResponse, ServiceBody, TunnellingAck,
    TunnellingRequest,
};

/// Fail with `FrameTooSmall` unless `data` holds at least `len` bytes.
#[inline]
pub(crate) fn require(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(KnxError::frame_too_small());
    }
    Ok(())
}

/// Fail with `BufferTooSmall` unless `buf` holds at least `len` bytes.
#[inline]
pub(crate) fn require_buf(buf: &[u8], len: usize) -> Result<()> {
    if buf.len() < len {
        return Err(KnxError::buffer_too_small());
    }
    Ok(())
}

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                   │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxIpHeader {
    /// Protocol version (0x10 for v1.0)
    pub protocol_version: u8,
    /// Service type identifier
    pub service_type: ServiceType,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a new header
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            protocol_version: KNXNETIP_VERSION_10,
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse a header.
    ///
    /// # Errors
    ///
    /// - `IncompleteFrame` with fewer than 6 bytes
    /// - `MalformedFrame` for a wrong header length, protocol version or total length
    /// - `UnsupportedMessage` for a known service without a body implementation
    /// - `UnhandleableMessage` for an unknown service type
    pub fn from_knx(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxError::incomplete_frame());
        }
        let header_length = data[0];
        let protocol_version = data[1];
        let service_type_raw = u16::from_be_bytes([data[2], data[3]]);
        let total_length = u16::from_be_bytes([data[4], data[5]]);

        if header_length != HEADER_SIZE_10 || protocol_version != KNXNETIP_VERSION_10 {
            crate::knx_log!(
                debug,
                "Wrong header length 0x{:02X} or version 0x{:02X}",
                header_length,
                protocol_version
            );
            return Err(KnxError::malformed_frame());
        }
        if usize::from(total_length) < Self::SIZE {
            return Err(KnxError::malformed_frame());
        }

        let service_type = ServiceType::from_u16(service_type_raw).ok_or_else(|| {
            crate::knx_log!(debug, "Unknown service type 0x{:04X}", service_type_raw);
            KnxError::unhandleable_message()
        })?;
        if !KnxIpBody::is_implemented(service_type) {
            crate::knx_log!(debug, "Service type 0x{:04X} not implemented", service_type_raw);
            return Err(KnxError::unsupported_message());
        }

        Ok(Self {
            protocol_version,
            service_type,
            total_length,
        })
    }

    /// Encode the header into a byte buffer
    ///
    /// # Errors
    ///
    /// Returns `BufferTooSmall` if buffer is too small
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, Self::SIZE)?;
        buf[0] = HEADER_SIZE_10;
        buf[1] = self.protocol_version;
        buf[2..4].copy_from_slice(&self.service_type.to_u16().to_be_bytes());
        buf[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        Ok(Self::SIZE)
    }

    /// Get the expected body length from the header
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hpai {
    pub protocol: HostProtocol,
    pub endpoint: IpEndpoint,
}

impl Hpai {
    /// Size of HPAI structure for IPv4
    pub const SIZE: usize = 8;

    /// UDP HPAI for `endpoint`.
    pub const fn new(endpoint: IpEndpoint) -> Self {
        Self {
            protocol: HostProtocol::Ipv4Udp,
            endpoint,
        }
    }

    /// `0.0.0.0:0`, asking the gateway to answer to the sender address (NAT).
    pub const fn route_back() -> Self {
        Self::new(IpEndpoint::UNSPECIFIED)
    }

    /// TCP HPAI. Over TCP the endpoint is always `0.0.0.0:0`; the gateway
    /// answers on the open stream.
    pub const fn tcp() -> Self {
        Self {
            protocol: HostProtocol::Ipv4Tcp,
            endpoint: IpEndpoint::UNSPECIFIED,
        }
    }

    /// Shorthand for the IPv4 address.
    #[inline]
    pub const fn ip_addr(&self) -> Ipv4Addr {
        self.endpoint.addr
    }

    /// Shorthand for the port.
    #[inline]
    pub const fn port(&self) -> u16 {
        self.endpoint.port
    }

    /// Whether this is the route-back endpoint.
    pub fn is_route_back(&self) -> bool {
        self.endpoint == IpEndpoint::UNSPECIFIED
    }

    /// Parse HPAI from bytes
    ///
    /// # Errors
    ///
    /// `FrameTooSmall` with fewer than 8 bytes, `MalformedFrame` for a wrong
    /// structure length or unknown host protocol.
    pub fn from_knx(data: &[u8]) -> Result<Self> {
        require(data, Self::SIZE)?;
        if usize::from(data[0]) != Self::SIZE {
            return Err(KnxError::malformed_frame());
        }
        let protocol = HostProtocol::from_u8(data[1]).ok_or_else(KnxError::malformed_frame)?;
        let addr = Ipv4Addr::new(data[2], data[3], data[4], data[5]);
        let port = u16::from_be_bytes([data[6], data[7]]);
        Ok(Self {
            protocol,
            endpoint: IpEndpoint::new(addr, port),
        })
    }

    /// Encode HPAI into bytes
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when `buf` is shorter than 8 bytes.
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        require_buf(buf, Self::SIZE)?;
        buf[0] = Self::SIZE as u8;
        buf[1] = self.protocol as u8;
        buf[2..6].copy_from_slice(&self.endpoint.addr.octets());
        buf[6..8].copy_from_slice(&self.endpoint.port.to_be_bytes());
        Ok(Self::SIZE)
    }
}

impl From<IpEndpoint> for Hpai {
    fn from(endpoint: IpEndpoint) -> Self {
        Self::new(endpoint)
    }
}

/// Body of a KNXnet/IP frame, one variant per implemented service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxIpBody {
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    DescriptionRequest(DescriptionRequest),
    DescriptionResponse(DescriptionResponse),
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
    ConnectionStateRequest(ConnectionStateRequest),
    ConnectionStateResponse(ConnectionStateResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    TunnellingRequest(TunnellingRequest),
    TunnellingAck(TunnellingAck),
    RoutingIndication(RoutingIndication),
}

macro_rules! dispatch_body {
    ($body:expr, $inner:ident => $action:expr) => {
        match $body {
            KnxIpBody::SearchRequest($inner) => $action,
            KnxIpBody::SearchResponse($inner) => $action,
            KnxIpBody::DescriptionRequest($inner) => $action,
            KnxIpBody::DescriptionResponse($inner) => $action,
            KnxIpBody::ConnectRequest($inner) => $action,
            KnxIpBody::ConnectResponse($inner) => $action,
            KnxIpBody::ConnectionStateRequest($inner) => $action,
            KnxIpBody::ConnectionStateResponse($inner) => $action,
            KnxIpBody::DisconnectRequest($inner) => $action,
            KnxIpBody::DisconnectResponse($inner) => $action,
            KnxIpBody::TunnellingRequest($inner) => $action,
            KnxIpBody::TunnellingAck($inner) => $action,
            KnxIpBody::RoutingIndication($inner) => $action,
        }
    };
}

impl KnxIpBody {
    /// Whether a body implementation exists for `service_type`.
    pub const fn is_implemented(service_type: ServiceType) -> bool {
        matches!(
            service_type,
            ServiceType::SearchRequest
                | ServiceType::SearchResponse
                | ServiceType::DescriptionRequest
                | ServiceType::DescriptionResponse
                | ServiceType::ConnectRequest
                | ServiceType::ConnectResponse
                | ServiceType::ConnectionStateRequest
                | ServiceType::ConnectionStateResponse
                | ServiceType::DisconnectRequest
                | ServiceType::DisconnectResponse
                | ServiceType::TunnellingRequest
                | ServiceType::TunnellingAck
                | ServiceType::RoutingIndication
        )
    }

    /// Parse the body for `service_type`.
    ///
    /// # Errors
    ///
    /// `UnsupportedMessage` for services without a body implementation, or
    /// the body's own parse error.
    pub fn from_knx(service_type: ServiceType, data: &[u8]) -> Result<Self> {
        let body = match service_type {
            ServiceType::SearchRequest => Self::SearchRequest(SearchRequest::from_knx(data)?),
            ServiceType::SearchResponse => Self::SearchResponse(SearchResponse::from_knx(data)?),
            ServiceType::DescriptionRequest => {
                Self::DescriptionRequest(DescriptionRequest::from_knx(data)?)
            }
            ServiceType::DescriptionResponse => {
                Self::DescriptionResponse(DescriptionResponse::from_knx(data)?)
            }
            ServiceType::ConnectRequest => Self::ConnectRequest(ConnectRequest::from_knx(data)?),
            ServiceType::ConnectResponse => Self::ConnectResponse(ConnectResponse::from_knx(data)?),
            ServiceType::ConnectionStateRequest => {
                Self::ConnectionStateRequest(ConnectionStateRequest::from_knx(data)?)
            }
            ServiceType::ConnectionStateResponse => {
                Self::ConnectionStateResponse(ConnectionStateResponse::from_knx(data)?)
            }
            ServiceType::DisconnectRequest => {
                Self::DisconnectRequest(DisconnectRequest::from_knx(data)?)
            }
            ServiceType::DisconnectResponse => {
                Self::DisconnectResponse(DisconnectResponse::from_knx(data)?)
            }
            ServiceType::TunnellingRequest => {
                Self::TunnellingRequest(TunnellingRequest::from_knx(data)?)
            }
            ServiceType::TunnellingAck => Self::TunnellingAck(TunnellingAck::from_knx(data)?),
            ServiceType::RoutingIndication => {
                Self::RoutingIndication(RoutingIndication::from_knx(data)?)
            }
            ServiceType::DeviceConfigurationRequest
            | ServiceType::DeviceConfigurationAck
            | ServiceType::RoutingLostMessage
            | ServiceType::RoutingBusy
            | ServiceType::RemoteDiagnosticRequest
            | ServiceType::RemoteDiagnosticResponse
            | ServiceType::SecureWrapper
            | ServiceType::SessionRequest
            | ServiceType::SessionResponse
            | ServiceType::SessionAuthenticate
            | ServiceType::SessionStatus => return Err(KnxError::unsupported_message()),
        };
        Ok(body)
    }

    /// Service type of this body.
    pub fn service_type(&self) -> ServiceType {
        fn of<B: ServiceBody>(_: &B) -> ServiceType {
            B::SERVICE_TYPE
        }
        dispatch_body!(self, body => of(body))
    }

    /// Encoded body length.
    pub fn calculated_length(&self) -> usize {
        dispatch_body!(self, body => body.calculated_length())
    }

    /// Encode the body into `buf`.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall`, or the body's own encode error.
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        dispatch_body!(self, body => body.to_knx(buf))
    }
}

macro_rules! body_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for KnxIpBody {
                fn from(body: $variant) -> Self {
                    Self::$variant(body)
                }
            }
        )*
    };
}

body_from!(
    SearchRequest,
    SearchResponse,
    DescriptionRequest,
    DescriptionResponse,
    ConnectRequest,
    ConnectResponse,
    ConnectionStateRequest,
    ConnectionStateResponse,
    DisconnectRequest,
    DisconnectResponse,
    TunnellingRequest,
    TunnellingAck,
    RoutingIndication,
);

/// A KNXnet/IP frame: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxIpFrame {
    pub header: KnxIpHeader,
    pub body: KnxIpBody,
}

impl KnxIpFrame {
    /// Frame around `body` with a matching header.
    pub fn new(body: impl Into<KnxIpBody>) -> Self {
        let body = body.into();
        let body_length = body.calculated_length() as u16;
        Self {
            header: KnxIpHeader::new(body.service_type(), body_length),
            body,
        }
    }

    /// Service type of the frame.
    #[inline]
    pub fn service_type(&self) -> ServiceType {
        self.body.service_type()
    }

    /// Parse a frame from the start of `data`. Returns the frame and the
    /// header's total length. Bytes past the total length are ignored.
    ///
    /// # Errors
    ///
    /// - `IncompleteFrame` when `data` is shorter than the header or its total length
    /// - `MalformedFrame` when the body does not fill the declared length exactly
    /// - header and body errors, see [`KnxIpHeader::from_knx`]
    pub fn from_knx(data: &[u8]) -> Result<(Self, usize)> {
        let header = KnxIpHeader::from_knx(data)?;
        let total_length = usize::from(header.total_length);
        if data.len() < total_length {
            crate::knx_log!(
                debug,
                "Incomplete frame: {} of {} bytes",
                data.len(),
                total_length
            );
            return Err(KnxError::incomplete_frame());
        }
        let body_data = &data[KnxIpHeader::SIZE..total_length];
        let body = KnxIpBody::from_knx(header.service_type, body_data)?;
        if body.calculated_length() != body_data.len() {
            return Err(KnxError::malformed_frame());
        }
        Ok((Self { header, body }, total_length))
    }

    /// Encode into `buf`. The header's total length is recomputed from the body.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when `buf` cannot hold the frame, or the body's encode error.
    pub fn to_knx(&self, buf: &mut [u8]) -> Result<usize> {
        let body_length = self.body.calculated_length();
        let total = KnxIpHeader::SIZE + body_length;
        require_buf(buf, total)?;
        let header = KnxIpHeader {
            protocol_version: self.header.protocol_version,
            service_type: self.body.service_type(),
            total_length: total as u16,
        };
        header.to_knx(buf)?;
        self.body.to_knx(&mut buf[KnxIpHeader::SIZE..total])?;
        Ok(total)
    }

    /// Encode into a bounded vector.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when the frame exceeds [`MAX_FRAME_SIZE`].
    pub fn to_bytes(&self) -> Result<heapless::Vec<u8, MAX_FRAME_SIZE>> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = self.to_knx(&mut buf)?;
        heapless::Vec::from_slice(&buf[..len]).map_err(|_| KnxError::buffer_too_small())
    }
}
