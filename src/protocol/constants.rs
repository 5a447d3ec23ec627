//! KNXnet/IP protocol constants, service type identifiers and code tables.

use crate::net::Ipv4Addr;

/// KNXnet/IP protocol version 1.0
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// Standard KNXnet/IP header length (6 bytes)
pub const HEADER_SIZE_10: u8 = 0x06;

/// Standard UDP port for KNXnet/IP communication
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// Maximum size of an encoded KNXnet/IP frame
pub const MAX_FRAME_SIZE: usize = 256;

/// Maximum size of an encoded cEMI frame
pub const MAX_CEMI_SIZE: usize = 128;

/// KNXnet/IP multicast address for routing and discovery
pub const KNXNETIP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 12);

// =============================================================================
// Service Type Identifiers
// =============================================================================

/// KNXnet/IP Service Type Identifiers
///
/// Every identifier defined by KNXnet/IP. Only the core, tunnelling and
/// routing indication services have a body implementation; the rest decode
/// to an unsupported-message error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ServiceType {
    // Core services (0x02xx)
    /// `SEARCH_REQUEST` - Device discovery request
    SearchRequest = 0x0201,
    /// `SEARCH_RESPONSE` - Device discovery response
    SearchResponse = 0x0202,
    /// `DESCRIPTION_REQUEST` - Device description request
    DescriptionRequest = 0x0203,
    /// `DESCRIPTION_RESPONSE` - Device description response
    DescriptionResponse = 0x0204,
    /// `CONNECT_REQUEST` - Connection request
    ConnectRequest = 0x0205,
    /// `CONNECT_RESPONSE` - Connection response
    ConnectResponse = 0x0206,
    /// `CONNECTIONSTATE_REQUEST` - Connection state request (heartbeat)
    ConnectionStateRequest = 0x0207,
    /// `CONNECTIONSTATE_RESPONSE` - Connection state response
    ConnectionStateResponse = 0x0208,
    /// `DISCONNECT_REQUEST` - Disconnect request
    DisconnectRequest = 0x0209,
    /// `DISCONNECT_RESPONSE` - Disconnect response
    DisconnectResponse = 0x020A,

    // Device Management (0x03xx)
    /// `DEVICE_CONFIGURATION_REQUEST`
    DeviceConfigurationRequest = 0x0310,
    /// `DEVICE_CONFIGURATION_ACK`
    DeviceConfigurationAck = 0x0311,

    // Tunnelling (0x04xx)
    /// `TUNNELLING_REQUEST` - Tunnelling data request
    TunnellingRequest = 0x0420,
    /// `TUNNELLING_ACK` - Tunnelling acknowledgement
    TunnellingAck = 0x0421,

    // Routing (0x05xx)
    /// `ROUTING_INDICATION` - Routing indication (multicast)
    RoutingIndication = 0x0530,
    /// `ROUTING_LOST_MESSAGE` - Routing lost message indication
    RoutingLostMessage = 0x0531,
    /// `ROUTING_BUSY` - Routing busy indication
    RoutingBusy = 0x0532,

    // Remote diagnosis (0x07xx)
    /// `REMOTE_DIAGNOSTIC_REQUEST`
    RemoteDiagnosticRequest = 0x0740,
    /// `REMOTE_DIAGNOSTIC_RESPONSE`
    RemoteDiagnosticResponse = 0x0741,

    // Secure services (0x09xx)
    /// `SECURE_WRAPPER` - Secure session wrapper
    SecureWrapper = 0x0950,
    /// `SESSION_REQUEST` - Secure session request
    SessionRequest = 0x0951,
    /// `SESSION_RESPONSE` - Secure session response
    SessionResponse = 0x0952,
    /// `SESSION_AUTHENTICATE` - Secure session authentication
    SessionAuthenticate = 0x0953,
    /// `SESSION_STATUS` - Secure session status
    SessionStatus = 0x0954,
}

impl ServiceType {
    /// Convert a u16 to `ServiceType`
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0201 => Some(Self::SearchRequest),
            0x0202 => Some(Self::SearchResponse),
            0x0203 => Some(Self::DescriptionRequest),
            0x0204 => Some(Self::DescriptionResponse),
            0x0205 => Some(Self::ConnectRequest),
            0x0206 => Some(Self::ConnectResponse),
            0x0207 => Some(Self::ConnectionStateRequest),
            0x0208 => Some(Self::ConnectionStateResponse),
            0x0209 => Some(Self::DisconnectRequest),
            0x020A => Some(Self::DisconnectResponse),
            0x0310 => Some(Self::DeviceConfigurationRequest),
            0x0311 => Some(Self::DeviceConfigurationAck),
            0x0420 => Some(Self::TunnellingRequest),
            0x0421 => Some(Self::TunnellingAck),
            0x0530 => Some(Self::RoutingIndication),
            0x0531 => Some(Self::RoutingLostMessage),
            0x0532 => Some(Self::RoutingBusy),
            0x0740 => Some(Self::RemoteDiagnosticRequest),
            0x0741 => Some(Self::RemoteDiagnosticResponse),
            0x0950 => Some(Self::SecureWrapper),
            0x0951 => Some(Self::SessionRequest),
            0x0952 => Some(Self::SessionResponse),
            0x0953 => Some(Self::SessionAuthenticate),
            0x0954 => Some(Self::SessionStatus),
            _ => None,
        }
    }

    /// Convert `ServiceType` to u16
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Connection Type, Layer and Host Protocol Codes
// =============================================================================

/// Connection type for `TUNNEL_CONNECTION`
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// Tunnelling on the data link layer
pub const TUNNEL_LINKLAYER: u8 = 0x02;

/// Tunnelling of raw frames
pub const TUNNEL_RAW: u8 = 0x04;

/// Tunnelling in bus monitor mode
pub const TUNNEL_BUSMONITOR: u8 = 0x80;

/// Host protocol of an HPAI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum HostProtocol {
    /// IPv4 UDP
    #[default]
    Ipv4Udp = 0x01,
    /// IPv4 TCP
    Ipv4Tcp = 0x02,
}

impl HostProtocol {
    /// Convert u8 to `HostProtocol`
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ipv4Udp),
            0x02 => Some(Self::Ipv4Tcp),
            _ => None,
        }
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Status codes carried in connect, connection-state, disconnect and ack bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    /// Operation successful
    #[default]
    NoError = 0x00,
    /// Requested host protocol not supported
    HostProtocolType = 0x01,
    /// Requested protocol version not supported
    VersionNotSupported = 0x02,
    /// Received sequence number out of order
    SequenceNumber = 0x04,
    /// Undefined error
    Error = 0x0F,
    /// No active connection with the given channel id
    ConnectionId = 0x21,
    /// Connection type not supported
    ConnectionType = 0x22,
    /// Connection option not supported
    ConnectionOption = 0x23,
    /// No more connections available
    NoMoreConnections = 0x24,
    /// No more unique connections available
    NoMoreUniqueConnections = 0x25,
    /// Error in the data connection
    DataConnection = 0x26,
    /// Error in the KNX subnetwork connection
    KnxConnection = 0x27,
    /// Authorisation failed
    AuthorisationError = 0x28,
    /// Tunnelling layer not supported
    TunnellingLayer = 0x29,
    /// No tunnelling address available
    NoTunnellingAddress = 0x2D,
    /// Tunnelling address already in use
    ConnectionInUse = 0x2E,
}

impl ErrorCode {
    /// Convert u8 to `ErrorCode`
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::NoError),
            0x01 => Some(Self::HostProtocolType),
            0x02 => Some(Self::VersionNotSupported),
            0x04 => Some(Self::SequenceNumber),
            0x0F => Some(Self::Error),
            0x21 => Some(Self::ConnectionId),
            0x22 => Some(Self::ConnectionType),
            0x23 => Some(Self::ConnectionOption),
            0x24 => Some(Self::NoMoreConnections),
            0x25 => Some(Self::NoMoreUniqueConnections),
            0x26 => Some(Self::DataConnection),
            0x27 => Some(Self::KnxConnection),
            0x28 => Some(Self::AuthorisationError),
            0x29 => Some(Self::TunnellingLayer),
            0x2D => Some(Self::NoTunnellingAddress),
            0x2E => Some(Self::ConnectionInUse),
            _ => None,
        }
    }

    /// Convert `ErrorCode` to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// cEMI Message Codes
// =============================================================================

/// cEMI Message Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CemiMessageCode {
    /// `L_Raw.req` - Raw frame request
    LRawReq = 0x10,
    /// `L_Data.req` - Data request
    LDataReq = 0x11,
    /// `L_Poll_Data.req` - Poll data request
    LPollDataReq = 0x13,
    /// `L_Poll_Data.con` - Poll data confirmation
    LPollDataCon = 0x25,
    /// `L_Data.ind` - Data indication
    LDataInd = 0x29,
    /// `L_Busmon.ind` - Bus monitor indication
    LBusmonInd = 0x2B,
    /// `L_Raw.ind` - Raw frame indication
    LRawInd = 0x2D,
    /// `L_Data.con` - Data confirmation
    LDataCon = 0x2E,
    /// `L_Raw.con` - Raw frame confirmation
    LRawCon = 0x2F,
    /// `M_Reset.ind`
    MResetInd = 0xF0,
    /// `M_Reset.req`
    MResetReq = 0xF1,
    /// `M_PropWrite.con`
    MPropWriteCon = 0xF5,
    /// `M_PropWrite.req`
    MPropWriteReq = 0xF6,
    /// `M_PropInfo.ind`
    MPropInfoInd = 0xF7,
    /// `M_FuncPropCommand.req`
    MFuncPropCommandReq = 0xF8,
    /// `M_FuncPropStateRead.req`
    MFuncPropStateReadReq = 0xF9,
    /// `M_FuncPropCommand.con`
    MFuncPropCommandCon = 0xFA,
    /// `M_PropRead.con`
    MPropReadCon = 0xFB,
    /// `M_PropRead.req`
    MPropReadReq = 0xFC,
}

impl CemiMessageCode {
    /// Convert u8 to `CemiMessageCode`
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::LRawReq),
            0x11 => Some(Self::LDataReq),
            0x13 => Some(Self::LPollDataReq),
            0x25 => Some(Self::LPollDataCon),
            0x29 => Some(Self::LDataInd),
            0x2B => Some(Self::LBusmonInd),
            0x2D => Some(Self::LRawInd),
            0x2E => Some(Self::LDataCon),
            0x2F => Some(Self::LRawCon),
            0xF0 => Some(Self::MResetInd),
            0xF1 => Some(Self::MResetReq),
            0xF5 => Some(Self::MPropWriteCon),
            0xF6 => Some(Self::MPropWriteReq),
            0xF7 => Some(Self::MPropInfoInd),
            0xF8 => Some(Self::MFuncPropCommandReq),
            0xF9 => Some(Self::MFuncPropStateReadReq),
            0xFA => Some(Self::MFuncPropCommandCon),
            0xFB => Some(Self::MPropReadCon),
            0xFC => Some(Self::MPropReadReq),
            _ => None,
        }
    }

    /// Convert `CemiMessageCode` to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Data link layer codes carrying a telegram.
    pub const fn is_data_link(self) -> bool {
        matches!(self, Self::LDataInd | Self::LDataReq | Self::LDataCon)
    }
}

// =============================================================================
// cEMI Control Field Flags (control field 1 << 8 | control field 2)
// =============================================================================

/// cEMI flag bits as a 16-bit value.
pub mod cemi_flags {
    /// Standard (not extended) frame
    pub const FRAME_TYPE_STANDARD: u16 = 0x8000;
    /// Do not repeat on error
    pub const DO_NOT_REPEAT: u16 = 0x2000;
    /// System broadcast off (broadcast)
    pub const BROADCAST: u16 = 0x1000;
    /// Low priority
    pub const PRIORITY_LOW: u16 = 0x0C00;
    /// No layer 2 ack requested
    pub const NO_ACK_REQUESTED: u16 = 0x0000;
    /// Confirmation without error
    pub const CONFIRM_NO_ERROR: u16 = 0x0000;
    /// Destination is a group address
    pub const DESTINATION_GROUP_ADDRESS: u16 = 0x0080;
    /// Default hop count (6)
    pub const HOP_COUNT_1ST: u16 = 0x0060;
    /// Hop count bits
    pub const HOP_COUNT_MASK: u16 = 0x0070;
}

// =============================================================================
// Description Information Block types
// =============================================================================

/// DIB type: device information
pub const DIB_DEVICE_INFO: u8 = 0x01;
/// DIB type: supported service families
pub const DIB_SUPP_SVC_FAMILIES: u8 = 0x02;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_round_trip() {
        for raw in [0x0201u16, 0x0209, 0x020A, 0x0420, 0x0421, 0x0530, 0x0310] {
            assert_eq!(ServiceType::from_u16(raw).map(ServiceType::to_u16), Some(raw));
        }
        assert_eq!(ServiceType::from_u16(0x0666), None);
    }

    #[test]
    fn test_cemi_codes() {
        assert_eq!(CemiMessageCode::from_u8(0x29), Some(CemiMessageCode::LDataInd));
        assert!(CemiMessageCode::LDataCon.is_data_link());
        assert!(!CemiMessageCode::LBusmonInd.is_data_link());
        assert_eq!(CemiMessageCode::from_u8(0x30), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::from_u8(0x24), Some(ErrorCode::NoMoreConnections));
        assert_eq!(ErrorCode::TunnellingLayer.to_u8(), 0x29);
        assert_eq!(ErrorCode::from_u8(0x99), None);
    }

    #[test]
    fn test_telegram_flags() {
        use cemi_flags::*;
        let flags = FRAME_TYPE_STANDARD
            | DO_NOT_REPEAT
            | BROADCAST
            | PRIORITY_LOW
            | NO_ACK_REQUESTED
            | CONFIRM_NO_ERROR
            | HOP_COUNT_1ST;
        assert_eq!(flags, 0xBC60);
    }
}
