//! Sans-IO tunnelling state machine.
//!
//! [`TunnelCore`] owns everything a tunnel connection mutates: the state,
//! the communication channel id, both sequence counters and the address the
//! gateway assigned. It builds outbound frames and validates inbound bodies,
//! but never touches a socket or a timer. The async
//! [`TunnellingSession`](crate::protocol::session::TunnellingSession) drives
//! it from the send path and the receive loop.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnecting → Disconnected
//!                  ↓ (error)     ↓ (ack/heartbeat loss)
//!               (origin)    Reconnecting → Connecting
//! ```
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::net::IpEndpoint;
//! use knx_tunnel::protocol::frame::Hpai;
//! use knx_tunnel::protocol::services::ConnectResponse;
//! use knx_tunnel::protocol::tunnel::{TunnelCore, TunnelState};
//! use knx_tunnel::IndividualAddress;
//!
//! let gateway: IpEndpoint = "192.168.1.10:3671".parse()?;
//! let mut core = TunnelCore::new(gateway, Hpai::route_back());
//!
//! let request = core.connect_request()?;
//! // send `request` to the gateway...
//! assert_eq!(core.state(), TunnelState::Connecting);
//!
//! let response = ConnectResponse::accepted(5, Hpai::new(gateway), IndividualAddress::from_raw(0x11FF));
//! core.handle_connect_response(&response)?;
//! assert_eq!(core.state(), TunnelState::Connected);
//! assert_eq!(core.channel_id(), Some(5));
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use core::fmt;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::IpEndpoint;
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{ErrorCode, MAX_FRAME_SIZE};
use crate::protocol::frame::{Hpai, KnxIpBody, KnxIpFrame};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse,
    DisconnectRequest, DisconnectResponse, TunnellingAck, TunnellingRequest,
};

/// An encoded frame ready to send.
pub type FrameBytes = heapless::Vec<u8, MAX_FRAME_SIZE>;

fn encode(body: impl Into<KnxIpBody>) -> Result<FrameBytes> {
    KnxIpFrame::new(body).to_bytes()
}

/// Connection state of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TunnelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The connection was lost and will be re-established.
    Reconnecting,
    Disconnecting,
}

impl TunnelState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with an inbound tunnelling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Acknowledgment frame to send back immediately.
    pub ack: FrameBytes,
    /// Whether the request carries the next expected sequence number and
    /// its telegram should reach the consumer.
    pub deliver: bool,
}

/// Tunnel connection state without I/O.
#[derive(Debug, Clone)]
pub struct TunnelCore {
    gateway: IpEndpoint,
    control_endpoint: Hpai,
    data_endpoint: Hpai,
    /// Where the gateway wants tunnelling frames, when it named an address.
    gateway_data_endpoint: Option<IpEndpoint>,
    state: TunnelState,
    /// State to fall back to when a connect attempt fails.
    connect_origin: TunnelState,
    channel_id: Option<u8>,
    send_sequence: u8,
    recv_sequence: u8,
    individual_address: Option<IndividualAddress>,
}

impl TunnelCore {
    /// Core for `gateway`, advertising `local` as control and data endpoint.
    pub const fn new(gateway: IpEndpoint, local: Hpai) -> Self {
        Self {
            gateway,
            control_endpoint: local,
            data_endpoint: local,
            gateway_data_endpoint: None,
            state: TunnelState::Disconnected,
            connect_origin: TunnelState::Disconnected,
            channel_id: None,
            send_sequence: 0,
            recv_sequence: 0,
            individual_address: None,
        }
    }

    #[inline]
    pub const fn gateway(&self) -> IpEndpoint {
        self.gateway
    }

    #[inline]
    pub const fn control_endpoint(&self) -> Hpai {
        self.control_endpoint
    }

    /// Destination for tunnelling requests and acks: the gateway's data
    /// endpoint, or its control endpoint when it answered with route back.
    pub fn data_target(&self) -> IpEndpoint {
        self.gateway_data_endpoint.unwrap_or(self.gateway)
    }

    #[inline]
    pub const fn state(&self) -> TunnelState {
        self.state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == TunnelState::Connected
    }

    /// Channel id assigned by the gateway, while a channel is open.
    #[inline]
    pub const fn channel_id(&self) -> Option<u8> {
        self.channel_id
    }

    /// Sequence number of the next outbound tunnelling request.
    #[inline]
    pub const fn send_sequence(&self) -> u8 {
        self.send_sequence
    }

    /// Sequence number expected on the next inbound tunnelling request.
    #[inline]
    pub const fn recv_sequence(&self) -> u8 {
        self.recv_sequence
    }

    /// Address the gateway assigned to this tunnel.
    #[inline]
    pub const fn individual_address(&self) -> Option<IndividualAddress> {
        self.individual_address
    }

    fn connected_channel(&self) -> Result<u8> {
        match (self.state, self.channel_id) {
            (TunnelState::Connected, Some(channel)) => Ok(channel),
            _ => Err(KnxError::not_connected()),
        }
    }

    fn transition(&mut self, next: TunnelState) {
        if self.state != next {
            crate::knx_log!(debug, "Tunnel state {} -> {}", self.state.as_str(), next.as_str());
            self.state = next;
        }
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Build a `CONNECT_REQUEST` and enter `Connecting`.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` while a channel is open or being opened,
    /// `InvalidState` while disconnecting.
    pub fn connect_request(&mut self) -> Result<FrameBytes> {
        match self.state {
            TunnelState::Disconnected | TunnelState::Reconnecting => {}
            TunnelState::Connected | TunnelState::Connecting => {
                return Err(KnxError::already_connected())
            }
            TunnelState::Disconnecting => return Err(KnxError::InvalidState),
        }
        let frame = encode(ConnectRequest::tunnel(self.control_endpoint, self.data_endpoint))?;
        self.connect_origin = self.state;
        self.channel_id = None;
        self.transition(TunnelState::Connecting);
        Ok(frame)
    }

    /// Apply a `CONNECT_RESPONSE`.
    ///
    /// On success the channel id is captured and both sequence counters
    /// reset. On a refusal the core returns to the state it connected from.
    ///
    /// # Errors
    ///
    /// `InvalidState` when no connect is pending, `ConnectionRefused` with the
    /// gateway's status otherwise.
    pub fn handle_connect_response(&mut self, response: &ConnectResponse) -> Result<()> {
        if self.state != TunnelState::Connecting {
            return Err(KnxError::InvalidState);
        }
        if !response.is_ok() {
            crate::knx_log!(
                warn,
                "Gateway refused connection: status 0x{:02X}",
                response.status_code.to_u8()
            );
            self.transition(self.connect_origin);
            return Err(KnxError::connection_refused(response.status_code.to_u8()));
        }
        self.channel_id = Some(response.communication_channel_id);
        self.send_sequence = 0;
        self.recv_sequence = 0;
        self.individual_address = response.individual_address();
        self.gateway_data_endpoint = response
            .data_endpoint
            .filter(|hpai| !hpai.is_route_back())
            .map(|hpai| hpai.endpoint);
        self.transition(TunnelState::Connected);
        crate::knx_log!(
            info,
            "Tunnel connected on channel {}",
            response.communication_channel_id
        );
        Ok(())
    }

    /// Give up a pending connect without a response.
    pub fn abort_connect(&mut self) {
        if self.state == TunnelState::Connecting {
            self.transition(self.connect_origin);
        }
    }

    // =========================================================================
    // Tunnelling
    // =========================================================================

    /// Build a `TUNNELING_REQUEST` carrying `cemi` with the current send
    /// sequence. The sequence only advances in [`Self::confirm_ack`], so a
    /// retransmission reuses the same number.
    ///
    /// # Errors
    ///
    /// `NotConnected` without an open channel, or CEMI encoding errors.
    pub fn tunnelling_request(&self, cemi: &CemiFrame) -> Result<FrameBytes> {
        let channel = self.connected_channel()?;
        encode(TunnellingRequest::from_cemi(channel, self.send_sequence, cemi)?)
    }

    /// Whether `ack` acknowledges the outstanding request.
    pub fn is_matching_ack(&self, ack: &TunnellingAck) -> bool {
        self.state == TunnelState::Connected
            && self.channel_id == Some(ack.communication_channel_id())
            && ack.sequence_counter() == self.send_sequence
    }

    /// Advance the send sequence if `ack` acknowledges the outstanding
    /// request with a success status. Returns whether it did.
    pub fn confirm_ack(&mut self, ack: &TunnellingAck) -> bool {
        if !self.is_matching_ack(ack) {
            return false;
        }
        if !ack.is_ok() {
            crate::knx_log!(
                warn,
                "Tunnelling ack for sequence {} with status 0x{:02X}",
                ack.sequence_counter(),
                ack.status_code.to_u8()
            );
            return false;
        }
        self.send_sequence = self.send_sequence.wrapping_add(1);
        true
    }

    /// Handle a gateway-initiated `TUNNELING_REQUEST`.
    ///
    /// Returns `None` when no channel is open or the request is for another
    /// channel. Otherwise the request is always acknowledged, and marked for
    /// delivery only when it carries the expected sequence number.
    ///
    /// # Errors
    ///
    /// Encoding the acknowledgment frame.
    pub fn handle_tunnelling_request(&mut self, request: &TunnellingRequest) -> Result<Option<InboundRequest>> {
        let (TunnelState::Connected, Some(channel)) = (self.state, self.channel_id) else {
            return Ok(None);
        };
        if request.communication_channel_id() != channel {
            crate::knx_log!(
                debug,
                "Ignoring tunnelling request for channel {}",
                request.communication_channel_id()
            );
            return Ok(None);
        }
        let sequence = request.sequence_counter();
        let ack = encode(TunnellingAck::new(channel, sequence, ErrorCode::NoError))?;
        let deliver = sequence == self.recv_sequence;
        if deliver {
            self.recv_sequence = self.recv_sequence.wrapping_add(1);
        } else {
            crate::knx_log!(
                debug,
                "Suppressing tunnelling request {} (expected {})",
                sequence,
                self.recv_sequence
            );
        }
        Ok(Some(InboundRequest { ack, deliver }))
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    /// Build a `CONNECTIONSTATE_REQUEST`.
    ///
    /// # Errors
    ///
    /// `NotConnected` without an open channel.
    pub fn heartbeat_request(&self) -> Result<FrameBytes> {
        let channel = self.connected_channel()?;
        encode(ConnectionStateRequest::new(channel, self.control_endpoint))
    }

    /// Whether `response` answers a heartbeat on the current channel.
    pub fn is_matching_heartbeat(&self, response: &ConnectionStateResponse) -> bool {
        self.channel_id == Some(response.communication_channel_id)
    }

    /// Check a `CONNECTIONSTATE_RESPONSE`.
    ///
    /// # Errors
    ///
    /// `ConnectionLost` when the gateway reports an error for the channel.
    pub fn handle_heartbeat_response(&self, response: &ConnectionStateResponse) -> Result<()> {
        if !response.is_ok() {
            crate::knx_log!(
                warn,
                "Heartbeat failed: status 0x{:02X}",
                response.status_code.to_u8()
            );
            return Err(KnxError::connection_lost());
        }
        Ok(())
    }

    // =========================================================================
    // Connection loss and disconnect
    // =========================================================================

    /// Mark the connection as lost. The channel id is kept so a teardown
    /// request can still be sent for it.
    pub fn connection_lost(&mut self, auto_reconnect: bool) {
        crate::knx_log!(warn, "Tunnel connection lost");
        if auto_reconnect {
            self.transition(TunnelState::Reconnecting);
        } else {
            self.transition(TunnelState::Disconnected);
        }
    }

    /// Best-effort `DISCONNECT_REQUEST` for a channel that was lost,
    /// clearing it. Returns `None` when no channel is left.
    ///
    /// # Errors
    ///
    /// Encoding the frame.
    pub fn teardown_request(&mut self) -> Result<Option<FrameBytes>> {
        if matches!(self.state, TunnelState::Connected | TunnelState::Connecting) {
            return Err(KnxError::InvalidState);
        }
        match self.channel_id.take() {
            Some(channel) => Ok(Some(encode(DisconnectRequest::new(channel, self.control_endpoint))?)),
            None => Ok(None),
        }
    }

    /// Build a `DISCONNECT_REQUEST` and enter `Disconnecting`.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a channel.
    pub fn disconnect_request(&mut self) -> Result<FrameBytes> {
        let channel = match (self.state, self.channel_id) {
            (TunnelState::Connected | TunnelState::Reconnecting, Some(channel)) => channel,
            _ => return Err(KnxError::not_connected()),
        };
        let frame = encode(DisconnectRequest::new(channel, self.control_endpoint))?;
        self.transition(TunnelState::Disconnecting);
        Ok(frame)
    }

    /// Whether `response` answers our `DISCONNECT_REQUEST`.
    pub fn is_matching_disconnect(&self, response: &DisconnectResponse) -> bool {
        self.state == TunnelState::Disconnecting
            && self.channel_id == Some(response.communication_channel_id)
    }

    /// Enter `Disconnected`, whether or not the gateway answered.
    pub fn finish_disconnect(&mut self) {
        self.channel_id = None;
        self.individual_address = None;
        self.gateway_data_endpoint = None;
        self.transition(TunnelState::Disconnected);
        crate::knx_log!(info, "Tunnel disconnected");
    }

    /// Handle a gateway-initiated `DISCONNECT_REQUEST`. Returns the response
    /// to send when it targets the open channel.
    ///
    /// # Errors
    ///
    /// Encoding the response frame.
    pub fn handle_disconnect_request(
        &mut self,
        request: &DisconnectRequest,
        auto_reconnect: bool,
    ) -> Result<Option<FrameBytes>> {
        if self.channel_id != Some(request.communication_channel_id) {
            return Ok(None);
        }
        let frame = encode(DisconnectResponse::new(
            request.communication_channel_id,
            ErrorCode::NoError,
        ))?;
        crate::knx_log!(
            warn,
            "Gateway closed channel {}",
            request.communication_channel_id
        );
        self.channel_id = None;
        self.individual_address = None;
        self.gateway_data_endpoint = None;
        if auto_reconnect && self.state == TunnelState::Connected {
            self.transition(TunnelState::Reconnecting);
        } else {
            self.transition(TunnelState::Disconnected);
        }
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::net::Ipv4Addr;
    use crate::protocol::constants::{CemiMessageCode, ServiceType};
    use crate::protocol::services::ServiceBody;
    use crate::telegram::{Apci, Telegram};

    fn gateway() -> IpEndpoint {
        IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3671)
    }

    fn connected(channel: u8) -> TunnelCore {
        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        core.connect_request().unwrap();
        core.handle_connect_response(&ConnectResponse::accepted(
            channel,
            Hpai::new(gateway()),
            IndividualAddress::from_raw(0x11FF),
        ))
        .unwrap();
        core
    }

    fn cemi() -> CemiFrame {
        let telegram = Telegram::new(GroupAddress::from_raw(0x0A03), Apci::GroupValueRead);
        CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataReq)
    }

    fn parse(frame: &[u8]) -> KnxIpFrame {
        KnxIpFrame::from_knx(frame).unwrap().0
    }

    #[test]
    fn test_connect_transitions() {
        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        assert_eq!(core.state(), TunnelState::Disconnected);
        assert_eq!(core.channel_id(), None);

        let request = core.connect_request().unwrap();
        assert_eq!(parse(&request).service_type(), ServiceType::ConnectRequest);
        assert_eq!(core.state(), TunnelState::Connecting);
        assert!(core.connect_request().unwrap_err().as_connection().is_some());

        core.handle_connect_response(&ConnectResponse::accepted(
            5,
            Hpai::new(gateway()),
            IndividualAddress::from_raw(0x11FF),
        ))
        .unwrap();
        assert!(core.is_connected());
        assert_eq!(core.channel_id(), Some(5));
        assert_eq!(core.send_sequence(), 0);
        assert_eq!(core.recv_sequence(), 0);
        assert_eq!(core.individual_address(), Some(IndividualAddress::from_raw(0x11FF)));
    }

    #[test]
    fn test_data_target() {
        let core = connected(1);
        assert_eq!(core.data_target(), gateway());

        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        core.connect_request().unwrap();
        let data = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3672);
        core.handle_connect_response(&ConnectResponse::accepted(2, Hpai::new(data), IndividualAddress::from_raw(1)))
            .unwrap();
        assert_eq!(core.data_target(), data);

        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        core.connect_request().unwrap();
        core.handle_connect_response(&ConnectResponse::accepted(3, Hpai::route_back(), IndividualAddress::from_raw(1)))
            .unwrap();
        assert_eq!(core.data_target(), gateway());
    }

    #[test]
    fn test_connect_refused() {
        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        core.connect_request().unwrap();
        let err = core
            .handle_connect_response(&ConnectResponse::refused(ErrorCode::NoMoreConnections))
            .unwrap_err();
        assert_eq!(err.as_connection().and_then(|e| e.refused_status()), Some(0x24));
        assert_eq!(core.state(), TunnelState::Disconnected);
    }

    #[test]
    fn test_connect_response_without_request() {
        let mut core = TunnelCore::new(gateway(), Hpai::route_back());
        let response = ConnectResponse::accepted(1, Hpai::route_back(), IndividualAddress::from_raw(1));
        assert!(matches!(core.handle_connect_response(&response), Err(KnxError::InvalidState)));
    }

    #[test]
    fn test_send_sequence_advances_only_on_ack() {
        let mut core = connected(3);
        let first = core.tunnelling_request(&cemi()).unwrap();
        let retry = core.tunnelling_request(&cemi()).unwrap();
        assert_eq!(first, retry);
        assert_eq!(core.send_sequence(), 0);

        assert!(!core.confirm_ack(&TunnellingAck::new(3, 1, ErrorCode::NoError)));
        assert!(!core.confirm_ack(&TunnellingAck::new(4, 0, ErrorCode::NoError)));
        assert!(!core.confirm_ack(&TunnellingAck::new(3, 0, ErrorCode::Error)));
        assert_eq!(core.send_sequence(), 0);

        assert!(core.confirm_ack(&TunnellingAck::new(3, 0, ErrorCode::NoError)));
        assert_eq!(core.send_sequence(), 1);
        let KnxIpBody::TunnellingRequest(request) = parse(&core.tunnelling_request(&cemi()).unwrap()).body
        else {
            panic!("expected tunnelling request");
        };
        assert_eq!(request.sequence_counter(), 1);
    }

    #[test]
    fn test_send_sequence_wraps() {
        let mut core = connected(3);
        for seq in 0..=255u8 {
            assert!(core.confirm_ack(&TunnellingAck::new(3, seq, ErrorCode::NoError)));
        }
        assert_eq!(core.send_sequence(), 0);
    }

    #[test]
    fn test_send_requires_connection() {
        let core = TunnelCore::new(gateway(), Hpai::route_back());
        let err = core.tunnelling_request(&cemi()).unwrap_err();
        assert!(err.as_connection().is_some_and(|e| e.is_not_connected()));
        assert!(core.heartbeat_request().is_err());
    }

    #[test]
    fn test_inbound_request_ack_and_dedup() {
        let mut core = connected(3);
        let request = TunnellingRequest::from_cemi(3, 0, &cemi()).unwrap();

        let first = core.handle_tunnelling_request(&request).unwrap().unwrap();
        assert!(first.deliver);
        assert_eq!(&first.ack[6..], &[0x04, 0x03, 0x00, 0x00]);
        assert_eq!(core.recv_sequence(), 1);

        // Duplicate: acked again, not delivered
        let duplicate = core.handle_tunnelling_request(&request).unwrap().unwrap();
        assert!(!duplicate.deliver);
        assert_eq!(duplicate.ack, first.ack);
        assert_eq!(core.recv_sequence(), 1);

        let other_channel = TunnellingRequest::from_cemi(9, 1, &cemi()).unwrap();
        assert!(core.handle_tunnelling_request(&other_channel).unwrap().is_none());
    }

    #[test]
    fn test_inbound_request_with_undecodable_cemi_is_acked() {
        let mut core = connected(3);
        let request = TunnellingRequest::from_knx(&[0x04, 0x03, 0x00, 0x00, 0x30, 0x00]).unwrap();
        let inbound = core.handle_tunnelling_request(&request).unwrap().unwrap();
        assert!(inbound.deliver);
        assert_eq!(parse(&inbound.ack).service_type(), ServiceType::TunnellingAck);
    }

    #[test]
    fn test_heartbeat() {
        let core = connected(3);
        let frame = core.heartbeat_request().unwrap();
        assert_eq!(&frame[2..4], &[0x02, 0x07]);
        assert_eq!(frame[6], 3);

        let ok = ConnectionStateResponse::new(3, ErrorCode::NoError);
        assert!(core.is_matching_heartbeat(&ok));
        assert!(core.handle_heartbeat_response(&ok).is_ok());
        let lost = ConnectionStateResponse::new(3, ErrorCode::ConnectionId);
        assert!(core.handle_heartbeat_response(&lost).unwrap_err().as_connection().is_some_and(|e| e.is_lost()));
        assert!(!core.is_matching_heartbeat(&ConnectionStateResponse::new(4, ErrorCode::NoError)));
    }

    #[test]
    fn test_disconnect() {
        let mut core = connected(21);
        let frame = core.disconnect_request().unwrap();
        assert_eq!(&frame[..8], &[0x06, 0x10, 0x02, 0x09, 0x00, 0x10, 0x15, 0x00]);
        assert_eq!(core.state(), TunnelState::Disconnecting);

        assert!(!core.is_matching_disconnect(&DisconnectResponse::new(20, ErrorCode::NoError)));
        assert!(core.is_matching_disconnect(&DisconnectResponse::new(21, ErrorCode::NoError)));
        core.finish_disconnect();
        assert_eq!(core.state(), TunnelState::Disconnected);
        assert_eq!(core.channel_id(), None);

        // Can reconnect
        core.connect_request().unwrap();
    }

    #[test]
    fn test_reconnect_flow() {
        let mut core = connected(7);
        core.connection_lost(true);
        assert_eq!(core.state(), TunnelState::Reconnecting);
        assert!(core.tunnelling_request(&cemi()).is_err());

        let teardown = core.teardown_request().unwrap().unwrap();
        assert_eq!(teardown[6], 7);
        assert!(core.teardown_request().unwrap().is_none());

        core.connect_request().unwrap();
        core.abort_connect();
        assert_eq!(core.state(), TunnelState::Reconnecting);

        core.connect_request().unwrap();
        core.handle_connect_response(&ConnectResponse::accepted(
            8,
            Hpai::new(gateway()),
            IndividualAddress::from_raw(0x11FE),
        ))
        .unwrap();
        assert_eq!(core.channel_id(), Some(8));
    }

    #[test]
    fn test_gateway_disconnect_request() {
        let mut core = connected(21);
        let other = DisconnectRequest::new(22, Hpai::new(gateway()));
        assert!(core.handle_disconnect_request(&other, true).unwrap().is_none());

        let request = DisconnectRequest::new(21, Hpai::new(gateway()));
        let response = core.handle_disconnect_request(&request, true).unwrap().unwrap();
        assert_eq!(&response[..], &[0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 0x15, 0x00]);
        assert_eq!(core.state(), TunnelState::Reconnecting);
        assert_eq!(core.channel_id(), None);

        let mut core = connected(21);
        core.handle_disconnect_request(&request, false).unwrap();
        assert_eq!(core.state(), TunnelState::Disconnected);
    }
}
