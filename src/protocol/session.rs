//! Async KNXnet/IP tunnelling session.
//!
//! [`TunnellingSession`] drives a [`TunnelCore`] over an [`AsyncTransport`].
//! Three loops run side by side on one session:
//!
//! - [`TunnellingSession::pump`] receives frames and routes them: responses
//!   and acks wake the operation waiting for them, gateway telegrams are
//!   acknowledged and queued as [`SessionEvent`]s.
//! - [`TunnellingSession::run_keepalive`] sends heartbeats and reconnects
//!   after a connection loss.
//! - The caller sends telegrams and reads events.
//!
//! The core sits behind a blocking mutex that is never held across an
//! await. Telegram sends are serialized by an async lock so at most one
//! request waits for its ack.
//!
//! ## Example
//!
//! ```rust,no_run
//! use embassy_futures::join::join3;
//! use knx_tunnel::config::ConnectionConfig;
//! use knx_tunnel::net::udp::UdpTransport;
//! use knx_tunnel::protocol::session::{SessionEvent, TunnellingSession};
//! use knx_tunnel::telegram::{Apci, Telegram};
//! use knx_tunnel::dpt::Payload;
//! use knx_tunnel::ga;
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let config = ConnectionConfig::parse("GATEWAY_IP=192.168.1.10")?;
//! let transport = UdpTransport::bind_for_gateway(config.local_port, config.gateway_endpoint()?).await?;
//! let session = TunnellingSession::new(config, transport)?;
//!
//! let app = async {
//!     session.connect().await?;
//!     session
//!         .send_telegram(&Telegram::new(ga!(1/2/3), Apci::GroupValueWrite(Payload::binary(1)?)))
//!         .await?;
//!     while let SessionEvent::Telegram(telegram) = session.next_event().await {
//!         println!("{telegram}");
//!     }
//!     session.disconnect().await?;
//!     session.close();
//!     Ok::<(), knx_tunnel::KnxError>(())
//! };
//! let (pumped, (), done) = join3(session.pump(), session.run_keepalive(), app).await;
//! pumped?;
//! done
//! # }
//! ```

use core::cell::RefCell;
use core::fmt;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use tokio::time::{sleep, timeout, timeout_at, Instant};

use crate::addressing::IndividualAddress;
use crate::config::ConnectionConfig;
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, IpEndpoint};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{CemiMessageCode, MAX_FRAME_SIZE};
use crate::protocol::frame::{KnxIpBody, KnxIpFrame};
use crate::protocol::services::{
    ConnectionStateResponse, DisconnectRequest, DisconnectResponse, TunnellingRequest,
};
use crate::protocol::tunnel::{TunnelCore, TunnelState};
use crate::telegram::Telegram;

type RawMutex = CriticalSectionRawMutex;

/// Capacity of the event queue. Events beyond it are dropped with a warning.
pub const EVENT_QUEUE_SIZE: usize = 16;

/// Something the gateway told us.
#[derive(Debug)]
pub enum SessionEvent {
    /// A telegram from the bus.
    Telegram(Telegram),
    /// An acknowledged tunnelling request whose CEMI frame could not be decoded.
    Undecodable(KnxError),
    /// The connection was lost. Reconnection follows when enabled.
    ConnectionLost,
}

/// Tunnelling connection to one gateway.
pub struct TunnellingSession<T: AsyncTransport> {
    transport: T,
    config: ConnectionConfig,
    gateway: IpEndpoint,
    core: BlockingMutex<RawMutex, RefCell<TunnelCore>>,
    send_lock: Mutex<RawMutex, ()>,
    connect_response: Signal<RawMutex, Result<()>>,
    tunnelling_ack: Signal<RawMutex, u8>,
    connection_state: Signal<RawMutex, ConnectionStateResponse>,
    disconnect_response: Signal<RawMutex, DisconnectResponse>,
    events: Channel<RawMutex, SessionEvent, EVENT_QUEUE_SIZE>,
    wake_keepalive: Signal<RawMutex, ()>,
    stop_pump: Signal<RawMutex, ()>,
    stop_keepalive: Signal<RawMutex, ()>,
}

impl<T: AsyncTransport> fmt::Debug for TunnellingSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnellingSession")
            .field("gateway", &self.gateway)
            .field("state", &self.state())
            .field("channel_id", &self.channel_id())
            .finish_non_exhaustive()
    }
}

impl<T: AsyncTransport> TunnellingSession<T> {
    /// Session for the gateway named in `config`, not yet connected.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the config has no gateway (routing mode or a
    /// missing `gateway_ip`).
    pub fn new(config: ConnectionConfig, transport: T) -> Result<Self> {
        let gateway = config.gateway_endpoint()?;
        let local = config.local_hpai(transport.local_endpoint());
        Ok(Self {
            transport,
            config,
            gateway,
            core: BlockingMutex::new(RefCell::new(TunnelCore::new(gateway, local))),
            send_lock: Mutex::new(()),
            connect_response: Signal::new(),
            tunnelling_ack: Signal::new(),
            connection_state: Signal::new(),
            disconnect_response: Signal::new(),
            events: Channel::new(),
            wake_keepalive: Signal::new(),
            stop_pump: Signal::new(),
            stop_keepalive: Signal::new(),
        })
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut TunnelCore) -> R) -> R {
        self.core.lock(|core| f(&mut core.borrow_mut()))
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> TunnelState {
        self.with_core(|core| core.state())
    }

    pub fn channel_id(&self) -> Option<u8> {
        self.with_core(|core| core.channel_id())
    }

    pub fn send_sequence(&self) -> u8 {
        self.with_core(|core| core.send_sequence())
    }

    /// Address the gateway assigned to this tunnel.
    pub fn individual_address(&self) -> Option<IndividualAddress> {
        self.with_core(|core| core.individual_address())
    }

    async fn send_frame(&self, frame: &[u8], target: IpEndpoint) -> Result<()> {
        crate::knx_log!(trace, "Sending {} bytes to port {}", frame.len(), target.port);
        self.transport.send_to(frame, target).await
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Open a tunnel: send `CONNECT_REQUEST` and wait `connect_timeout` for
    /// the response.
    ///
    /// A failed attempt is reported and not retried here.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected`, `ConnectionRefused` with the gateway's status,
    /// `ConnectionTimeout`, or the transport error.
    pub async fn connect(&self) -> Result<()> {
        let frame = self.with_core(TunnelCore::connect_request)?;
        self.connect_response.reset();
        crate::knx_log!(info, "Connecting to gateway port {}", self.gateway.port);

        if let Err(err) = self.send_frame(&frame, self.gateway).await {
            self.with_core(TunnelCore::abort_connect);
            return Err(err);
        }
        match timeout(self.config.connect_timeout, self.connect_response.wait()).await {
            Ok(outcome) => outcome,
            Err(_) if self.state() == TunnelState::Connected => Ok(()),
            Err(_) => {
                crate::knx_log!(warn, "No connect response from gateway");
                self.with_core(TunnelCore::abort_connect);
                Err(KnxError::connection_timeout())
            }
        }
    }

    // =========================================================================
    // Telegrams
    // =========================================================================

    /// Send `telegram` and wait for its tunnelling ack.
    ///
    /// Each attempt waits `ack_timeout`. Unanswered requests are repeated
    /// with the same sequence number up to `send_retries` times. When every
    /// attempt fails the connection counts as lost.
    ///
    /// Cancelling the returned future never advances the sequence number.
    ///
    /// # Errors
    ///
    /// `NotConnected` without an open tunnel, `RetriesExhausted` when no ack
    /// arrived, or the transport error.
    pub async fn send_telegram(&self, telegram: &Telegram) -> Result<()> {
        let cemi = CemiFrame::from_telegram(telegram, CemiMessageCode::LDataReq);
        let _flight = self.send_lock.lock().await;

        let (frame, sequence, target) = self.with_core(|core| {
            core.tunnelling_request(&cemi)
                .map(|frame| (frame, core.send_sequence(), core.data_target()))
        })?;
        self.tunnelling_ack.reset();

        for attempt in 1..=self.config.send_attempts() {
            match self.with_core(|core| (core.state(), core.send_sequence())) {
                (TunnelState::Connected, current) if current != sequence => return Ok(()),
                (TunnelState::Connected, _) => {}
                _ => return Err(KnxError::not_connected()),
            }
            if attempt > 1 {
                crate::knx_log!(warn, "Repeating tunnelling request {} (attempt {})", sequence, attempt);
            }
            self.send_frame(&frame, target).await?;
            if self.wait_for_ack(sequence).await {
                crate::knx_log!(debug, "Tunnelling request {} acknowledged", sequence);
                return Ok(());
            }
        }

        crate::knx_log!(warn, "No ack for tunnelling request {}", sequence);
        self.lose_connection().await;
        Err(KnxError::retries_exhausted())
    }

    async fn wait_for_ack(&self, sequence: u8) -> bool {
        let deadline = Instant::now() + self.config.ack_timeout;
        loop {
            match timeout_at(deadline, self.tunnelling_ack.wait()).await {
                Ok(acked) if acked == sequence => return true,
                Ok(stale) => crate::knx_log!(debug, "Ignoring stale ack {}", stale),
                Err(_) => return false,
            }
        }
    }

    /// Next event from the gateway.
    pub async fn next_event(&self) -> SessionEvent {
        self.events.receive().await
    }

    /// Next event if one is queued.
    pub fn try_next_event(&self) -> Option<SessionEvent> {
        self.events.try_receive().ok()
    }

    fn push_event(&self, event: SessionEvent) {
        if self.events.try_send(event).is_err() {
            crate::knx_log!(warn, "Event queue full, dropping event");
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Route one received frame.
    ///
    /// # Errors
    ///
    /// Parse errors for the frame, or the transport error when an ack or
    /// disconnect response could not be sent. Session state is unchanged
    /// by a frame that fails to parse.
    pub async fn handle_inbound(&self, data: &[u8]) -> Result<()> {
        let (frame, _) = KnxIpFrame::from_knx(data)?;
        match frame.body {
            KnxIpBody::ConnectResponse(response) => {
                // Requests queued right behind the response need the open channel.
                if self.state() == TunnelState::Connecting {
                    let outcome = self.with_core(|core| core.handle_connect_response(&response));
                    self.connect_response.signal(outcome);
                } else {
                    crate::knx_log!(debug, "Unexpected connect response");
                }
            }
            KnxIpBody::TunnellingAck(ack) => {
                if self.with_core(|core| core.confirm_ack(&ack)) {
                    self.tunnelling_ack.signal(ack.sequence_counter());
                } else {
                    crate::knx_log!(
                        debug,
                        "Ignoring ack {} on channel {}",
                        ack.sequence_counter(),
                        ack.communication_channel_id()
                    );
                }
            }
            KnxIpBody::TunnellingRequest(request) => self.handle_tunnelling_request(&request).await?,
            KnxIpBody::ConnectionStateResponse(response) => {
                if self.with_core(|core| core.is_matching_heartbeat(&response)) {
                    self.connection_state.signal(response);
                }
            }
            KnxIpBody::DisconnectResponse(response) => {
                if self.with_core(|core| core.is_matching_disconnect(&response)) {
                    self.disconnect_response.signal(response);
                }
            }
            KnxIpBody::DisconnectRequest(request) => self.handle_disconnect_request(&request).await?,
            body => crate::knx_log!(
                debug,
                "Ignoring service 0x{:04X}",
                body.service_type().to_u16()
            ),
        }
        Ok(())
    }

    async fn handle_tunnelling_request(&self, request: &TunnellingRequest) -> Result<()> {
        let Some((inbound, target)) = self.with_core(|core| {
            core.handle_tunnelling_request(request)
                .map(|inbound| inbound.map(|inbound| (inbound, core.data_target())))
        })?
        else {
            return Ok(());
        };
        self.send_frame(&inbound.ack, target).await?;
        if !inbound.deliver {
            return Ok(());
        }

        match request.cemi().and_then(|cemi| Ok((cemi.code, cemi.telegram()?))) {
            Ok((CemiMessageCode::LDataCon, _)) => {
                crate::knx_log!(trace, "Confirmation for request {}", request.sequence_counter());
            }
            Ok((_, telegram)) => self.push_event(SessionEvent::Telegram(telegram)),
            Err(err) => {
                crate::knx_log!(warn, "Undecodable CEMI in tunnelling request {}", request.sequence_counter());
                self.push_event(SessionEvent::Undecodable(err));
            }
        }
        Ok(())
    }

    async fn handle_disconnect_request(&self, request: &DisconnectRequest) -> Result<()> {
        let response = self.with_core(|core| core.handle_disconnect_request(request, self.config.auto_reconnect))?;
        if let Some(response) = response {
            self.send_frame(&response, self.gateway).await?;
            self.push_event(SessionEvent::ConnectionLost);
            self.wake_keepalive.signal(());
        }
        Ok(())
    }

    /// Receive and route frames until [`Self::close`] is called.
    ///
    /// Frames that fail to parse are logged and dropped.
    ///
    /// # Errors
    ///
    /// The transport error that ended the loop.
    pub async fn pump(&self) -> Result<()> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        loop {
            match select(self.transport.recv_from(&mut buf), self.stop_pump.wait()).await {
                Either::First(Ok((n, from))) => {
                    crate::knx_log!(trace, "Received {} bytes from port {}", n, from.port);
                    if let Err(err) = self.handle_inbound(&buf[..n]).await {
                        crate::knx_log!(warn, "Dropping inbound frame of {} bytes: {}", n, err);
                    }
                }
                Either::First(Err(err)) => {
                    crate::knx_log!(error, "Receive loop failed: {}", err);
                    return Err(err);
                }
                Either::Second(()) => return Ok(()),
            }
        }
    }

    // =========================================================================
    // Heartbeat and reconnect
    // =========================================================================

    /// Send one `CONNECTIONSTATE_REQUEST` and wait `heartbeat_timeout` for
    /// the response.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `ConnectionTimeout` without a response, or
    /// `ConnectionLost` when the gateway reports an error.
    pub async fn heartbeat(&self) -> Result<()> {
        let frame = self.with_core(|core| core.heartbeat_request())?;
        self.connection_state.reset();
        self.send_frame(&frame, self.gateway).await?;
        let Ok(response) = timeout(self.config.heartbeat_timeout, self.connection_state.wait()).await else {
            return Err(KnxError::connection_timeout());
        };
        self.with_core(|core| core.handle_heartbeat_response(&response))
    }

    /// Heartbeat, repeated up to `heartbeat_retries` times while unanswered.
    async fn check_connection(&self) -> Result<()> {
        let mut missed = 0;
        loop {
            match self.heartbeat().await {
                Err(err) if err.as_connection().is_some_and(|e| e.is_timeout()) => {
                    missed += 1;
                    crate::knx_log!(warn, "Missed heartbeat {} of {}", missed, self.config.heartbeat_retries);
                    if missed > self.config.heartbeat_retries {
                        return Err(err);
                    }
                }
                result => return result,
            }
        }
    }

    async fn lose_connection(&self) {
        let auto_reconnect = self.config.auto_reconnect;
        self.with_core(|core| core.connection_lost(auto_reconnect));
        self.push_event(SessionEvent::ConnectionLost);
        if auto_reconnect {
            self.wake_keepalive.signal(());
        } else {
            self.teardown().await;
        }
    }

    /// Best-effort `DISCONNECT_REQUEST` for a lost channel.
    async fn teardown(&self) {
        match self.with_core(TunnelCore::teardown_request) {
            Ok(Some(frame)) => {
                if self.send_frame(&frame, self.gateway).await.is_err() {
                    crate::knx_log!(debug, "Teardown request not sent");
                }
            }
            Ok(None) => {}
            Err(err) => crate::knx_log!(debug, "No teardown: {}", err),
        }
    }

    /// Re-establish the tunnel.
    ///
    /// Each attempt tears down the old channel, waits `auto_reconnect_wait`
    /// and connects again. Attempts repeat until one succeeds or
    /// `max_reconnect_attempts` is reached, after which the session is
    /// disconnected.
    ///
    /// # Errors
    ///
    /// The error of the last failed attempt.
    pub async fn reconnect(&self) -> Result<()> {
        if self.state() == TunnelState::Connected {
            self.with_core(|core| core.connection_lost(true));
        }
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.teardown().await;
            sleep(self.config.auto_reconnect_wait).await;
            crate::knx_log!(info, "Reconnect attempt {}", attempt);
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    crate::knx_log!(warn, "Reconnect attempt {} failed: {}", attempt, err);
                    if self.config.max_reconnect_attempts.is_some_and(|max| attempt >= max) {
                        crate::knx_log!(error, "Giving up after {} reconnect attempts", attempt);
                        self.with_core(TunnelCore::finish_disconnect);
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Send heartbeats every `heartbeat_interval` and reconnect after a
    /// loss when `auto_reconnect` is set. Runs until [`Self::close`].
    pub async fn run_keepalive(&self) {
        loop {
            if let Either::Second(()) = select(self.keepalive_step(), self.stop_keepalive.wait()).await {
                crate::knx_log!(debug, "Keepalive stopped");
                return;
            }
        }
    }

    async fn keepalive_step(&self) {
        if self.state() == TunnelState::Reconnecting && self.config.auto_reconnect {
            if self.reconnect().await.is_err() {
                crate::knx_log!(error, "Reconnect failed, tunnel closed");
            }
            return;
        }
        self.wake_keepalive.reset();
        if let Either::Second(()) = select(sleep(self.config.heartbeat_interval), self.wake_keepalive.wait()).await {
            return;
        }
        if self.state() != TunnelState::Connected {
            return;
        }
        if let Err(err) = self.check_connection().await {
            crate::knx_log!(warn, "Heartbeat failed: {}", err);
            if self.state() == TunnelState::Connected {
                self.lose_connection().await;
            }
        }
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Close the tunnel: send `DISCONNECT_REQUEST` and wait up to
    /// `connect_timeout` for the response. The session ends up disconnected
    /// whether or not the gateway answers.
    ///
    /// # Errors
    ///
    /// `NotConnected` when no tunnel is open.
    pub async fn disconnect(&self) -> Result<()> {
        let frame = match self.with_core(TunnelCore::disconnect_request) {
            Ok(frame) => frame,
            Err(_) if self.state() == TunnelState::Reconnecting => {
                self.with_core(TunnelCore::finish_disconnect);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.disconnect_response.reset();
        if self.send_frame(&frame, self.gateway).await.is_err() {
            crate::knx_log!(warn, "Disconnect request not sent");
        } else if timeout(self.config.connect_timeout, self.disconnect_response.wait())
            .await
            .is_err()
        {
            crate::knx_log!(warn, "No disconnect response from gateway");
        }
        self.with_core(TunnelCore::finish_disconnect);
        Ok(())
    }

    /// Stop [`Self::pump`] and [`Self::run_keepalive`] and close the transport.
    pub fn close(&self) {
        self.stop_pump.signal(());
        self.stop_keepalive.signal(());
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::addressing::GroupAddress;
    use crate::dpt::Payload;
    use crate::net::mock_transport::MockTransport;
    use crate::protocol::constants::{ErrorCode, ServiceType};
    use crate::protocol::frame::Hpai;
    use crate::protocol::services::{ConnectResponse, TunnellingAck};
    use crate::telegram::Apci;

    const CHANNEL: u8 = 7;

    fn config() -> ConnectionConfig {
        ConnectionConfig::tunneling(MockTransport::DEFAULT_GATEWAY.addr)
    }

    fn session_with(config: ConnectionConfig) -> TunnellingSession<MockTransport> {
        TunnellingSession::new(config, MockTransport::new()).unwrap()
    }

    fn frame(body: impl Into<KnxIpBody>) -> Vec<u8> {
        KnxIpFrame::new(body).to_bytes().unwrap().to_vec()
    }

    fn parse(data: &[u8]) -> KnxIpBody {
        KnxIpFrame::from_knx(data).unwrap().0.body
    }

    fn accepted(channel: u8) -> Vec<u8> {
        frame(ConnectResponse::accepted(
            channel,
            Hpai::new(MockTransport::DEFAULT_GATEWAY),
            IndividualAddress::from_raw(0x11FF),
        ))
    }

    fn telegram() -> Telegram {
        Telegram::new(GroupAddress::from_raw(0x0A03), Apci::GroupValueWrite(Payload::binary(1).unwrap()))
    }

    fn inbound_request(sequence: u8) -> Vec<u8> {
        let telegram = telegram().with_source(IndividualAddress::from_raw(0x1101));
        let cemi = CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataInd);
        frame(TunnellingRequest::from_cemi(CHANNEL, sequence, &cemi).unwrap())
    }

    async fn connect(session: &TunnellingSession<MockTransport>) {
        let gateway = async {
            let request = session.transport().next_sent().await.unwrap();
            assert_eq!(parse(&request).service_type(), ServiceType::ConnectRequest);
            session.handle_inbound(&accepted(CHANNEL)).await.unwrap();
        };
        let (result, ()) = tokio::join!(session.connect(), gateway);
        result.unwrap();
    }

    async fn connected_with(config: ConnectionConfig) -> TunnellingSession<MockTransport> {
        let session = session_with(config);
        connect(&session).await;
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_right_after_connect_response() {
        let session = session_with(config());
        let gateway = async {
            session.transport().next_sent().await.unwrap();
            session.handle_inbound(&accepted(CHANNEL)).await.unwrap();
            session.handle_inbound(&inbound_request(0)).await.unwrap();
        };
        let (result, ()) = tokio::join!(session.connect(), gateway);
        result.unwrap();

        let sent = session.transport().sent_frames();
        assert_eq!(sent.len(), 2);
        let KnxIpBody::TunnellingAck(ack) = parse(&sent[1]) else {
            panic!("expected tunnelling ack");
        };
        assert_eq!(ack.communication_channel_id(), CHANNEL);
        assert_eq!(ack.sequence_counter(), 0);
        assert!(matches!(session.try_next_event(), Some(SessionEvent::Telegram(_))));
    }

    #[test]
    fn test_new_requires_gateway() {
        let err = TunnellingSession::new(ConnectionConfig::routing(), MockTransport::new()).unwrap_err();
        assert!(matches!(err, KnxError::InvalidState));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect() {
        let session = connected_with(config()).await;
        assert_eq!(session.state(), TunnelState::Connected);
        assert_eq!(session.channel_id(), Some(CHANNEL));
        assert_eq!(session.individual_address(), Some(IndividualAddress::from_raw(0x11FF)));
        let KnxIpBody::ConnectRequest(request) = parse(&session.transport().sent_frames()[0]) else {
            panic!("expected connect request");
        };
        assert_eq!(request.control_endpoint, Hpai::new(MockTransport::DEFAULT_LOCAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_route_back() {
        let config = ConnectionConfig {
            route_back: true,
            ..config()
        };
        let session = connected_with(config).await;
        let KnxIpBody::ConnectRequest(request) = parse(&session.transport().sent_frames()[0]) else {
            panic!("expected connect request");
        };
        assert!(request.control_endpoint.is_route_back());
        assert!(request.data_endpoint.is_route_back());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refused() {
        let session = session_with(config());
        let gateway = async {
            session.transport().next_sent().await.unwrap();
            let refused = frame(ConnectResponse::refused(ErrorCode::NoMoreConnections));
            session.handle_inbound(&refused).await.unwrap();
        };
        let (result, ()) = tokio::join!(session.connect(), gateway);
        let err = result.unwrap_err();
        assert_eq!(err.as_connection().and_then(|e| e.refused_status()), Some(0x24));
        assert_eq!(session.state(), TunnelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let session = session_with(config());
        let err = session.connect().await.unwrap_err();
        assert!(err.as_connection().is_some_and(|e| e.is_timeout()));
        assert_eq!(session.state(), TunnelState::Disconnected);
        assert_eq!(session.transport().sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegram_acked() {
        let session = connected_with(config()).await;
        let gateway = async {
            for sequence in 0..2 {
                let sent = session.transport().next_sent().await.unwrap();
                let KnxIpBody::TunnellingRequest(request) = parse(&sent) else {
                    panic!("expected tunnelling request");
                };
                assert_eq!(request.communication_channel_id(), CHANNEL);
                assert_eq!(request.sequence_counter(), sequence);
                assert_eq!(request.cemi().unwrap().code, CemiMessageCode::LDataReq);
                let ack = frame(TunnellingAck::new(CHANNEL, sequence, ErrorCode::NoError));
                session.handle_inbound(&ack).await.unwrap();
            }
        };
        let sends = async {
            session.send_telegram(&telegram()).await?;
            session.send_telegram(&telegram()).await
        };
        let (result, ()) = tokio::join!(sends, gateway);
        result.unwrap();
        assert_eq!(session.send_sequence(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegram_retry_same_sequence() {
        let session = connected_with(config()).await;
        let gateway = async {
            let first = session.transport().next_sent().await.unwrap();
            let second = session.transport().next_sent().await.unwrap();
            assert_eq!(first, second);
            let ack = frame(TunnellingAck::new(CHANNEL, 0, ErrorCode::NoError));
            session.handle_inbound(&ack).await.unwrap();
        };
        let write = telegram();
        let (result, ()) = tokio::join!(session.send_telegram(&write), gateway);
        result.unwrap();
        assert_eq!(session.send_sequence(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegram_retries_exhausted() {
        let session = connected_with(ConnectionConfig {
            send_retries: 2,
            ..config()
        })
        .await;
        let gateway = async {
            // Acks for the wrong sequence or with an error status do not count
            session.transport().next_sent().await.unwrap();
            let wrong = frame(TunnellingAck::new(CHANNEL, 5, ErrorCode::NoError));
            session.handle_inbound(&wrong).await.unwrap();
            session.transport().next_sent().await.unwrap();
            let failed = frame(TunnellingAck::new(CHANNEL, 0, ErrorCode::Error));
            session.handle_inbound(&failed).await.unwrap();
        };
        let write = telegram();
        let (result, ()) = tokio::join!(session.send_telegram(&write), gateway);
        let err = result.unwrap_err();
        assert!(err.as_tunnelling().is_some_and(|e| e.is_retries_exhausted()));
        assert_eq!(session.send_sequence(), 0);
        assert_eq!(session.state(), TunnelState::Reconnecting);
        // connect request plus three attempts
        assert_eq!(session.transport().sent_count(), 4);
        assert!(matches!(session.try_next_event(), Some(SessionEvent::ConnectionLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegram_cancelled_keeps_sequence() {
        let session = connected_with(config()).await;
        let cancelled = timeout(Duration::from_millis(100), session.send_telegram(&telegram())).await;
        assert!(cancelled.is_err());
        assert_eq!(session.send_sequence(), 0);
        assert_eq!(session.state(), TunnelState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegrams_single_flight() {
        let session = connected_with(config()).await;
        let gateway = async {
            for sequence in 0..2 {
                let sent = session.transport().next_sent().await.unwrap();
                let KnxIpBody::TunnellingRequest(request) = parse(&sent) else {
                    panic!("expected tunnelling request");
                };
                assert_eq!(request.sequence_counter(), sequence);
                // Nothing else goes out while the ack is pending
                assert_eq!(session.transport().sent_count(), 2 + usize::from(sequence));
                let ack = frame(TunnellingAck::new(CHANNEL, sequence, ErrorCode::NoError));
                session.handle_inbound(&ack).await.unwrap();
            }
        };
        let (first_write, second_write) = (telegram(), telegram());
        let (first, second, ()) = tokio::join!(
            session.send_telegram(&first_write),
            session.send_telegram(&second_write),
            gateway
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(session.send_sequence(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_not_connected() {
        let session = session_with(config());
        let err = session.send_telegram(&telegram()).await.unwrap_err();
        assert!(err.as_connection().is_some_and(|e| e.is_not_connected()));
        assert_eq!(session.transport().sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_request_acked_and_delivered() {
        let session = connected_with(config()).await;
        session.handle_inbound(&inbound_request(0)).await.unwrap();

        let KnxIpBody::TunnellingAck(ack) = parse(&session.transport().next_sent().await.unwrap()) else {
            panic!("expected tunnelling ack");
        };
        assert_eq!(ack.communication_channel_id(), CHANNEL);
        assert_eq!(ack.sequence_counter(), 0);

        let SessionEvent::Telegram(received) = session.next_event().await else {
            panic!("expected telegram");
        };
        assert_eq!(received.destination, telegram().destination);
        assert_eq!(received.payload, telegram().payload);
        assert_eq!(received.source, IndividualAddress::from_raw(0x1101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_duplicate_acked_not_delivered() {
        let session = connected_with(config()).await;
        session.handle_inbound(&inbound_request(0)).await.unwrap();
        session.handle_inbound(&inbound_request(0)).await.unwrap();
        session.handle_inbound(&inbound_request(5)).await.unwrap();

        // connect request plus three acks
        assert_eq!(session.transport().sent_count(), 4);
        assert!(matches!(session.try_next_event(), Some(SessionEvent::Telegram(_))));
        assert!(session.try_next_event().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_undecodable_cemi_acked() {
        let session = connected_with(config()).await;
        // Tunnelling request with an unknown CEMI message code
        let raw = [0x06, 0x10, 0x04, 0x20, 0x00, 0x0C, 0x04, CHANNEL, 0x00, 0x00, 0x99, 0x00];
        session.handle_inbound(&raw).await.unwrap();

        let KnxIpBody::TunnellingAck(ack) = parse(&session.transport().next_sent().await.unwrap()) else {
            panic!("expected tunnelling ack");
        };
        assert_eq!(ack.sequence_counter(), 0);
        let SessionEvent::Undecodable(err) = session.next_event().await else {
            panic!("expected undecodable event");
        };
        assert!(err.is_unhandleable_message());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_other_channel_ignored() {
        let session = connected_with(config()).await;
        let telegram = telegram();
        let cemi = CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataInd);
        let request = frame(TunnellingRequest::from_cemi(CHANNEL + 1, 0, &cemi).unwrap());
        session.handle_inbound(&request).await.unwrap();
        assert_eq!(session.transport().sent_count(), 1);
        assert!(session.try_next_event().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_inbound_leaves_state() {
        let session = connected_with(config()).await;
        assert!(session.handle_inbound(&[0x06, 0x10, 0x04]).await.is_err());
        assert!(session.handle_inbound(&[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, CHANNEL, 0x00]).await.is_err());
        assert_eq!(session.state(), TunnelState::Connected);
        assert_eq!(session.send_sequence(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat() {
        let session = connected_with(config()).await;
        let gateway = async {
            let sent = session.transport().next_sent().await.unwrap();
            assert_eq!(parse(&sent).service_type(), ServiceType::ConnectionStateRequest);
            let response = frame(ConnectionStateResponse::new(CHANNEL, ErrorCode::NoError));
            session.handle_inbound(&response).await.unwrap();
        };
        let (result, ()) = tokio::join!(session.heartbeat(), gateway);
        result.unwrap();

        let err = session.heartbeat().await.unwrap_err();
        assert!(err.as_connection().is_some_and(|e| e.is_timeout()));
        assert_eq!(session.state(), TunnelState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_error_status() {
        let session = connected_with(config()).await;
        let gateway = async {
            session.transport().next_sent().await.unwrap();
            let response = frame(ConnectionStateResponse::new(CHANNEL, ErrorCode::ConnectionId));
            session.handle_inbound(&response).await.unwrap();
        };
        let (result, ()) = tokio::join!(session.heartbeat(), gateway);
        assert!(result.unwrap_err().as_connection().is_some_and(|e| e.is_lost()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_detects_loss() {
        let session = connected_with(ConnectionConfig {
            auto_reconnect: false,
            heartbeat_retries: 1,
            ..config()
        })
        .await;
        let watcher = async {
            assert!(matches!(session.next_event().await, SessionEvent::ConnectionLost));
            session.close();
        };
        tokio::join!(session.run_keepalive(), watcher);

        assert_eq!(session.state(), TunnelState::Disconnected);
        let sent = session.transport().sent_frames();
        let services: Vec<_> = sent.iter().map(|frame| parse(frame).service_type()).collect();
        assert_eq!(
            services,
            vec![
                ServiceType::ConnectRequest,
                ServiceType::ConnectionStateRequest,
                ServiceType::ConnectionStateRequest,
                ServiceType::DisconnectRequest,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_reconnects() {
        let session = connected_with(ConnectionConfig {
            heartbeat_retries: 0,
            ..config()
        })
        .await;
        let gateway = async {
            let heartbeat = session.transport().next_sent().await.unwrap();
            assert_eq!(parse(&heartbeat).service_type(), ServiceType::ConnectionStateRequest);
            let teardown = session.transport().next_sent().await.unwrap();
            let KnxIpBody::DisconnectRequest(teardown) = parse(&teardown) else {
                panic!("expected disconnect request");
            };
            assert_eq!(teardown.communication_channel_id, CHANNEL);
            let request = session.transport().next_sent().await.unwrap();
            assert_eq!(parse(&request).service_type(), ServiceType::ConnectRequest);
            session.handle_inbound(&accepted(CHANNEL + 1)).await.unwrap();
            while session.state() != TunnelState::Connected {
                tokio::task::yield_now().await;
            }
            session.close();
        };
        tokio::join!(session.run_keepalive(), gateway);
        assert_eq!(session.channel_id(), Some(CHANNEL + 1));
        assert_eq!(session.send_sequence(), 0);
        assert!(matches!(session.try_next_event(), Some(SessionEvent::ConnectionLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up() {
        let session = connected_with(ConnectionConfig {
            max_reconnect_attempts: Some(2),
            ..config()
        })
        .await;
        let start = Instant::now();
        let err = session.reconnect().await.unwrap_err();
        assert!(err.as_connection().is_some_and(|e| e.is_timeout()));
        assert_eq!(session.state(), TunnelState::Disconnected);
        // Two backoffs and two connect timeouts
        assert!(start.elapsed() >= Duration::from_secs(2 * 3 + 2 * 10));

        let services: Vec<_> =
            session.transport().sent_frames().iter().map(|frame| parse(frame).service_type()).collect();
        assert_eq!(
            services,
            vec![
                ServiceType::ConnectRequest,
                ServiceType::DisconnectRequest,
                ServiceType::ConnectRequest,
                ServiceType::ConnectRequest,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_disconnect_request() {
        let session = connected_with(config()).await;
        let request = frame(DisconnectRequest::new(CHANNEL, Hpai::new(MockTransport::DEFAULT_GATEWAY)));
        session.handle_inbound(&request).await.unwrap();

        let KnxIpBody::DisconnectResponse(response) = parse(&session.transport().next_sent().await.unwrap())
        else {
            panic!("expected disconnect response");
        };
        assert_eq!(response.communication_channel_id, CHANNEL);
        assert_eq!(session.state(), TunnelState::Reconnecting);
        assert_eq!(session.channel_id(), None);
        assert!(matches!(session.try_next_event(), Some(SessionEvent::ConnectionLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect() {
        let session = connected_with(config()).await;
        let gateway = async {
            let sent = session.transport().next_sent().await.unwrap();
            let KnxIpBody::DisconnectRequest(request) = parse(&sent) else {
                panic!("expected disconnect request");
            };
            assert_eq!(request.communication_channel_id, CHANNEL);
            let response = frame(DisconnectResponse::new(CHANNEL, ErrorCode::NoError));
            session.handle_inbound(&response).await.unwrap();
        };
        let start = Instant::now();
        let (result, ()) = tokio::join!(session.disconnect(), gateway);
        result.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(session.state(), TunnelState::Disconnected);
        assert_eq!(session.channel_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_response() {
        let session = connected_with(config()).await;
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), TunnelState::Disconnected);
        assert!(session.disconnect().await.unwrap_err().as_connection().is_some_and(|e| e.is_not_connected()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_routes_frames() {
        let session = session_with(config());
        let gateway = async {
            session.transport().next_sent().await.unwrap();
            session.transport().push_inbound(&[0x06, 0x10, 0xFF, 0xFF, 0x00, 0x06]);
            session.transport().push_inbound(&accepted(CHANNEL));
            session.transport().push_inbound(&inbound_request(0));
        };
        let app = async {
            let (connected, ()) = tokio::join!(session.connect(), gateway);
            connected.unwrap();
            assert!(matches!(session.next_event().await, SessionEvent::Telegram(_)));
            session.close();
        };
        let (pumped, ()) = tokio::join!(session.pump(), app);
        pumped.unwrap();
        assert!(session.transport().is_closed());
    }
}
