//! Connection configuration.
//!
//! A [`ConnectionConfig`] can be built in code or read from `KEY=VALUE`
//! text, e.g. an embedded `include_str!` file:
//!
//! ```rust
//! use knx_tunnel::config::{ConnectionConfig, ConnectionType};
//!
//! let config = ConnectionConfig::parse(
//!     r"
//!     ## KNX/IP interface on the installation network
//!     CONNECTION_TYPE=TUNNELING
//!     GATEWAY_IP=192.168.1.10
//!     ROUTE_BACK=true
//!     ",
//! )?;
//! assert_eq!(config.connection_type, ConnectionType::Tunneling);
//! assert_eq!(config.gateway_endpoint()?.to_string(), "192.168.1.10:3671");
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use core::time::Duration;

use crate::error::{KnxError, Result};
use crate::net::{IpEndpoint, Ipv4Addr};
use crate::protocol::constants::KNXNETIP_DEFAULT_PORT;
use crate::protocol::frame::Hpai;

/// How the client reaches the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionType {
    /// Tunnelling over UDP
    #[default]
    Tunneling,
    /// Tunnelling over TCP
    TunnelingTcp,
    /// Multicast routing
    Routing,
}

impl ConnectionType {
    /// Whether this mode needs a gateway address.
    pub const fn needs_gateway(self) -> bool {
        !matches!(self, Self::Routing)
    }
}

impl core::str::FromStr for ConnectionType {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            s if s.eq_ignore_ascii_case("TUNNELING") || s.eq_ignore_ascii_case("TUNNELLING") => {
                Ok(Self::Tunneling)
            }
            s if s.eq_ignore_ascii_case("TUNNELING_TCP") => Ok(Self::TunnelingTcp),
            s if s.eq_ignore_ascii_case("ROUTING") => Ok(Self::Routing),
            _ => Err(KnxError::InvalidState),
        }
    }
}

/// Connection settings and tunnelling timing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionConfig {
    pub connection_type: ConnectionType,
    /// Local interface address. `None` lets the transport pick one.
    pub local_ip: Option<Ipv4Addr>,
    /// Local port, 0 for any free port.
    pub local_port: u16,
    pub gateway_ip: Option<Ipv4Addr>,
    pub gateway_port: u16,
    /// Advertise `0.0.0.0:0` so the gateway answers to the sender address (NAT).
    pub route_back: bool,
    pub auto_reconnect: bool,
    /// Backoff between reconnect attempts.
    pub auto_reconnect_wait: Duration,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub connect_timeout: Duration,
    /// Wait for one tunnelling ack.
    pub ack_timeout: Duration,
    /// Retransmissions after the first attempt.
    pub send_retries: u8,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Missed heartbeats tolerated before the connection counts as lost.
    pub heartbeat_retries: u8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Tunneling,
            local_ip: None,
            local_port: 0,
            gateway_ip: None,
            gateway_port: KNXNETIP_DEFAULT_PORT,
            route_back: false,
            auto_reconnect: true,
            auto_reconnect_wait: Duration::from_secs(3),
            max_reconnect_attempts: None,
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(1),
            send_retries: 1,
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(10),
            heartbeat_retries: 3,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        v if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => Ok(true),
        v if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => Ok(false),
        _ => Err(KnxError::InvalidState),
    }
}

fn parse_number<T: core::str::FromStr>(value: &str) -> Result<T> {
    value.parse().map_err(|_| KnxError::InvalidState)
}

impl ConnectionConfig {
    /// UDP tunnelling to `gateway_ip` on the default port.
    pub fn tunneling(gateway_ip: Ipv4Addr) -> Self {
        Self {
            gateway_ip: Some(gateway_ip),
            ..Self::default()
        }
    }

    /// Multicast routing.
    pub fn routing() -> Self {
        Self {
            connection_type: ConnectionType::Routing,
            ..Self::default()
        }
    }

    /// Read `KEY=VALUE` lines over the defaults.
    ///
    /// Blank lines and lines starting with `#` are skipped, and unknown
    /// keys are ignored.
    ///
    /// # Errors
    ///
    /// `InvalidState` for a line without `=` or a malformed value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(KnxError::InvalidState)?;
            config.apply(key.trim(), value.trim())?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "CONNECTION_TYPE" => self.connection_type = value.parse()?,
            "LOCAL_IP" => self.local_ip = Some(value.parse().map_err(|_| KnxError::InvalidState)?),
            "LOCAL_PORT" => self.local_port = parse_number(value)?,
            "GATEWAY_IP" => {
                self.gateway_ip = Some(value.parse().map_err(|_| KnxError::InvalidState)?);
            }
            "GATEWAY_PORT" => self.gateway_port = parse_number(value)?,
            "ROUTE_BACK" => self.route_back = parse_bool(value)?,
            "AUTO_RECONNECT" => self.auto_reconnect = parse_bool(value)?,
            "AUTO_RECONNECT_WAIT" => {
                self.auto_reconnect_wait = Duration::from_secs(parse_number(value)?);
            }
            _ => crate::knx_log!(debug, "Ignoring unknown config key {}", key),
        }
        Ok(())
    }

    /// Gateway control endpoint.
    ///
    /// # Errors
    ///
    /// `InvalidState` in routing mode or without a gateway address.
    pub fn gateway_endpoint(&self) -> Result<IpEndpoint> {
        if !self.connection_type.needs_gateway() {
            return Err(KnxError::InvalidState);
        }
        let addr = self.gateway_ip.ok_or(KnxError::InvalidState)?;
        Ok(IpEndpoint::new(addr, self.gateway_port))
    }

    /// Endpoint to bind locally.
    pub fn local_endpoint(&self) -> IpEndpoint {
        IpEndpoint::new(self.local_ip.unwrap_or(Ipv4Addr::UNSPECIFIED), self.local_port)
    }

    /// HPAI to advertise for a transport bound to `bound`.
    pub fn local_hpai(&self, bound: IpEndpoint) -> Hpai {
        match self.connection_type {
            ConnectionType::TunnelingTcp => Hpai::tcp(),
            _ if self.route_back => Hpai::route_back(),
            _ => Hpai::new(bound),
        }
    }

    /// Total attempts per telegram.
    pub const fn send_attempts(&self) -> u32 {
        self.send_retries as u32 + 1
    }
}
