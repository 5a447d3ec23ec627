//! Network types for KNX communication.
//!
//! `no_std` IPv4 address and endpoint types used by HPAIs and the
//! transports, plus the transport abstraction itself.

use core::fmt;

use crate::error::KnxError;

pub mod transport;

#[cfg(feature = "std")]
pub mod mock_transport;
#[cfg(feature = "std")]
pub mod udp;

#[doc(inline)]
pub use transport::AsyncTransport;

/// IPv4 address representation.
///
/// A lightweight wrapper around a 4-byte array that provides
/// ergonomic conversions from various input types.
///
/// # Examples
///
/// ```
/// use knx_tunnel::net::Ipv4Addr;
///
/// // From array
/// let addr = Ipv4Addr::from([192, 168, 1, 10]);
///
/// // From tuple
/// let addr = Ipv4Addr::from((192, 168, 1, 10));
///
/// // From raw bytes
/// let addr = Ipv4Addr::new(192, 168, 1, 10);
///
/// // All these work with APIs that accept `impl Into<Ipv4Addr>`
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Addr {
    octets: [u8; 4],
}

impl Ipv4Addr {
    /// Create a new IPv4 address from individual octets.
    ///
    /// # Examples
    ///
    /// ```
    /// use knx_tunnel::net::Ipv4Addr;
    ///
    /// let addr = Ipv4Addr::new(192, 168, 1, 10);
    /// assert_eq!(addr.octets(), [192, 168, 1, 10]);
    /// ```
    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            octets: [a, b, c, d],
        }
    }

    /// Returns the four octets that make up this address.
    ///
    /// # Examples
    ///
    /// ```
    /// use knx_tunnel::net::Ipv4Addr;
    ///
    /// let addr = Ipv4Addr::new(192, 168, 1, 10);
    /// assert_eq!(addr.octets(), [192, 168, 1, 10]);
    /// ```
    #[inline]
    pub const fn octets(&self) -> [u8; 4] {
        self.octets
    }

    /// Create an unspecified IPv4 address (0.0.0.0).
    ///
    /// This is commonly used for NAT mode in KNXnet/IP.
    ///
    /// # Examples
    ///
    /// ```
    /// use knx_tunnel::net::Ipv4Addr;
    ///
    /// let addr = Ipv4Addr::UNSPECIFIED;
    /// assert_eq!(addr.octets(), [0, 0, 0, 0]);
    /// ```
    pub const UNSPECIFIED: Self = Self::new(0, 0, 0, 0);

    /// Create a localhost IPv4 address (127.0.0.1).
    pub const LOCALHOST: Self = Self::new(127, 0, 0, 1);
}

impl From<[u8; 4]> for Ipv4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        Self { octets }
    }
}

impl From<(u8, u8, u8, u8)> for Ipv4Addr {
    #[inline]
    fn from((a, b, c, d): (u8, u8, u8, u8)) -> Self {
        Self::new(a, b, c, d)
    }
}

impl From<Ipv4Addr> for [u8; 4] {
    #[inline]
    fn from(addr: Ipv4Addr) -> [u8; 4] {
        addr.octets
    }
}

impl From<u32> for Ipv4Addr {
    #[inline]
    fn from(ip: u32) -> Self {
        Self {
            octets: ip.to_be_bytes(),
        }
    }
}

impl From<Ipv4Addr> for u32 {
    #[inline]
    fn from(addr: Ipv4Addr) -> u32 {
        u32::from_be_bytes(addr.octets)
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.octets[0], self.octets[1], self.octets[2], self.octets[3]
        )
    }
}

impl core::str::FromStr for Ipv4Addr {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut octets = [0u8; 4];

        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| KnxError::invalid_address(s))?;
            *octet = part.parse().map_err(|_| KnxError::invalid_address(s))?;
        }

        // Ensure no extra parts
        if parts.next().is_some() {
            return Err(KnxError::invalid_address(s));
        }

        Ok(Self { octets })
    }
}

/// IPv4 address and UDP/TCP port.
///
/// ```
/// use knx_tunnel::net::{IpEndpoint, Ipv4Addr};
///
/// let endpoint: IpEndpoint = "192.168.200.12:50100".parse()?;
/// assert_eq!(endpoint.addr, Ipv4Addr::new(192, 168, 200, 12));
/// assert_eq!(endpoint.port, 50100);
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IpEndpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl IpEndpoint {
    /// Unspecified endpoint `0.0.0.0:0`, used for NAT route-back HPAIs.
    pub const UNSPECIFIED: Self = Self::new(Ipv4Addr::UNSPECIFIED, 0);

    /// Create an endpoint.
    #[inline]
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl From<(Ipv4Addr, u16)> for IpEndpoint {
    #[inline]
    fn from((addr, port): (Ipv4Addr, u16)) -> Self {
        Self::new(addr, port)
    }
}

impl fmt::Display for IpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl core::str::FromStr for IpEndpoint {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, port) = s.split_once(':').ok_or_else(|| KnxError::invalid_address(s))?;
        Ok(Self {
            addr: addr.parse()?,
            port: port.parse().map_err(|_| KnxError::invalid_address(s))?,
        })
    }
}

#[cfg(feature = "std")]
impl From<IpEndpoint> for std::net::SocketAddr {
    fn from(endpoint: IpEndpoint) -> Self {
        let [a, b, c, d] = endpoint.addr.octets();
        Self::from((std::net::Ipv4Addr::new(a, b, c, d), endpoint.port))
    }
}

#[cfg(feature = "std")]
impl TryFrom<std::net::SocketAddr> for IpEndpoint {
    type Error = KnxError;

    fn try_from(addr: std::net::SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            std::net::SocketAddr::V4(v4) => Ok(Self::new(v4.ip().octets().into(), v4.port())),
            std::net::SocketAddr::V6(_) => Err(KnxError::InvalidState),
        }
    }
}
