//! UDP transport over [`tokio::net::UdpSocket`].
//!
//! # Example
//!
//! ```no_run
//! use knx_tunnel::net::udp::UdpTransport;
//! use knx_tunnel::net::{AsyncTransport, IpEndpoint};
//!
//! # async fn example() -> knx_tunnel::Result<()> {
//! let gateway: IpEndpoint = "192.168.1.10:3671".parse()?;
//! let transport = UdpTransport::bind_for_gateway(0, gateway).await?;
//! println!("Advertising {}", transport.local_endpoint());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use crate::net::{IpEndpoint, Ipv4Addr};

/// Datagram transport for tunnelling and routing.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local: IpEndpoint,
}

impl UdpTransport {
    /// Bind to a local endpoint. Port 0 picks any free port.
    ///
    /// # Errors
    ///
    /// Transport error when the socket cannot be bound.
    pub async fn bind(local: IpEndpoint) -> Result<Self> {
        log::debug!("Binding UDP socket to {local}");
        let socket = UdpSocket::bind(SocketAddr::from(local)).await.map_err(|e| {
            log::error!("Failed to bind UDP socket to {local}: {e}");
            KnxError::send_failed()
        })?;
        let bound = socket.local_addr().map_err(|e| {
            log::error!("Failed to get local address: {e}");
            KnxError::send_failed()
        })?;
        let local = IpEndpoint::try_from(bound)?;
        log::debug!("UDP socket bound to {local}");
        Ok(Self { socket, local })
    }

    /// Bind on all interfaces and advertise the interface address that
    /// routes to `gateway`.
    ///
    /// # Errors
    ///
    /// Transport error when no route to the gateway exists or binding fails.
    pub async fn bind_for_gateway(local_port: u16, gateway: IpEndpoint) -> Result<Self> {
        let probe = std::net::UdpSocket::bind("0.0.0.0:0").map_err(|_| KnxError::send_failed())?;
        probe
            .connect(SocketAddr::from(gateway))
            .map_err(|_| KnxError::send_failed())?;
        let route = probe.local_addr().map_err(|_| KnxError::send_failed())?;
        let interface = IpEndpoint::try_from(route)?.addr;

        let mut transport = Self::bind(IpEndpoint::new(Ipv4Addr::UNSPECIFIED, local_port)).await?;
        transport.local = IpEndpoint::new(interface, transport.local.port);
        Ok(transport)
    }

    /// Join a multicast group for routing.
    ///
    /// # Errors
    ///
    /// Transport error when the group cannot be joined.
    pub fn join_multicast(&self, group: Ipv4Addr) -> Result<()> {
        let [a, b, c, d] = group.octets();
        let [ia, ib, ic, id] = self.local.addr.octets();
        self.socket
            .join_multicast_v4(
                std::net::Ipv4Addr::new(a, b, c, d),
                std::net::Ipv4Addr::new(ia, ib, ic, id),
            )
            .map_err(|e| {
                log::error!("Failed to join multicast group {group}: {e}");
                KnxError::send_failed()
            })
    }
}

impl AsyncTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], addr: IpEndpoint) -> Result<()> {
        log::trace!("Sending {} bytes from {} to {}", data.len(), self.local, addr);
        self.socket
            .send_to(data, SocketAddr::from(addr))
            .await
            .map_err(|e| {
                log::error!("Failed to send datagram to {addr}: {e}");
                KnxError::send_failed()
            })?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        let (n, src) = self.socket.recv_from(buf).await.map_err(|e| {
            log::error!("Failed to receive datagram on {}: {e}", self.local);
            KnxError::receive_failed()
        })?;
        log::trace!("Received {n} bytes from {src}");
        Ok((n, IpEndpoint::try_from(src)?))
    }

    fn local_endpoint(&self) -> IpEndpoint {
        self.local
    }
}
