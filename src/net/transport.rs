//! Datagram transport abstraction for KNXnet/IP.
//!
//! The tunnelling session only needs to send a complete frame to an endpoint
//! and receive complete frames. Both methods take `&self`, so the receive
//! loop and the send path can share one transport without a lock.
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::net::{AsyncTransport, IpEndpoint};
//! use knx_tunnel::net::udp::UdpTransport;
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! // Production: a real UDP socket
//! let transport = UdpTransport::bind(IpEndpoint::UNSPECIFIED).await?;
//! transport.send_to(&[0x06, 0x10], "192.168.1.10:3671".parse()?).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::net::IpEndpoint;

/// Asynchronous datagram transport.
///
/// Implementations deliver whole, already length-delimited datagrams. They
/// can be real sockets or mocks for testing.
///
/// # Examples
///
/// ```rust,no_run
/// use knx_tunnel::net::{AsyncTransport, IpEndpoint};
/// use knx_tunnel::Result;
///
/// struct LoopbackTransport;
///
/// impl AsyncTransport for LoopbackTransport {
///     async fn send_to(&self, _data: &[u8], _addr: IpEndpoint) -> Result<()> {
///         Ok(())
///     }
///
///     async fn recv_from(&self, _buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
///         core::future::pending().await
///     }
///
///     fn local_endpoint(&self) -> IpEndpoint {
///         IpEndpoint::UNSPECIFIED
///     }
/// }
/// ```
#[allow(async_fn_in_trait, reason = "used with concrete transports only")]
pub trait AsyncTransport {
    /// Send one datagram to `addr`.
    ///
    /// # Errors
    ///
    /// Transport error when the datagram could not be sent or the transport is closed.
    async fn send_to(&self, data: &[u8], addr: IpEndpoint) -> Result<()>;

    /// Wait for the next datagram. Returns its length and sender.
    ///
    /// # Errors
    ///
    /// Transport error when receiving fails or the transport is closed.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)>;

    /// Local address advertised in HPAIs.
    fn local_endpoint(&self) -> IpEndpoint;

    /// Close the transport and release resources.
    ///
    /// Default implementation does nothing.
    fn close(&self) {}
}
