//! Mock transport for testing.
//!
//! Frames pushed with [`MockTransport::push_inbound`] are returned by
//! `recv_from()` in FIFO order. Every frame passed to `send_to()` is logged
//! and can be awaited with [`MockTransport::next_sent`], which lets a test
//! play the gateway side of a conversation.
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::net::mock_transport::MockTransport;
//! use knx_tunnel::net::AsyncTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = MockTransport::new();
//! mock.push_inbound(&[0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 0x15, 0x00]);
//!
//! let mut buf = [0u8; 64];
//! let (n, from) = mock.recv_from(&mut buf).await.unwrap();
//! assert_eq!(n, 8);
//! assert_eq!(from, mock.gateway());
//!
//! mock.send_to(&[0x06, 0x10], from).await.unwrap();
//! assert_eq!(mock.next_sent().await.unwrap(), vec![0x06, 0x10]);
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use crate::net::{IpEndpoint, Ipv4Addr};

type Datagram = (Vec<u8>, IpEndpoint);

/// In-memory transport with scripted inbound frames and an outbound log.
#[derive(Debug)]
pub struct MockTransport {
    local: IpEndpoint,
    gateway: IpEndpoint,
    inbound_tx: mpsc::UnboundedSender<Datagram>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    sent_tx: mpsc::UnboundedSender<Datagram>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    sent_log: Mutex<Vec<Datagram>>,
    fail_send: AtomicBool,
    closed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Local endpoint used by [`MockTransport::new`].
    pub const DEFAULT_LOCAL: IpEndpoint = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 50), 50100);
    /// Gateway endpoint used by [`MockTransport::new`].
    pub const DEFAULT_GATEWAY: IpEndpoint = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3671);

    /// Mock bound to [`Self::DEFAULT_LOCAL`], receiving from [`Self::DEFAULT_GATEWAY`].
    pub fn new() -> Self {
        Self::with_endpoints(Self::DEFAULT_LOCAL, Self::DEFAULT_GATEWAY)
    }

    /// Mock with explicit local and gateway endpoints.
    pub fn with_endpoints(local: IpEndpoint, gateway: IpEndpoint) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            local,
            gateway,
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            sent_log: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The endpoint inbound frames appear to come from.
    pub fn gateway(&self) -> IpEndpoint {
        self.gateway
    }

    /// Queue a frame from the gateway.
    pub fn push_inbound(&self, data: &[u8]) {
        self.push_inbound_from(data, self.gateway);
    }

    /// Queue a frame from an arbitrary endpoint.
    pub fn push_inbound_from(&self, data: &[u8], from: IpEndpoint) {
        // The receiver lives as long as `self`.
        let _ = self.inbound_tx.send((data.to_vec(), from));
    }

    /// Wait for the next frame passed to `send_to()`.
    ///
    /// Returns `None` only if the mock is dropped while waiting.
    pub async fn next_sent(&self) -> Option<Vec<u8>> {
        self.next_sent_to().await.map(|(data, _)| data)
    }

    /// Wait for the next frame passed to `send_to()`, with its destination.
    pub async fn next_sent_to(&self) -> Option<(Vec<u8>, IpEndpoint)> {
        self.sent_rx.lock().await.recv().await
    }

    /// Every frame sent so far, oldest first.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(data, _)| data.clone())
            .collect()
    }

    /// Number of frames sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent_log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Make subsequent sends fail with a send error.
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Whether `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AsyncTransport for MockTransport {
    async fn send_to(&self, data: &[u8], addr: IpEndpoint) -> Result<()> {
        if self.is_closed() {
            return Err(KnxError::transport_closed());
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(KnxError::send_failed());
        }
        self.sent_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((data.to_vec(), addr));
        let _ = self.sent_tx.send((data.to_vec(), addr));
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        if self.is_closed() {
            return Err(KnxError::transport_closed());
        }
        let (data, from) = self
            .inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(KnxError::transport_closed)?;
        let target = buf.get_mut(..data.len()).ok_or_else(KnxError::receive_failed)?;
        target.copy_from_slice(&data);
        Ok((data.len(), from))
    }

    fn local_endpoint(&self) -> IpEndpoint {
        self.local
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
