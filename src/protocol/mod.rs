//! KNXnet/IP protocol implementation.
//!
//! Codecs for cEMI messages, KNXnet/IP frames and their bodies, the sans-IO
//! tunnel state machine and, with `std`, the async tunnelling session.

pub mod cemi;
pub mod constants;
pub mod dib;
pub mod frame;
pub mod services;
#[cfg(feature = "std")]
pub mod session;
pub mod tunnel;

pub use cemi::CemiFrame;
pub use constants::{CemiMessageCode, ErrorCode, ServiceType};
pub use frame::{Hpai, KnxIpBody, KnxIpFrame, KnxIpHeader};
#[cfg(feature = "std")]
pub use session::{SessionEvent, TunnellingSession};
pub use tunnel::{TunnelCore, TunnelState};
