#![cfg_attr(not(feature = "std"), no_std)]

//! # knx-tunnel
//!
//! KNXnet/IP client: address, datapoint, cEMI and frame codecs plus a
//! tunnelling session.
//!
//! The codec layers are `no_std` and allocation-free. The `std` feature
//! (default) adds the async [`TunnellingSession`], a UDP transport over
//! tokio and a mock transport for tests.
//!
//! ## Features
//!
//! - Individual, group and internal addresses with `ga!`/`ia!` literals
//! - DPT 3, 9 and 16 codecs
//! - cEMI `L_Data` frames with the group value, individual address, ADC,
//!   memory and device descriptor services
//! - KNXnet/IP frames for search, description, connection management,
//!   tunnelling and routing
//! - Tunnelling with acks, retransmission, heartbeats and reconnection
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::dpt::Payload;
//! use knx_tunnel::protocol::{CemiFrame, CemiMessageCode};
//! use knx_tunnel::{ga, Apci, Telegram};
//!
//! let telegram = Telegram::new(ga!(1/2/3), Apci::GroupValueWrite(Payload::binary(1)?));
//! let cemi = CemiFrame::from_telegram(&telegram, CemiMessageCode::LDataReq);
//!
//! let mut buf = [0u8; 32];
//! let len = cemi.to_knx(&mut buf)?;
//! assert_eq!(&buf[..len], &[0x11, 0x00, 0xBC, 0xE0, 0x00, 0x00, 0x0A, 0x03, 0x01, 0x00, 0x81]);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

#[macro_use]
pub mod macros;
#[macro_use]
pub mod logging;

pub mod addressing;
pub mod config;
pub mod dpt;
pub mod error;
pub mod net;
pub mod protocol;
pub mod remote_value;
pub mod telegram;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{Address, GroupAddress, GroupAddressType, IndividualAddress, InternalGroupAddress};
#[doc(inline)]
pub use config::{ConnectionConfig, ConnectionType};
#[doc(inline)]
pub use dpt::{DptCodec, Payload};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use net::{IpEndpoint, Ipv4Addr};
#[doc(inline)]
pub use protocol::{CemiFrame, KnxIpFrame, TunnelCore, TunnelState};
#[cfg(feature = "std")]
#[doc(inline)]
pub use protocol::{SessionEvent, TunnellingSession};
#[doc(inline)]
pub use remote_value::RemoteValueString;
#[doc(inline)]
pub use telegram::{Apci, DestinationAddress, Telegram};
