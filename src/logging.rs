//! Unified logging macro.
//!
//! `knx_log!` forwards to `defmt` when the `defmt` feature is enabled and to
//! the `log` facade otherwise, so codec and session code log the same way on
//! a microcontroller and on a host.
//!
//! ```rust,ignore
//! knx_log!(info, "Tunnel connected on channel {}", channel_id);
//! knx_log!(warn, "No ack for sequence {}, attempt {}/{}", seq, attempt, total);
//! ```
//!
//! Arguments must implement both `core::fmt::Display` and `defmt::Format`
//! when the crate is built with `defmt`, so stick to integers, `&str` and
//! `bool` in log calls.

/// Log through `defmt` (feature `defmt`) or `log` (default).
#[macro_export]
#[cfg(feature = "defmt")]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
}

/// Log through `defmt` (feature `defmt`) or `log` (default).
#[macro_export]
#[cfg(not(feature = "defmt"))]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { log::trace!($($arg)*) };
}
