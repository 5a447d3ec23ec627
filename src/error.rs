//! Error types for KNX operations.
//!
//! Errors are grouped into categories (addressing, datapoint conversion,
//! frame protocol, connection, tunnelling, transport). Each category struct
//! carries a private kind plus a backtrace when `std` is enabled, and exposes
//! `is_*` helpers instead of its kind enum.

use core::fmt;
use core::fmt::Write as _;

#[cfg(feature = "std")]
use std::backtrace::Backtrace;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

/// Capacity of the offending-token text kept in address and conversion errors.
pub const ERROR_CONTEXT_LEN: usize = 48;

/// Bounded text describing the value that caused an error.
pub type ErrorContext = heapless::String<ERROR_CONTEXT_LEN>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Protocol error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtocolErrorKind {
    FrameTooSmall,
    IncompleteFrame,
    UnsupportedMessage,
    UnhandleableMessage,
    MalformedFrame,
    MissingField(&'static str),
    BufferTooSmall,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    Refused(u8),
    Timeout,
    Lost,
    NotConnected,
    AlreadyConnected,
}

/// Tunnelling error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TunnellingErrorKind {
    AckTimeout,
    RetriesExhausted,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    SendFailed,
    ReceiveFailed,
    Closed,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    Individual,
    Group,
    Internal,
    Any,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX error type.
///
/// This is the error type returned by every fallible operation in the crate.
#[derive(Debug)]
pub enum KnxError {
    /// A malformed or out-of-range address token.
    Addressing(AddressingError),
    /// A datapoint value outside its declared domain, or a payload of the wrong shape.
    Dpt(DptError),
    /// Frame level errors (CEMI and KNXnet/IP).
    Protocol(ProtocolError),
    /// Connection establishment and lifetime errors.
    Connection(ConnectionError),
    /// Tunnelling request/acknowledgment errors.
    Tunnelling(TunnellingError),
    /// Socket errors.
    Transport(TransportError),
    /// Operation not valid in the current state or with the current configuration.
    InvalidState,
    /// A bounded wait elapsed.
    Timeout,
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Address parse error carrying the offending token.
#[derive(Debug)]
pub struct AddressingError {
    kind: AddressingErrorKind,
    token: ErrorContext,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind, token: &str) -> Self {
        Self {
            kind,
            token: truncated(token),
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// The token that failed to parse (truncated to [`ERROR_CONTEXT_LEN`] bytes).
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the token was rejected by the individual address grammar.
    pub fn is_individual(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::Individual)
    }

    /// Whether the token was rejected by the group address grammar.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::Group)
    }

    /// Whether the token was rejected by the internal group address grammar.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::Internal)
    }
}

/// Conversion error carrying a rendering of the offending value.
#[derive(Debug)]
pub struct DptError {
    value: ErrorContext,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl DptError {
    pub(crate) fn new(value: ErrorContext) -> Self {
        Self {
            value,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// The rejected value as text.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Protocol error with optional backtrace
#[derive(Debug)]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ProtocolError {
    pub(crate) fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Fewer bytes than the fixed part of the structure.
    pub fn is_frame_too_small(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::FrameTooSmall)
    }

    /// Fewer bytes than the header's declared total length.
    pub fn is_incomplete_frame(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::IncompleteFrame)
    }

    /// A known message or service code this crate does not implement.
    pub fn is_unsupported_message(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnsupportedMessage)
    }

    /// A message or service code with no defined meaning.
    pub fn is_unhandleable_message(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnhandleableMessage)
    }

    /// A length field or control field that contradicts the data.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::MalformedFrame)
    }

    /// Name of the required field that was not set, if this is a missing-field error.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self.kind {
            ProtocolErrorKind::MissingField(name) => Some(name),
            _ => None,
        }
    }

    /// Output buffer cannot hold the encoded frame.
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::BufferTooSmall)
    }
}

/// Connection error with optional backtrace
#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Timeout)
    }

    /// Status byte of a refused connect, if the gateway refused the connection.
    pub fn refused_status(&self) -> Option<u8> {
        match self.kind {
            ConnectionErrorKind::Refused(status) => Some(status),
            _ => None,
        }
    }

    /// Check if connection was lost
    pub fn is_lost(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Lost)
    }

    /// Check if the session had no open channel
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// Check if a connect was attempted on an open session
    pub fn is_already_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::AlreadyConnected)
    }
}

/// Tunnelling error with optional backtrace
#[derive(Debug)]
pub struct TunnellingError {
    kind: TunnellingErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl TunnellingError {
    pub(crate) fn new(kind: TunnellingErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// A single attempt got no matching acknowledgment in time.
    pub fn is_ack_timeout(&self) -> bool {
        matches!(self.kind, TunnellingErrorKind::AckTimeout)
    }

    /// All attempts of a send went unacknowledged.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self.kind, TunnellingErrorKind::RetriesExhausted)
    }
}

/// Transport error with optional backtrace
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the transport has been closed
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Closed)
    }

    /// Check if a send failed
    pub fn is_send_failed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::SendFailed)
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

fn truncated(text: &str) -> ErrorContext {
    let mut out = ErrorContext::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl KnxError {
    // Addressing errors
    pub(crate) fn invalid_individual_address(token: &str) -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::Individual, token))
    }

    pub(crate) fn invalid_group_address(token: &str) -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::Group, token))
    }

    pub(crate) fn invalid_internal_address(token: &str) -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::Internal, token))
    }

    pub(crate) fn invalid_address(token: &str) -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::Any, token))
    }

    // Conversion errors
    pub(crate) fn conversion(value: impl fmt::Debug) -> Self {
        let mut text = ErrorContext::new();
        // Overflowing the context only truncates the rendering.
        let _ = write!(text, "{value:?}");
        Self::Dpt(DptError::new(text))
    }

    // Protocol errors
    pub(crate) fn frame_too_small() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::FrameTooSmall))
    }

    pub(crate) fn incomplete_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::IncompleteFrame))
    }

    pub(crate) fn unsupported_message() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedMessage))
    }

    pub(crate) fn unhandleable_message() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnhandleableMessage))
    }

    pub(crate) fn malformed_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::MalformedFrame))
    }

    pub(crate) fn missing_field(name: &'static str) -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::MissingField(name)))
    }

    pub(crate) fn buffer_too_small() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::BufferTooSmall))
    }

    // Connection errors
    pub(crate) fn connection_refused(status: u8) -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Refused(status)))
    }

    pub(crate) fn connection_timeout() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Timeout))
    }

    pub(crate) fn connection_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn already_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AlreadyConnected))
    }

    // Tunnelling errors
    pub(crate) fn ack_timeout() -> Self {
        Self::Tunnelling(TunnellingError::new(TunnellingErrorKind::AckTimeout))
    }

    pub(crate) fn retries_exhausted() -> Self {
        Self::Tunnelling(TunnellingError::new(TunnellingErrorKind::RetriesExhausted))
    }

    // Transport errors
    pub(crate) fn send_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed))
    }

    pub(crate) fn receive_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::ReceiveFailed))
    }

    pub(crate) fn transport_closed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::Closed))
    }

    // Category checks

    /// Any address parse failure.
    pub fn is_address_parse(&self) -> bool {
        matches!(self, Self::Addressing(_))
    }

    /// Any datapoint conversion failure.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Dpt(_))
    }

    /// The protocol error, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }

    /// The connection error, if this is one.
    pub fn as_connection(&self) -> Option<&ConnectionError> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }

    /// The tunnelling error, if this is one.
    pub fn as_tunnelling(&self) -> Option<&TunnellingError> {
        match self {
            Self::Tunnelling(e) => Some(e),
            _ => None,
        }
    }

    /// Shorthand for `as_protocol().is_some_and(ProtocolError::is_frame_too_small)`.
    pub fn is_frame_too_small(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_frame_too_small)
    }

    /// Shorthand for the incomplete-frame protocol kind.
    pub fn is_incomplete_frame(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_incomplete_frame)
    }

    /// Shorthand for the unsupported-message protocol kind.
    pub fn is_unsupported_message(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_unsupported_message)
    }

    /// Shorthand for the unhandleable-message protocol kind.
    pub fn is_unhandleable_message(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_unhandleable_message)
    }

    /// Shorthand for the malformed-frame protocol kind.
    pub fn is_malformed_frame(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_malformed_frame)
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Addressing(e) => write!(f, "Could not parse address: \"{}\"", e.token),
            KnxError::Dpt(e) => write!(f, "Could not convert value: {}", e.value),
            KnxError::Protocol(e) => match e.kind {
                ProtocolErrorKind::MissingField(name) => write!(f, "{name} not set"),
                kind => write!(f, "Protocol error: {kind:?}"),
            },
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Tunnelling(e) => write!(f, "Tunnelling error: {:?}", e.kind),
            KnxError::Transport(e) => write!(f, "Transport error: {:?}", e.kind),
            KnxError::InvalidState => write!(f, "Invalid state"),
            KnxError::Timeout => write!(f, "Operation timeout"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for KnxError {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            KnxError::Addressing(e) => defmt::write!(f, "Addressing({=str})", e.token.as_str()),
            KnxError::Dpt(e) => defmt::write!(f, "Dpt({=str})", e.value.as_str()),
            KnxError::Protocol(_) => defmt::write!(f, "Protocol"),
            KnxError::Connection(_) => defmt::write!(f, "Connection"),
            KnxError::Tunnelling(_) => defmt::write!(f, "Tunnelling"),
            KnxError::Transport(_) => defmt::write!(f, "Transport"),
            KnxError::InvalidState => defmt::write!(f, "InvalidState"),
            KnxError::Timeout => defmt::write!(f, "Timeout"),
        }
    }
}

// Implement std::error::Error for std-based applications
#[cfg(feature = "std")]
impl std::error::Error for KnxError {}
