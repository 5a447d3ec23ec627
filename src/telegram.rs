//! Telegrams exchanged with the KNX bus.
//!
//! A [`Telegram`] is the unit the application works with: a source, a
//! destination, a direction and an application layer service ([`Apci`]).
//! The cEMI codec wraps it for transport.

pub mod apci;

#[doc(inline)]
pub use apci::{Apci, ApciService, MemoryData};

use core::fmt;

use crate::addressing::{GroupAddress, IndividualAddress};

/// Whether a telegram was received from or is sent to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelegramDirection {
    #[default]
    Outgoing,
    Incoming,
}

/// Destination of a telegram.
///
/// The cEMI group flag is derived from the variant on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DestinationAddress {
    Group(GroupAddress),
    Individual(IndividualAddress),
}

impl DestinationAddress {
    /// Raw 16-bit value.
    #[inline]
    pub const fn raw(self) -> u16 {
        match self {
            Self::Group(address) => address.raw(),
            Self::Individual(address) => address.raw(),
        }
    }

    /// Wire bytes, big-endian.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw().to_be_bytes()
    }

    /// Whether this is a group address.
    #[inline]
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// The group address, if any.
    pub const fn group(self) -> Option<GroupAddress> {
        match self {
            Self::Group(address) => Some(address),
            Self::Individual(_) => None,
        }
    }
}

impl Default for DestinationAddress {
    fn default() -> Self {
        Self::Group(GroupAddress::default())
    }
}

impl From<GroupAddress> for DestinationAddress {
    fn from(address: GroupAddress) -> Self {
        Self::Group(address)
    }
}

impl From<IndividualAddress> for DestinationAddress {
    fn from(address: IndividualAddress) -> Self {
        Self::Individual(address)
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(address) => fmt::Display::fmt(address, f),
            Self::Individual(address) => fmt::Display::fmt(address, f),
        }
    }
}

/// A KNX telegram.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telegram {
    pub source: IndividualAddress,
    pub destination: DestinationAddress,
    pub direction: TelegramDirection,
    pub payload: Apci,
}

impl Telegram {
    /// Outgoing telegram with an unset (0.0.0) source. The gateway fills in
    /// its tunnel address.
    pub fn new(destination: impl Into<DestinationAddress>, payload: Apci) -> Self {
        Self {
            source: IndividualAddress::default(),
            destination: destination.into(),
            direction: TelegramDirection::Outgoing,
            payload,
        }
    }

    /// Set the source address.
    #[must_use]
    pub fn with_source(mut self, source: IndividualAddress) -> Self {
        self.source = source;
        self
    }

    /// Set the direction.
    #[must_use]
    pub fn with_direction(mut self, direction: TelegramDirection) -> Self {
        self.direction = direction;
        self
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Telegram direction={:?} source={} destination={} payload={:?}>",
            self.direction, self.source, self.destination, self.payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpt::Payload;

    #[test]
    fn test_destination_kind() {
        let group = DestinationAddress::from(GroupAddress::from_raw(0x0A03));
        let individual = DestinationAddress::from(IndividualAddress::from_raw(0x0A03));
        assert!(group.is_group());
        assert!(!individual.is_group());
        assert_eq!(group.raw(), individual.raw());
        assert_ne!(group, individual);
        assert_eq!(group.to_bytes(), [0x0A, 0x03]);
    }

    #[test]
    fn test_telegram_builder() {
        let telegram = Telegram::new(
            GroupAddress::new(1, 2, 3).unwrap(),
            Apci::GroupValueWrite(Payload::binary(1).unwrap()),
        )
        .with_source(IndividualAddress::new(1, 1, 5).unwrap())
        .with_direction(TelegramDirection::Incoming);

        assert_eq!(telegram.direction, TelegramDirection::Incoming);
        assert_eq!(telegram.source.to_string(), "1.1.5");
        assert_eq!(telegram.destination.to_string(), "1/2/3");
    }

    #[test]
    fn test_default_is_group_read() {
        let telegram = Telegram::default();
        assert_eq!(telegram.payload, Apci::GroupValueRead);
        assert!(telegram.destination.is_group());
    }
}
