//! Range-checked types for bus addresses and message tags, meant to
//! simplify correct usage of the API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::TryInto;
use core::ops::Deref;

/// Error type for this crate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid bus address.
    #[snafu(display("Invalid bus address"))]
    InvalidAddress,
    /// The payload doesn't fit in a single bus frame.
    #[snafu(display("Payload too long for a bus frame"))]
    PayloadTooLong,
    /// A transmission is already in flight.
    #[snafu(display("Transmitter busy"))]
    TransmitterBusy,
    /// The node is configured as disabled.
    #[snafu(display("Node disabled"))]
    Disabled,
}

/// `Address` is a range-checked [0, 126] integer, identifying a node on
/// the bus. Address 0 is the broadcast address; a node's own address must
/// be in [1, 126].
///
/// ## Example
/// ```
/// use panelbus_proto::Address;
/// let addr = Address::new(10).unwrap();
/// let addr: Address = 10u8.try_into().unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

/// Create a new [`Address`], panics if it is out of range.
pub const fn addr(a: u8) -> Address {
    if a <= Address::MAX {
        return Address(a);
    }
    panic!("Invalid address.")
}

impl Address {
    /// Highest assignable node address.
    pub const MAX: u8 = 126;

    /// Frames sent to this address are processed by every node, and never
    /// answered.
    pub const BROADCAST: Address = Address(0);

    /// Create a new address, checking that the address is in \[0, 126\].
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().context(InvalidAddressSnafu)?;
        ensure!(address <= Self::MAX, InvalidAddressSnafu);
        Ok(Self(address))
    }

    pub(crate) const fn from_raw_unchecked(address: u8) -> Self {
        Self(address)
    }

    /// Returns true for the broadcast address 0.
    pub const fn is_broadcast(self) -> bool {
        self.0 == 0
    }

    /// The on-wire byte value.
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for Address {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

/// Trait to convert `T: TryInto<u8>` into an [`Address`].
pub trait IntoAddress {
    /// Convert self to an Address.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if self isn't a valid address.
    fn into_address(self) -> Result<Address, Error>;
}

impl IntoAddress for Address {
    fn into_address(self) -> Result<Address, Error> {
        Ok(self)
    }
}

impl<T> IntoAddress for T
where
    T: TryInto<u8>,
{
    fn into_address(self) -> Result<Address, Error> {
        Address::new(self)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The message tag carried in every frame.
///
/// The tag is opaque to the framing layer; unknown values are carried
/// through untouched so that frames for other nodes still parse and the
/// byte stream stays synchronized.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum MessageType {
    /// A payload-carrying data frame (broadcast or addressed).
    Data,
    /// A zero-length poll request.
    Poll,
    /// A tag this crate doesn't assign a meaning to.
    Other(u8),
}

impl MessageType {
    /// Map an on-wire tag byte to a `MessageType`.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Data,
            2 => Self::Poll,
            other => Self::Other(other),
        }
    }

    /// The on-wire tag byte.
    pub const fn raw(self) -> u8 {
        match self {
            Self::Data => 1,
            Self::Poll => 2,
            Self::Other(raw) => raw,
        }
    }
}

impl From<u8> for MessageType {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

impl From<MessageType> for u8 {
    fn from(tag: MessageType) -> Self {
        tag.raw()
    }
}


#[cfg(test)]
mod message_type_tests {
    use super::MessageType;

    #[test]
    fn test_known_tags() {
        assert_eq!(MessageType::from_raw(1), MessageType::Data);
        assert_eq!(MessageType::from_raw(2), MessageType::Poll);
        assert_eq!(MessageType::Data.raw(), 1);
        assert_eq!(MessageType::Poll.raw(), 2);
    }

    #[test]
    fn test_unknown_tags_round_trip() {
        for raw in [0u8, 3, 0x7f, 0xff] {
            assert_eq!(MessageType::from_raw(raw).raw(), raw);
        }
    }
}
