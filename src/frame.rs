//! Frame values and their wire encoding.
//!
//! Two frame shapes exist on the bus. The master transmits
//! `[address][type][length][payload...][checksum]`, where the checksum
//! byte is present only when `length > 0` — a three byte frame IS the
//! complete encoding of a zero-length poll. A node answers either with the
//! single byte `0x00` (nothing to report) or with
//! `[length][type][payload...][checksum]`.

use arrayvec::ArrayVec;

use crate::types::{Address, Error, IntoAddress, MessageType, PayloadTooLongSnafu};
use snafu::ensure;

/// Maximum number of payload bytes in a single frame.
pub const MAX_PAYLOAD: usize = 250;

/// Size of an encoded master→node frame: address, type, length, payload,
/// checksum.
pub(crate) const REQUEST_WIRE_MAX: usize = 3 + MAX_PAYLOAD + 1;

/// Size of an encoded node→master frame: length, type, payload, checksum.
pub(crate) const RESPONSE_WIRE_MAX: usize = 2 + MAX_PAYLOAD + 1;

/// Fixed-capacity payload storage.
pub type Payload = ArrayVec<u8, MAX_PAYLOAD>;

/// Running XOR of every byte in `data`.
pub(crate) fn xor_sum(data: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for byte in data {
        sum ^= *byte;
    }
    sum
}

/// Selects how the trailing checksum byte is produced and verified.
///
/// The default is the XOR of every frame byte preceding the checksum.
/// One legacy master implementation instead expects a constant sentinel
/// byte; configuring `Fixed` reproduces that behavior on both the encode
/// and the verify side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Computed XOR over all preceding frame bytes.
    #[default]
    Xor,
    /// A constant sentinel byte, for legacy-master interoperability.
    Fixed(u8),
}

impl ChecksumPolicy {
    /// The checksum byte to append to a frame whose preceding bytes XOR
    /// to `sum`.
    pub(crate) const fn seal(self, sum: u8) -> u8 {
        match self {
            Self::Xor => sum,
            Self::Fixed(sentinel) => sentinel,
        }
    }

    /// Whether `received` is a valid checksum byte for a frame whose
    /// preceding bytes XOR to `sum`.
    pub(crate) const fn accepts(self, sum: u8, received: u8) -> bool {
        received == self.seal(sum)
    }
}

/// A decoded master→node frame: a broadcast, an addressed data frame, or a
/// poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: Address,
    message_type: MessageType,
    payload: Payload,
}

impl Frame {
    /// Create a new frame.
    /// # Errors
    /// Returns [`Error::PayloadTooLong`] if `payload` exceeds
    /// [`MAX_PAYLOAD`] bytes, or [`Error::InvalidAddress`] for an invalid
    /// address.
    pub fn new(
        address: impl IntoAddress,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<Self, Error> {
        ensure!(payload.len() <= MAX_PAYLOAD, PayloadTooLongSnafu);
        let mut buf = Payload::new();
        buf.try_extend_from_slice(payload)
            .expect("BUG: payload store too small");
        Ok(Self {
            address: address.into_address()?,
            message_type,
            payload: buf,
        })
    }

    pub(crate) fn from_parts(address: Address, message_type: MessageType, payload: Payload) -> Self {
        Self {
            address,
            message_type,
            payload,
        }
    }

    /// The address the frame was sent to.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns true if the frame was sent to the broadcast address.
    pub const fn is_broadcast(&self) -> bool {
        self.address.is_broadcast()
    }

    /// The message tag.
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The payload bytes. Empty for a poll request.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize into the master→node wire form.
    ///
    /// A zero-length frame encodes to exactly three bytes with no
    /// checksum.
    pub fn encode(&self, policy: ChecksumPolicy) -> ArrayVec<u8, REQUEST_WIRE_MAX> {
        let mut data = ArrayVec::new();
        data.push(self.address.raw());
        data.push(self.message_type.raw());
        data.push(self.payload.len() as u8);
        if !self.payload.is_empty() {
            data.try_extend_from_slice(&self.payload)
                .expect("BUG: encode buffer too small");
            data.push(policy.seal(xor_sum(&data)));
        }
        data
    }
}

/// A node→master reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Nothing to report; a single `0x00` byte on the wire.
    Empty,
    /// A payload-carrying reply.
    Data {
        /// The message tag.
        message_type: MessageType,
        /// The payload bytes, at least one.
        payload: Payload,
    },
}

impl Response {
    /// Create a payload-carrying reply. An empty `payload` yields
    /// [`Response::Empty`], since the wire format cannot express a typed
    /// reply without data.
    /// # Errors
    /// Returns [`Error::PayloadTooLong`] if `payload` exceeds
    /// [`MAX_PAYLOAD`] bytes.
    pub fn data(message_type: MessageType, payload: &[u8]) -> Result<Self, Error> {
        ensure!(payload.len() <= MAX_PAYLOAD, PayloadTooLongSnafu);
        if payload.is_empty() {
            return Ok(Self::Empty);
        }
        let mut buf = Payload::new();
        buf.try_extend_from_slice(payload)
            .expect("BUG: payload store too small");
        Ok(Self::Data {
            message_type,
            payload: buf,
        })
    }

    pub(crate) fn from_parts(message_type: MessageType, payload: Payload) -> Self {
        if payload.is_empty() {
            Self::Empty
        } else {
            Self::Data {
                message_type,
                payload,
            }
        }
    }

    /// Serialize into the node→master wire form.
    pub fn encode(&self, policy: ChecksumPolicy) -> ArrayVec<u8, RESPONSE_WIRE_MAX> {
        let mut data = ArrayVec::new();
        match self {
            Self::Empty => data.push(0),
            Self::Data {
                message_type,
                payload,
            } => {
                data.push(payload.len() as u8);
                data.push(message_type.raw());
                data.try_extend_from_slice(payload)
                    .expect("BUG: encode buffer too small");
                data.push(policy.seal(xor_sum(&data)));
            }
        }
        data
    }
}
