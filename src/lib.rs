//! Sans-io implementation of the slave side of a half-duplex multi-drop
//! serial bus protocol.
//!
//! One master and up to 126 addressed nodes share an RS-485 line. The
//! master initiates every exchange: it broadcasts data to all nodes,
//! sends data to one node, or polls one node for pending data. Frames
//! are small length-prefixed binary messages guarded by an XOR checksum:
//!
//! | direction | wire format |
//! |---|---|
//! | master → node | `[address][type][length][payload…][checksum]` |
//! | master → node, poll | `[address][type][0]` — no checksum byte |
//! | node → master, nothing | `[0x00]` |
//! | node → master, data | `[length][type][payload…][checksum]` |
//!
//! The crate contains no I/O. [`Node`] is the protocol engine: its entry
//! points are meant to be called from the receive, transmit and timer
//! interrupt handlers of the target, against a hardware shim implementing
//! [`BusHal`]. Decoded requests come out of a single-producer
//! single-consumer queue and replies go back in through
//! [`Node::begin_transmit`], so slow response building stays out of
//! interrupt context. See the [`Node`] documentation for an example.
//!
//! The lower layers are usable on their own:
//! [`decoder::Decoder`] is the per-byte frame decoder, [`Frame`] and
//! [`Response`] carry the wire encoding, and [`wire`] holds buffer-level
//! parsers for monitors and test harnesses.
//!
//! Disable the default `std` feature for bare-metal targets.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod decoder;
pub mod frame;
pub mod hal;
pub mod node;
mod types;
pub mod wire;

pub use crate::frame::{ChecksumPolicy, Frame, Payload, Response, MAX_PAYLOAD};
pub use crate::hal::{BusDirection, BusHal};
pub use crate::node::{Config, Node, Stats};
pub use crate::types::{addr, Address, Error, IntoAddress, MessageType};
