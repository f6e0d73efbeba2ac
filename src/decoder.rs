//! Per-byte frame decoder.
//!
//! [`Decoder::feed`] consumes exactly one byte and performs a constant
//! amount of work, independent of how much of the frame has already been
//! accumulated. This is what allows the decoder to run inside a receive
//! interrupt handler: the service cost per byte does not grow with the
//! payload size.
//!
//! The decoder is purely computational. It performs no I/O, holds no
//! locks, and never allocates; all buffering happens in a fixed-capacity
//! store owned by the decoder itself.

use crate::frame::{ChecksumPolicy, Frame, Payload, MAX_PAYLOAD};
use crate::types::{Address, MessageType};

/// Progress of the in-flight frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReceiveState {
    /// Waiting for the address byte of the next frame.
    Idle,
    /// Address consumed, waiting for the message tag.
    AwaitType,
    /// Tag consumed, waiting for the payload length.
    AwaitLength,
    /// Consuming payload bytes; `remaining` more to go.
    AwaitPayload {
        /// Payload bytes still outstanding.
        remaining: u8,
    },
    /// Payload complete, waiting for the checksum byte.
    AwaitChecksum,
}

/// Why an in-flight frame was abandoned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The byte in idle position cannot start a frame.
    AddressOutOfRange,
    /// The length byte exceeds [`MAX_PAYLOAD`].
    LengthOutOfRange,
    /// The checksum byte doesn't match the frame contents.
    ChecksumMismatch,
}

/// Outcome of feeding one byte to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The byte was consumed; the frame is not complete yet.
    NeedData,
    /// The byte completed a frame. The decoder is idle again.
    Complete(Frame),
    /// The byte made the in-flight frame invalid; it has been discarded
    /// whole and the decoder is idle again.
    Rejected(FrameError),
}

/// Streaming decoder for master→node frames.
#[derive(Debug)]
pub struct Decoder {
    policy: ChecksumPolicy,
    state: ReceiveState,
    address: u8,
    message_type: u8,
    payload: Payload,
    sum: u8,
}

impl Decoder {
    /// Create an idle decoder verifying checksums per `policy`.
    pub fn new(policy: ChecksumPolicy) -> Self {
        Self {
            policy,
            state: ReceiveState::Idle,
            address: 0,
            message_type: 0,
            payload: Payload::new(),
            sum: 0,
        }
    }

    /// The current progress of the in-flight frame.
    pub const fn state(&self) -> ReceiveState {
        self.state
    }

    /// Returns true while a partially received frame is pending.
    pub const fn in_frame(&self) -> bool {
        !matches!(self.state, ReceiveState::Idle)
    }

    /// Abandon any partially received frame and return to idle.
    pub fn reset(&mut self) {
        self.state = ReceiveState::Idle;
        self.payload.clear();
        self.sum = 0;
    }

    /// Consume one byte from the bus.
    pub fn feed(&mut self, byte: u8) -> Step {
        use ReceiveState::{AwaitChecksum, AwaitLength, AwaitPayload, AwaitType, Idle};

        match self.state {
            Idle => {
                if byte > Address::MAX {
                    // Not a frame start: response traffic from another
                    // node, or line noise.
                    return Step::Rejected(FrameError::AddressOutOfRange);
                }
                self.address = byte;
                self.sum = byte;
                self.payload.clear();
                self.state = AwaitType;
                Step::NeedData
            }
            AwaitType => {
                self.message_type = byte;
                self.sum ^= byte;
                self.state = AwaitLength;
                Step::NeedData
            }
            AwaitLength => {
                self.sum ^= byte;
                match byte {
                    // A zero-length frame is complete here; no checksum
                    // byte follows.
                    0 => Step::Complete(self.take_frame()),
                    len if (len as usize) <= MAX_PAYLOAD => {
                        self.state = AwaitPayload { remaining: len };
                        Step::NeedData
                    }
                    _ => {
                        self.reset();
                        Step::Rejected(FrameError::LengthOutOfRange)
                    }
                }
            }
            AwaitPayload { remaining } => {
                self.sum ^= byte;
                self.payload
                    .try_push(byte)
                    .expect("BUG: payload store too small");
                self.state = if remaining > 1 {
                    AwaitPayload {
                        remaining: remaining - 1,
                    }
                } else {
                    AwaitChecksum
                };
                Step::NeedData
            }
            AwaitChecksum => {
                if self.policy.accepts(self.sum, byte) {
                    Step::Complete(self.take_frame())
                } else {
                    self.reset();
                    Step::Rejected(FrameError::ChecksumMismatch)
                }
            }
        }
    }

    fn take_frame(&mut self) -> Frame {
        let payload = core::mem::take(&mut self.payload);
        let frame = Frame::from_parts(
            Address::from_raw_unchecked(self.address),
            MessageType::from_raw(self.message_type),
            payload,
        );
        self.reset();
        frame
    }
}
