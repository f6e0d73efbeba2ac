//! Whole-buffer frame parsers, for tooling and tests.
//!
//! These streaming parsers decode the same wire format as
//! [`Decoder`](crate::decoder::Decoder), but over a byte buffer instead
//! of byte-by-byte. They are meant for bus monitors, master-side test
//! harnesses and round-trip tests; the interrupt path never uses them.

use nom::bytes::streaming::take;
use nom::combinator::verify;
use nom::number::streaming::u8 as any_byte;
use nom::Err::Incomplete;
use nom::IResult;

use crate::frame::{xor_sum, ChecksumPolicy, Frame, Payload, Response, MAX_PAYLOAD};
use crate::types::{Address, MessageType};

/// Result of scanning a buffer for a master→node frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestToken {
    /// A complete frame was parsed.
    Complete(Frame),
    /// The buffer holds the prefix of a valid frame.
    NeedData,
    /// The buffer cannot be a frame; one byte should be skipped.
    Invalid,
}

/// Try to parse one master→node frame from the front of `buf`.
///
/// Returns the number of consumed bytes and a token. `Invalid` consumes
/// a single byte so the caller can resynchronize byte by byte.
pub fn parse_request(buf: &[u8], policy: ChecksumPolicy) -> (usize, RequestToken) {
    match request(buf, policy) {
        Ok((rest, frame)) => (buf.len() - rest.len(), RequestToken::Complete(frame)),
        Err(Incomplete(_)) => (0, RequestToken::NeedData),
        Err(_) => (1, RequestToken::Invalid),
    }
}

fn request(buf: &[u8], policy: ChecksumPolicy) -> IResult<&[u8], Frame> {
    let (rest, address) = verify(any_byte, |b: &u8| *b <= Address::MAX)(buf)?;
    let (rest, tag) = any_byte(rest)?;
    let (rest, length) = verify(any_byte, |l: &u8| (*l as usize) <= MAX_PAYLOAD)(rest)?;

    let address = Address::from_raw_unchecked(address);
    let tag = MessageType::from_raw(tag);

    if length == 0 {
        // Three bytes are the whole frame; no checksum follows.
        return Ok((rest, Frame::from_parts(address, tag, Payload::new())));
    }

    let (rest, payload) = take(length)(rest)?;
    let sum = xor_sum(&[address.raw(), tag.raw(), length]) ^ xor_sum(payload);
    let (rest, _checksum) = verify(any_byte, |b: &u8| policy.accepts(sum, *b))(rest)?;

    let mut store = Payload::new();
    store
        .try_extend_from_slice(payload)
        .expect("BUG: payload store too small");
    Ok((rest, Frame::from_parts(address, tag, store)))
}

/// Result of scanning a buffer for a node→master reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseToken {
    /// A complete reply was parsed.
    Complete(Response),
    /// The buffer holds the prefix of a valid reply.
    NeedData,
    /// The buffer cannot be a reply; one byte should be skipped.
    Invalid,
}

/// Try to parse one node→master reply from the front of `buf`.
pub fn parse_response(buf: &[u8], policy: ChecksumPolicy) -> (usize, ResponseToken) {
    match response(buf, policy) {
        Ok((rest, reply)) => (buf.len() - rest.len(), ResponseToken::Complete(reply)),
        Err(Incomplete(_)) => (0, ResponseToken::NeedData),
        Err(_) => (1, ResponseToken::Invalid),
    }
}

fn response(buf: &[u8], policy: ChecksumPolicy) -> IResult<&[u8], Response> {
    let (rest, length) = verify(any_byte, |l: &u8| (*l as usize) <= MAX_PAYLOAD)(buf)?;
    if length == 0 {
        // "Nothing to report" is the single byte 0x00.
        return Ok((rest, Response::Empty));
    }

    let (rest, tag) = any_byte(rest)?;
    let (rest, payload) = take(length)(rest)?;
    let sum = xor_sum(&[length, tag]) ^ xor_sum(payload);
    let (rest, _checksum) = verify(any_byte, |b: &u8| policy.accepts(sum, *b))(rest)?;

    let mut store = Payload::new();
    store
        .try_extend_from_slice(payload)
        .expect("BUG: payload store too small");
    Ok((rest, Response::from_parts(MessageType::from_raw(tag), store)))
}
