//! Wake packet codec
//!
//! A wake packet is framed as:
//! ```text
//! [ 6 bytes: 0xFF synchronisation stream ][ 16 x 6 bytes: target hardware address ]
//! ```
//!
//! The frame is sent as the payload of a UDP broadcast datagram.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::MacAddress;

/// Length of the synchronisation stream
pub const SYNC_LEN: usize = 6;

/// Number of address repetitions following the synchronisation stream
pub const ADDRESS_REPEAT: usize = 16;

/// Total wake packet length (102 bytes)
pub const PACKET_LEN: usize = SYNC_LEN + ADDRESS_REPEAT * 6;

/// Errors that can occur during decoding
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Not enough data: need {needed} bytes, have {available}")]
    NotEnoughData { needed: usize, available: usize },

    #[error("Invalid synchronisation stream")]
    InvalidSync,

    #[error("Address repetition {0} does not match the first")]
    InconsistentAddress(usize),
}

/// Encode a wake packet for the given hardware address
pub fn encode(mac: &MacAddress) -> Bytes {
    let mut buf = BytesMut::with_capacity(PACKET_LEN);
    encode_into(mac, &mut buf);
    buf.freeze()
}

/// Encode a wake packet directly into a provided buffer
pub fn encode_into(mac: &MacAddress, buf: &mut BytesMut) {
    buf.reserve(PACKET_LEN);
    buf.put_bytes(0xFF, SYNC_LEN);

    let octets = mac.octets();
    for _ in 0..ADDRESS_REPEAT {
        buf.put_slice(&octets);
    }
}

/// Decode a wake packet, returning the address it targets
///
/// Trailing bytes beyond the 102-byte frame (e.g. a SecureOn password)
/// are ignored.
pub fn decode(mut buf: &[u8]) -> Result<MacAddress, CodecError> {
    if buf.len() < PACKET_LEN {
        return Err(CodecError::NotEnoughData {
            needed: PACKET_LEN,
            available: buf.len(),
        });
    }

    if buf[..SYNC_LEN].iter().any(|&b| b != 0xFF) {
        return Err(CodecError::InvalidSync);
    }
    buf.advance(SYNC_LEN);

    let mut first = [0u8; 6];
    buf.copy_to_slice(&mut first);

    for i in 1..ADDRESS_REPEAT {
        let mut next = [0u8; 6];
        buf.copy_to_slice(&mut next);
        if next != first {
            return Err(CodecError::InconsistentAddress(i));
        }
    }

    Ok(MacAddress::new(first))
}
