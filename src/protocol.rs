//! Framing for the controller's "300" protocol: a preamble byte, a
//! length-prefixed body and an additive 8-bit checksum. The peer device
//! is fixed, so the weak checksum is preserved bit-for-bit.

use std::fmt::Write as _;

use crate::error::AppError;

pub const PREAMBLE: u8 = 0x41;
pub const ACK: u8 = 0x06;
/// Periodic KW-mode marker; received mid-transaction it signals a desync.
pub const SYNC: u8 = 0x05;
pub const RESET: u8 = 0x04;
pub const MODE_SELECT: [u8; 3] = [0x16, 0x00, 0x00];

/// Largest register payload the cache holds.
pub const MAX_PAYLOAD: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Read = 1,
    Write = 2,
}

/// Wrapping sum over the length field through the payload.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn encode_read(addr: u16, len: usize) -> Result<Vec<u8>, AppError> {
    build(Op::Read, addr, len, &[])
}

pub fn encode_write(addr: u16, payload: &[u8]) -> Result<Vec<u8>, AppError> {
    build(Op::Write, addr, payload.len(), payload)
}

fn build(op: Op, addr: u16, len: usize, payload: &[u8]) -> Result<Vec<u8>, AppError> {
    if !(1..=MAX_PAYLOAD).contains(&len) {
        return Err(AppError::InvalidValue(format!(
            "register length {len} out of range"
        )));
    }

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.push(PREAMBLE);
    frame.push((5 + payload.len()) as u8);
    frame.push(0x00); // direction: host -> device
    frame.push(op as u8);
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.push(len as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame[1..]));

    Ok(frame)
}

pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
