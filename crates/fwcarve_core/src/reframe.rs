//! Image reframer.
//!
//! A rebuilt image is laid out as:
//!
//! ```text
//! +------------------+------------+-------------+---------+------------------------+
//! | original[..head] | HIKAIMODEL | len: u64 LE | payload | original[head..]       |
//! +------------------+------------+-------------+---------+------------------------+
//! ```
//!
//! with `head = min(1 MiB, original.len() / 4)`. The original bytes are kept
//! in full; the payload is inserted, not substituted.

use std::io::Write;

use crate::error::{CoreError, Result};
use crate::types::MIB;

pub const MARKER: &[u8; 10] = b"HIKAIMODEL";
pub const LENGTH_FIELD_SIZE: usize = 8;
pub const MARKER_BLOCK_SIZE: usize = MARKER.len() + LENGTH_FIELD_SIZE;
pub const MAX_HEAD_SIZE: usize = MIB as usize;

#[inline]
#[must_use]
pub fn head_size(original_len: usize) -> usize {
    (original_len / 4).min(MAX_HEAD_SIZE)
}

#[must_use]
pub fn marker_block(payload_len: u64) -> [u8; MARKER_BLOCK_SIZE] {
    let mut block = [0u8; MARKER_BLOCK_SIZE];
    block[..MARKER.len()].copy_from_slice(MARKER);
    block[MARKER.len()..].copy_from_slice(&payload_len.to_le_bytes());
    block
}

/// Size of the image [`reframe`] produces for the given input sizes.
#[inline]
#[must_use]
pub fn reframed_len(original_len: usize, payload_len: usize) -> u64 {
    original_len as u64 + MARKER_BLOCK_SIZE as u64 + payload_len as u64
}

fn check_inputs(original: &[u8], payload: &[u8]) -> Result<()> {
    if original.is_empty() {
        return Err(CoreError::InvalidInput("original image is empty".into()));
    }
    if payload.is_empty() {
        return Err(CoreError::InvalidInput("payload is empty".into()));
    }
    Ok(())
}

/// Builds the rebuilt image in memory.
pub fn reframe(original: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    check_inputs(original, payload)?;

    let head = head_size(original.len());
    let mut out = Vec::with_capacity(original.len() + MARKER_BLOCK_SIZE + payload.len());
    out.extend_from_slice(&original[..head]);
    out.extend_from_slice(&marker_block(payload.len() as u64));
    out.extend_from_slice(payload);
    out.extend_from_slice(&original[head..]);
    Ok(out)
}

/// Writes the rebuilt image straight into `writer`, returning the byte count.
///
/// Produces exactly the bytes of [`reframe`] without materialising a second
/// copy of the image.
pub fn reframe_to_writer<W: Write + ?Sized>(
    original: &[u8],
    payload: &[u8],
    writer: &mut W,
) -> Result<u64> {
    check_inputs(original, payload)?;

    let head = head_size(original.len());
    writer.write_all(&original[..head])?;
    writer.write_all(&marker_block(payload.len() as u64))?;
    writer.write_all(payload)?;
    writer.write_all(&original[head..])?;
    writer.flush()?;
    Ok(reframed_len(original.len(), payload.len()))
}
