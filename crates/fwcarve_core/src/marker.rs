//! Reading the marker block back out of a rebuilt image.

use std::ops::Range;

use memchr::memmem;

use crate::error::{CoreError, Result};
use crate::reframe::{head_size, LENGTH_FIELD_SIZE, MARKER, MARKER_BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerBlock {
    /// Offset of the first marker byte.
    pub offset: usize,
    pub payload_len: u64,
}

impl MarkerBlock {
    #[inline]
    pub fn payload_range(&self) -> Range<usize> {
        let start = self.offset + MARKER_BLOCK_SIZE;
        start..start + self.payload_len as usize
    }

    /// Length of the original image this block was inserted into.
    #[inline]
    pub fn original_len(&self, image_len: usize) -> usize {
        image_len - MARKER_BLOCK_SIZE - self.payload_len as usize
    }
}

/// The four regions of a rebuilt image.
#[derive(Debug, Clone, Copy)]
pub struct RebuiltParts<'a> {
    pub head: &'a [u8],
    pub marker: MarkerBlock,
    pub payload: &'a [u8],
    pub tail: &'a [u8],
}

impl RebuiltParts<'_> {
    /// Head and tail joined back together.
    pub fn original(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.head.len() + self.tail.len());
        out.extend_from_slice(self.head);
        out.extend_from_slice(self.tail);
        out
    }
}

/// Offset of the first marker token, if any.
#[inline]
pub fn find_marker(image: &[u8]) -> Option<usize> {
    memmem::find(image, MARKER)
}

/// Offsets of every marker token in the image.
pub fn marker_offsets(image: &[u8]) -> Vec<usize> {
    memmem::find_iter(image, MARKER).collect()
}

/// Parses the marker block at a known offset.
pub fn parse_marker_at(image: &[u8], offset: usize) -> Result<MarkerBlock> {
    let token_end = offset.checked_add(MARKER.len()).ok_or(CoreError::OutOfBounds {
        offset: offset as u64,
        max: image.len() as u64,
    })?;
    if image.get(offset..token_end) != Some(&MARKER[..]) {
        return Err(CoreError::InvalidFormat(format!(
            "no marker token at offset {offset:#x}"
        )));
    }

    let field = image
        .get(token_end..token_end + LENGTH_FIELD_SIZE)
        .ok_or_else(|| {
            CoreError::InvalidFormat(format!(
                "length field after marker at {offset:#x} is truncated"
            ))
        })?;
    let mut raw = [0u8; LENGTH_FIELD_SIZE];
    raw.copy_from_slice(field);
    let payload_len = u64::from_le_bytes(raw);

    let payload_start = (offset + MARKER_BLOCK_SIZE) as u64;
    let available = image.len() as u64 - payload_start;
    if payload_len > available {
        return Err(CoreError::OutOfBounds {
            offset: payload_start.saturating_add(payload_len),
            max: image.len() as u64,
        });
    }

    Ok(MarkerBlock {
        offset,
        payload_len,
    })
}

/// Finds the marker block that is consistent with the rebuilt layout.
///
/// A token only counts if its offset equals the head size implied by the
/// image length minus the marker block and declared payload. Tokens that
/// happen to occur inside the original bytes or the payload are skipped.
pub fn read_marker(image: &[u8]) -> Result<MarkerBlock> {
    let mut first_err = None;
    for offset in memmem::find_iter(image, MARKER) {
        let err = match parse_marker_at(image, offset) {
            Ok(block) if block.offset == head_size(block.original_len(image.len())) => {
                return Ok(block);
            }
            Ok(block) => CoreError::InvalidFormat(format!(
                "marker at {:#x} does not match the rebuilt layout (payload {} bytes)",
                block.offset, block.payload_len
            )),
            Err(e) => e,
        };
        if first_err.is_none() {
            first_err = Some(err);
        }
    }
    Err(first_err.unwrap_or(CoreError::MarkerNotFound))
}

/// The payload embedded in a rebuilt image.
pub fn embedded_payload(image: &[u8]) -> Result<&[u8]> {
    let marker = read_marker(image)?;
    Ok(&image[marker.payload_range()])
}

pub fn split_rebuilt(image: &[u8]) -> Result<RebuiltParts<'_>> {
    let marker = read_marker(image)?;
    let range = marker.payload_range();
    Ok(RebuiltParts {
        head: &image[..marker.offset],
        marker,
        payload: &image[range.clone()],
        tail: &image[range.end..],
    })
}
