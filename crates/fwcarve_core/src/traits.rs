//! Core traits defining the interface for byte sources.
//!
//! The locator only needs sequential windowed reads, so the same scanning
//! logic runs over a memory-mapped image, a plain file or an in-memory
//! buffer.

use crate::error::Result;

/// A source of raw firmware bytes.
///
/// # Example
///
/// ```ignore
/// struct FirmwareFile { /* ... */ }
///
/// impl BlockSource for FirmwareFile {
///     fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
///         // Read from the file at offset
///     }
///
///     fn size(&self) -> u64 {
///         // Return total size in bytes
///     }
/// }
/// ```
pub trait BlockSource {
    /// Reads a chunk of data from the source at the specified offset.
    ///
    /// Returns the number of bytes actually read, which may be less than
    /// `buffer.len()` if the end of the source is reached. A return of `0`
    /// means the offset is at or past the end.
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the total size of the source in bytes.
    fn size(&self) -> u64;

    /// Fills `buffer` as far as the source allows, looping over short reads.
    fn read_full(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buffer.len() {
            let n = self.read_chunk(offset + filled as u64, &mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// In-memory sources, mostly useful for tests and small images.
impl BlockSource for &[u8] {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let start = offset as usize;
        if start >= self.len() {
            return Ok(0);
        }
        let end = start.saturating_add(buffer.len()).min(self.len());
        let len = end - start;
        buffer[..len].copy_from_slice(&self[start..end]);
        Ok(len)
    }

    #[inline]
    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source_reads_and_clamps() {
        let data: &[u8] = b"firmware-bytes";
        let mut source = data;

        let mut buffer = [0u8; 8];
        assert_eq!(source.read_chunk(0, &mut buffer).unwrap(), 8);
        assert_eq!(&buffer, b"firmware");

        assert_eq!(source.read_chunk(9, &mut buffer).unwrap(), 5);
        assert_eq!(&buffer[..5], b"bytes");

        assert_eq!(source.read_chunk(100, &mut buffer).unwrap(), 0);
        assert_eq!(source.size(), 14);
    }

    struct Trickle<'a>(&'a [u8]);

    impl BlockSource for Trickle<'_> {
        fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
            let start = offset as usize;
            if start >= self.0.len() || buffer.is_empty() {
                return Ok(0);
            }
            buffer[0] = self.0[start];
            Ok(1)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[test]
    fn test_read_full_loops_over_short_reads() {
        let mut source = Trickle(b"abcdef");
        let mut buffer = [0u8; 4];
        assert_eq!(source.read_full(1, &mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"bcde");

        let mut tail = [0u8; 4];
        assert_eq!(source.read_full(4, &mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], b"ef");
    }
}
