mod atomic;
mod cancel;
mod mmap_reader;
mod reader;

pub use atomic::{write_atomic, AtomicFile};
pub use cancel::{is_cancelled, Cancellable};
pub use mmap_reader::MmapReader;
pub use reader::DiskReader;

use fwcarve_core::{BlockSource, CoreError, PayloadSegment, Result};
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use tracing::debug;

const COPY_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Opens a firmware source, preferring a memory map.
pub enum Reader {
    Mmap(MmapReader),
    Disk(DiskReader),
}

impl Reader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        match MmapReader::new(path_ref) {
            Ok(r) => Ok(Reader::Mmap(r)),
            Err(e) => {
                debug!(path = %path_ref.display(), error = ?e, "mmap unavailable, using buffered reads");
                Ok(Reader::Disk(DiskReader::new(path_ref)?))
            }
        }
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Reader::Mmap(_))
    }

    /// Streams `segment` from the source into `writer` in fixed chunks.
    pub fn copy_segment<W: Write + ?Sized>(
        &mut self,
        segment: PayloadSegment,
        writer: &mut W,
    ) -> Result<u64> {
        if segment.end() > self.size() {
            return Err(CoreError::OutOfBounds {
                offset: segment.end(),
                max: self.size(),
            });
        }
        if let Reader::Mmap(r) = self {
            let bytes = segment.slice(r.as_bytes())?;
            writer.write_all(bytes)?;
            return Ok(segment.length);
        }

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE.min(segment.length as usize)];
        let mut copied = 0u64;
        while copied < segment.length {
            let want = (segment.length - copied).min(buffer.len() as u64) as usize;
            let n = self.read_full(segment.offset + copied, &mut buffer[..want])?;
            if n == 0 {
                return Err(CoreError::OutOfBounds {
                    offset: segment.offset + copied,
                    max: self.size(),
                });
            }
            writer.write_all(&buffer[..n])?;
            copied += n as u64;
        }
        Ok(copied)
    }
}

impl BlockSource for Reader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Reader::Mmap(r) => r.read_chunk(offset, buffer),
            Reader::Disk(r) => r.read_chunk(offset, buffer),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Reader::Mmap(r) => r.size(),
            Reader::Disk(r) => r.size(),
        }
    }
}

/// A whole firmware image resident as one byte slice.
pub enum FirmwareBytes {
    Mapped(MmapReader),
    Owned(Vec<u8>),
}

impl Deref for FirmwareBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FirmwareBytes::Mapped(m) => m.as_bytes(),
            FirmwareBytes::Owned(v) => v,
        }
    }
}

/// Loads a file for the reframer, mapping it when possible.
pub fn load_bytes(path: impl AsRef<Path>) -> Result<FirmwareBytes> {
    let path_ref = path.as_ref();
    match MmapReader::new(path_ref) {
        Ok(m) => Ok(FirmwareBytes::Mapped(m)),
        Err(CoreError::InvalidInput(msg)) => Err(CoreError::InvalidInput(format!(
            "{}: {msg}",
            path_ref.display()
        ))),
        Err(e) => {
            debug!(path = %path_ref.display(), error = ?e, "mmap unavailable, reading into memory");
            Ok(FirmwareBytes::Owned(std::fs::read(path_ref)?))
        }
    }
}
