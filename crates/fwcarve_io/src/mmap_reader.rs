use fwcarve_core::{BlockSource, CoreError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

/// Read-only memory map of a firmware image.
///
/// The mapped bytes are handed to the locator and reframer as a plain slice,
/// so multi-hundred-megabyte images are never copied onto the heap.
pub struct MmapReader {
    mmap: Mmap,
    size: u64,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let size = file.seek(SeekFrom::End(0))?;

        if size == 0 {
            return Err(CoreError::InvalidInput(
                "Cannot map an empty firmware image".to_string(),
            ));
        }

        // The file is opened read-only and is not modified while mapped.
        let mmap =
            unsafe { Mmap::map(&file) }.map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

        if mmap.is_empty() {
            return Err(CoreError::InvalidFormat(
                "mmap returned empty mapping (block device not supported)".to_string(),
            ));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        Ok(Self { mmap, size })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }
}

impl BlockSource for MmapReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if let Some(slice) = self.slice(offset, buffer.len()) {
            let len = slice.len();
            buffer[..len].copy_from_slice(slice);
            Ok(len)
        } else {
            Ok(0)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}
