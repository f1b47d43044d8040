//! Buffered reader for firmware files that cannot be memory mapped.

use fwcarve_core::{BlockSource, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only block source over a firmware file or device node.
///
/// Used when mapping fails, e.g. for character devices or special
/// filesystems. Reads are positioned, so the locator can stream the file
/// one window at a time.
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(false)
            .open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }
}

impl BlockSource for DiskReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let bytes_read = self.file.read(buffer)?;

        Ok(bytes_read)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_reader_basic() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"HIK firmware image with a model inside";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();
        let mut reader = DiskReader::new(temp_file.path()).unwrap();

        assert_eq!(reader.size(), test_data.len() as u64);

        let mut buffer = vec![0u8; 3];
        assert_eq!(reader.read_chunk(0, &mut buffer).unwrap(), 3);
        assert_eq!(&buffer, b"HIK");

        let mut buffer = vec![0u8; 5];
        assert_eq!(reader.read_full(33, &mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"nside");
    }

    #[test]
    fn test_disk_reader_read_beyond_end() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Short").unwrap();
        temp_file.flush().unwrap();

        let mut reader = DiskReader::new(temp_file.path()).unwrap();

        let mut buffer = vec![0u8; 100];
        let bytes_read = reader.read_full(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 5);
    }

    #[test]
    fn test_disk_reader_missing_file() {
        assert!(DiskReader::new("/nonexistent/digicap.dav").is_err());
    }
}
