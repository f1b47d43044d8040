//! All-or-nothing output files.
//!
//! Data goes to a temporary file in the destination directory and is renamed
//! over the destination only after a successful flush and fsync. A dropped,
//! uncommitted [`AtomicFile`] removes its temporary file and leaves the
//! destination untouched.

use fwcarve_core::{CoreError, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

pub struct AtomicFile {
    inner: BufWriter<NamedTempFile>,
    dest: PathBuf,
    written: u64,
}

impl AtomicFile {
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        Ok(Self {
            inner: BufWriter::with_capacity(WRITE_BUFFER_SIZE, temp),
            dest,
            written: 0,
        })
    }

    /// Flushes, syncs and renames the temporary file onto the destination.
    pub fn commit(self) -> Result<u64> {
        let temp = self.inner.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.dest)
            .map_err(|e| CoreError::Io(e.error))?;

        debug!(path = %self.dest.display(), bytes = self.written, "committed output file");
        Ok(self.written)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Writes `data` to `dest` atomically.
pub fn write_atomic(dest: impl AsRef<Path>, data: &[u8]) -> Result<u64> {
    let mut file = AtomicFile::create(dest)?;
    file.write_all(data)?;
    file.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("ai_model").join("traffic_signs.bin");

        let n = write_atomic(&dest, b"model").unwrap();
        assert_eq!(n, 5);
        assert_eq!(fs::read(&dest).unwrap(), b"model");
    }

    #[test]
    fn test_uncommitted_file_leaves_destination_alone() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("digicap_modified.dav");
        fs::write(&dest, b"previous").unwrap();

        {
            let mut file = AtomicFile::create(&dest).unwrap();
            file.write_all(b"half a rebuilt ima").unwrap();
        }

        assert_eq!(fs::read(&dest).unwrap(), b"previous");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_commit_replaces_existing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"old contents").unwrap();

        let mut file = AtomicFile::create(&dest).unwrap();
        file.write_all(b"new").unwrap();
        assert_eq!(file.commit().unwrap(), 3);

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }
}
