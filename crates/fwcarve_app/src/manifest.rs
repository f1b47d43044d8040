use chrono::Utc;
use fwcarve_core::{statistics::compute_entropy, Detection};
use fwcarve_io::Cancellable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Bytes of the payload head kept for the entropy figure.
pub const ENTROPY_SAMPLE_SIZE: usize = 64 * 1024;

/// Record of one extraction, stored as JSON beside the side file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source: String,
    pub source_offset: String,
    pub source_offset_decimal: u64,
    pub length: u64,
    pub detection: String,
    pub sha256_hash: String,
    pub head_entropy: f64,
    pub extraction_timestamp: String,
}

impl Manifest {
    pub fn new(source: &Path, detection: &Detection, digest: &PayloadDigest) -> Self {
        Self {
            source: source.display().to_string(),
            source_offset: format!("0x{:08X}", detection.offset()),
            source_offset_decimal: detection.offset(),
            length: detection.length(),
            detection: detection.kind().to_string(),
            sha256_hash: digest.sha256.clone(),
            head_entropy: digest.head_entropy,
            extraction_timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDigest {
    pub sha256: String,
    pub head_entropy: f64,
    pub len: u64,
}

/// Forwards writes while hashing them and keeping the first bytes.
pub struct DigestWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    hasher: Sha256,
    sample: Vec<u8>,
    len: u64,
}

impl<'a, W: Write + ?Sized> DigestWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            sample: Vec::with_capacity(ENTROPY_SAMPLE_SIZE),
            len: 0,
        }
    }

    pub fn finish(self) -> PayloadDigest {
        PayloadDigest {
            sha256: hex::encode(self.hasher.finalize()),
            head_entropy: compute_entropy(&self.sample),
            len: self.len,
        }
    }
}

impl<W: Write + ?Sized> Write for DigestWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let written = &buf[..n];
        self.hasher.update(written);
        let room = ENTROPY_SAMPLE_SIZE - self.sample.len();
        self.sample.extend_from_slice(&written[..room.min(n)]);
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// SHA-256 of a file, streamed. Fails early once `cancel` is raised.
pub fn sha256_file(path: &Path, cancel: Option<&AtomicBool>) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut Cancellable::new(&mut file, cancel), &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
