//! Readers and writers that stop once a cancel flag is raised.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Largest single transfer, so a big `write_all` polls the flag between steps.
const STEP_SIZE: usize = 4 * 1024 * 1024;

#[inline]
pub fn is_cancelled(flag: Option<&AtomicBool>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::Relaxed))
}

pub struct Cancellable<'a, T: ?Sized> {
    inner: &'a mut T,
    flag: Option<&'a AtomicBool>,
}

impl<'a, T: ?Sized> Cancellable<'a, T> {
    pub fn new(inner: &'a mut T, flag: Option<&'a AtomicBool>) -> Self {
        Self { inner, flag }
    }

    fn check(&self) -> io::Result<()> {
        if is_cancelled(self.flag) {
            return Err(io::Error::other("operation cancelled"));
        }
        Ok(())
    }
}

impl<T: Write + ?Sized> Write for Cancellable<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        let n = buf.len().min(STEP_SIZE);
        self.inner.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Read + ?Sized> Read for Cancellable<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        let n = buf.len().min(STEP_SIZE);
        self.inner.read(&mut buf[..n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_until_cancelled() {
        let flag = AtomicBool::new(false);
        let mut out = Vec::new();
        let mut writer = Cancellable::new(&mut out, Some(&flag));

        writer.write_all(b"head").unwrap();
        flag.store(true, Ordering::Relaxed);
        assert!(writer.write_all(b"tail").is_err());
        assert_eq!(out, b"head");
    }

    #[test]
    fn test_large_write_is_split() {
        let mut out = Vec::new();
        let mut writer = Cancellable::new(&mut out, None);
        let data = vec![1u8; STEP_SIZE + 10];

        assert_eq!(writer.write(&data).unwrap(), STEP_SIZE);
        writer.write_all(&data[STEP_SIZE..]).unwrap();
        assert_eq!(out.len(), STEP_SIZE + 10);
    }

    #[test]
    fn test_reader_stops_when_cancelled() {
        let flag = AtomicBool::new(true);
        let mut source: &[u8] = b"firmware";
        let mut reader = Cancellable::new(&mut source, Some(&flag));
        let mut buf = [0u8; 4];
        assert!(reader.read(&mut buf).is_err());
        assert!(!is_cancelled(None));
    }
}
