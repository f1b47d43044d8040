//! Segment locator.
//!
//! Finds the most probable embedded payload in an opaque firmware image by
//! looking for the longest run of adjacent "dense" windows, i.e. windows
//! whose share of non-zero bytes is above a threshold. Nothing in the image
//! is trusted: no headers, no length fields, no container format.
//!
//! When no run reaches the minimum size the locator falls back to the middle
//! half of the image and says so through [`Detection::Fallback`].

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, Result};
use crate::statistics::{window_stats, windows, WindowStats};
use crate::traits::BlockSource;
use crate::types::{CandidateRun, Detection, PayloadSegment, MIB};

pub const DEFAULT_WINDOW_SIZE: usize = MIB as usize;
pub const DEFAULT_DENSITY_THRESHOLD: f64 = 0.30;
pub const DEFAULT_MIN_RUN_SIZE: u64 = 100 * MIB;

#[derive(Debug, Clone, PartialEq)]
pub struct LocatorConfig {
    pub window_size: usize,
    pub density_threshold: f64,
    pub min_run_size: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            density_threshold: DEFAULT_DENSITY_THRESHOLD,
            min_run_size: DEFAULT_MIN_RUN_SIZE,
        }
    }
}

impl LocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(CoreError::InvalidInput("window size must be non-zero".into()));
        }
        if !(0.0..1.0).contains(&self.density_threshold) {
            return Err(CoreError::InvalidInput(format!(
                "density threshold must be in [0, 1), got {}",
                self.density_threshold
            )));
        }
        if self.min_run_size == 0 {
            return Err(CoreError::InvalidInput(
                "minimum run size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Running-maximum state over a sequence of windows.
///
/// Holds only the open run and the best closed run, so it can be fed from a
/// stream without keeping earlier windows around.
#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    current: Option<CandidateRun>,
    best: CandidateRun,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, window: &WindowStats) {
        if !window.dense {
            self.close();
            return;
        }
        match &mut self.current {
            Some(run) => run.len += window.len as u64,
            None => {
                self.current = Some(CandidateRun {
                    start: window.offset,
                    len: window.len as u64,
                })
            }
        }
    }

    pub fn finish(mut self) -> CandidateRun {
        self.close();
        self.best
    }

    fn close(&mut self) {
        if let Some(run) = self.current.take() {
            // Strictly greater: the earliest of equally long runs wins.
            if run.len > self.best.len {
                self.best = run;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentLocator {
    config: LocatorConfig,
}

impl SegmentLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LocatorConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Scans a fully resident buffer.
    pub fn locate(&self, buffer: &[u8]) -> Result<Detection> {
        if buffer.is_empty() {
            return Err(CoreError::InvalidInput("firmware buffer is empty".into()));
        }
        self.config.validate()?;

        let mut tracker = RunTracker::new();
        for window in windows(
            buffer,
            self.config.window_size,
            self.config.density_threshold,
        ) {
            tracker.push(&window);
        }
        self.decide(tracker.finish(), buffer.len() as u64)
    }

    /// Scans a source one window at a time with constant memory.
    ///
    /// `cancel` is polled before every window; once it reads `true` the scan
    /// stops with [`CoreError::Cancelled`]. `on_window` sees every window's
    /// statistics in order.
    pub fn locate_source<S, F>(
        &self,
        source: &mut S,
        cancel: Option<&AtomicBool>,
        mut on_window: F,
    ) -> Result<Detection>
    where
        S: BlockSource + ?Sized,
        F: FnMut(&WindowStats),
    {
        self.config.validate()?;
        let size = source.size();
        if size == 0 {
            return Err(CoreError::InvalidInput("firmware source is empty".into()));
        }

        let window_size = self.config.window_size;
        // A window never holds more than the whole source.
        let buffer_len = usize::try_from(size).map_or(window_size, |s| s.min(window_size));
        let mut buffer = vec![0u8; buffer_len];
        let mut tracker = RunTracker::new();
        let mut offset = 0u64;

        while offset < size {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(CoreError::Cancelled);
            }
            let n = source.read_full(offset, &mut buffer)?;
            if n == 0 {
                break;
            }
            let window = window_stats(
                offset,
                &buffer[..n],
                window_size,
                self.config.density_threshold,
            );
            tracker.push(&window);
            on_window(&window);
            offset += n as u64;
        }

        if offset == 0 {
            return Err(CoreError::InvalidInput(
                "firmware source returned no data".into(),
            ));
        }
        self.decide(tracker.finish(), offset)
    }

    fn decide(&self, best: CandidateRun, buffer_len: u64) -> Result<Detection> {
        if !best.is_empty() && best.len >= self.config.min_run_size {
            return Ok(Detection::Detected(PayloadSegment::from(best)));
        }
        let offset = buffer_len / 4;
        let length = buffer_len / 2;
        if length == 0 {
            return Err(CoreError::InvalidInput(format!(
                "buffer of {buffer_len} bytes is too small for a fallback segment"
            )));
        }
        PayloadSegment::new(offset, length, buffer_len).map(Detection::Fallback)
    }
}

/// Locates the payload with the default thresholds.
pub fn locate(buffer: &[u8]) -> Result<Detection> {
    SegmentLocator::new().locate(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> LocatorConfig {
        LocatorConfig {
            window_size: 16,
            density_threshold: 0.3,
            min_run_size: 64,
        }
    }

    fn image(len: usize, dense: &[(usize, usize)]) -> Vec<u8> {
        let mut data = vec![0u8; len];
        for &(start, end) in dense {
            for (i, byte) in data[start..end].iter_mut().enumerate() {
                *byte = (i % 251) as u8 + 1;
            }
        }
        data
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        assert!(matches!(locate(&[]), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_single_byte_buffer_is_undersized() {
        let locator = SegmentLocator::with_config(small_config());
        assert!(matches!(
            locator.locate(&[0xFF]),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_all_zero_falls_back() {
        let locator = SegmentLocator::with_config(small_config());
        let data = vec![0u8; 400];
        let detection = locator.locate(&data).unwrap();
        assert_eq!(
            detection,
            Detection::Fallback(PayloadSegment {
                offset: 100,
                length: 200
            })
        );
    }

    #[test]
    fn test_flanked_run_is_detected() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(320, &[(96, 192)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(
            detection,
            Detection::Detected(PayloadSegment {
                offset: 96,
                length: 96
            })
        );
    }

    #[test]
    fn test_run_below_minimum_falls_back() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(320, &[(96, 144)]);
        let detection = locator.locate(&data).unwrap();
        assert!(!detection.is_confident());
        assert_eq!(detection.offset(), 80);
        assert_eq!(detection.length(), 160);
    }

    #[test]
    fn test_run_at_exact_minimum_is_detected() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(256, &[(32, 96)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection, Detection::Detected(PayloadSegment { offset: 32, length: 64 }));
    }

    #[test]
    fn test_equal_runs_keep_earliest() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(400, &[(32, 112), (208, 288)]);
        for _ in 0..3 {
            let detection = locator.locate(&data).unwrap();
            assert_eq!(detection.segment(), PayloadSegment { offset: 32, length: 80 });
        }
    }

    #[test]
    fn test_longer_later_run_wins() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(400, &[(32, 112), (208, 320)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection.segment(), PayloadSegment { offset: 208, length: 112 });
    }

    #[test]
    fn test_run_open_at_end_is_considered() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(200, &[(96, 200)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection, Detection::Detected(PayloadSegment { offset: 96, length: 104 }));

        // A 4-byte tail stays under 30% of a full window and is not dense.
        let data = image(196, &[(96, 196)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection, Detection::Detected(PayloadSegment { offset: 96, length: 96 }));

        let data = image(192, &[(96, 192)]);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection, Detection::Detected(PayloadSegment { offset: 96, length: 96 }));
    }

    #[test]
    fn test_sparse_window_breaks_run() {
        let locator = SegmentLocator::with_config(small_config());
        let mut data = image(320, &[(0, 320)]);
        // Leave 4 non-zero bytes in [128, 144): below the threshold.
        data[132..144].fill(0);
        let detection = locator.locate(&data).unwrap();
        assert_eq!(detection.segment(), PayloadSegment { offset: 144, length: 176 });
    }

    #[test]
    fn test_streaming_matches_resident_scan() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(500, &[(16, 64), (128, 300), (320, 480)]);

        let resident = locator.locate(&data).unwrap();
        let mut source: &[u8] = &data;
        let mut seen = 0usize;
        let streamed = locator
            .locate_source(&mut source, None, |_| seen += 1)
            .unwrap();

        assert_eq!(resident, streamed);
        assert_eq!(seen, 32);
    }

    #[test]
    fn test_streaming_honours_cancel() {
        let locator = SegmentLocator::with_config(small_config());
        let data = image(256, &[(0, 256)]);
        let cancel = AtomicBool::new(true);
        let mut source: &[u8] = &data;
        let result = locator.locate_source(&mut source, Some(&cancel), |_| {});
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = [
            LocatorConfig {
                window_size: 0,
                ..small_config()
            },
            LocatorConfig {
                density_threshold: 1.0,
                ..small_config()
            },
            LocatorConfig {
                density_threshold: -0.1,
                ..small_config()
            },
            LocatorConfig {
                min_run_size: 0,
                ..small_config()
            },
        ];
        for config in bad {
            let locator = SegmentLocator::with_config(config);
            assert!(matches!(
                locator.locate(&[1, 2, 3, 4]),
                Err(CoreError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_tracker_closes_open_run_on_finish() {
        let mut tracker = RunTracker::new();
        let window = |offset, dense| WindowStats {
            offset,
            len: 16,
            non_zero: if dense { 16 } else { 0 },
            dense,
        };
        tracker.push(&window(0, true));
        tracker.push(&window(16, false));
        tracker.push(&window(32, true));
        tracker.push(&window(48, true));
        assert_eq!(tracker.finish(), CandidateRun { start: 32, len: 32 });
    }

    #[test]
    fn test_window_larger_than_source() {
        let locator = SegmentLocator::with_config(LocatorConfig {
            window_size: usize::MAX / 2,
            ..small_config()
        });
        let data = [7u8; 10];

        let resident = locator.locate(&data).unwrap();
        let mut source: &[u8] = &data;
        let mut seen = Vec::new();
        let streamed = locator
            .locate_source(&mut source, None, |w| seen.push(*w))
            .unwrap();

        assert_eq!(streamed, resident);
        assert_eq!(
            streamed,
            Detection::Fallback(PayloadSegment {
                offset: 2,
                length: 5
            })
        );
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len, 10);
        assert!(!seen[0].dense);
    }
}
