use crate::error::{CoreError, Result};

pub const MIB: u64 = 1024 * 1024;

/// A maximal run of adjacent dense windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateRun {
    pub start: u64,
    pub len: u64,
}

impl CandidateRun {
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The `(offset, length)` region chosen as the embedded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadSegment {
    pub offset: u64,
    pub length: u64,
}

impl PayloadSegment {
    /// Builds a segment, checking `length > 0` and `offset + length <= buffer_len`.
    pub fn new(offset: u64, length: u64, buffer_len: u64) -> Result<Self> {
        if length == 0 {
            return Err(CoreError::InvalidInput(
                "payload segment must not be empty".into(),
            ));
        }
        let end = offset.checked_add(length).ok_or(CoreError::OutOfBounds {
            offset,
            max: buffer_len,
        })?;
        if end > buffer_len {
            return Err(CoreError::OutOfBounds {
                offset: end,
                max: buffer_len,
            });
        }
        Ok(Self { offset, length })
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Borrows the segment's bytes out of the buffer it was located in.
    pub fn slice<'a>(&self, buffer: &'a [u8]) -> Result<&'a [u8]> {
        let start = usize::try_from(self.offset).map_err(|_| CoreError::OutOfBounds {
            offset: self.offset,
            max: buffer.len() as u64,
        })?;
        let end = usize::try_from(self.end()).map_err(|_| CoreError::OutOfBounds {
            offset: self.end(),
            max: buffer.len() as u64,
        })?;
        buffer.get(start..end).ok_or(CoreError::OutOfBounds {
            offset: self.end(),
            max: buffer.len() as u64,
        })
    }
}

impl From<CandidateRun> for PayloadSegment {
    fn from(run: CandidateRun) -> Self {
        Self {
            offset: run.start,
            length: run.len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    Detected,
    Fallback,
}

impl DetectionKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of a locator scan.
///
/// `Fallback` carries the quarter/half guess used when no dense run reaches
/// the minimum size; it is a best guess, not a validated detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detection {
    Detected(PayloadSegment),
    Fallback(PayloadSegment),
}

impl Detection {
    #[inline]
    #[must_use]
    pub const fn segment(&self) -> PayloadSegment {
        match self {
            Self::Detected(s) | Self::Fallback(s) => *s,
        }
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> DetectionKind {
        match self {
            Self::Detected(_) => DetectionKind::Detected,
            Self::Fallback(_) => DetectionKind::Fallback,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_confident(&self) -> bool {
        matches!(self, Self::Detected(_))
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.segment().offset
    }

    #[inline]
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.segment().length
    }
}
