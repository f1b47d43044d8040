use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Offset {offset} is out of bounds (max: {max})")]
    OutOfBounds { offset: u64, max: u64 },

    #[error("Marker block not found")]
    MarkerNotFound,

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_is_reported_once() {
        let err = CoreError::from(Error::new(ErrorKind::NotFound, "digicap.dav missing"));

        assert_eq!(err.to_string(), "I/O error");
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("digicap.dav missing"));
    }
}
