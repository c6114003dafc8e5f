//! Error types for binary serialization.

use thiserror::Error;

/// Result type for serialization operations.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Errors raised while decoding a byte stream.
///
/// Encoding cannot fail: [`crate::BinaryWriter`] grows its buffer as needed.
/// Every decoding failure is a format error; callers that treat a stream as
/// optional (e.g. a persisted checkpoint) map any of these to "no data".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IoError {
    /// The stream ended before the requested number of bytes was available.
    #[error("unexpected end of stream: needed {needed} bytes, {available} available")]
    EndOfStream { needed: usize, available: usize },

    /// A decoded value violates the format (bad tag, bad boolean, bad count).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A var-int exceeded the caller-supplied bound.
    #[error("value {value} exceeds maximum {max}")]
    ValueOutOfRange { value: u64, max: u64 },
}

impl IoError {
    /// Convenience constructor for format violations.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        IoError::InvalidData(message.into())
    }
}
