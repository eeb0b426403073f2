//! Error types for comcrypt operations.
//!
//! The variants fall into four classes:
//!
//! - **Capacity**: [`ComcryptError::BufferTooSmall`]. The caller may grow the
//!   output buffer and retry the same call.
//! - **Malformed input**: [`ComcryptError::MalformedBlock`] and
//!   [`ComcryptError::UnsupportedVersion`]. Fatal to the current stream.
//! - **Incomplete input**: [`ComcryptError::IncompleteBlock`] is used inside the
//!   decoder to ask for more bytes; [`ComcryptError::UnexpectedEndOfStream`] is
//!   what a caller sees when no more bytes will arrive.
//! - **Configuration**: [`ComcryptError::InvalidKey`] and
//!   [`ComcryptError::InvalidParameter`].

use thiserror::Error;

/// The main error type for comcrypt operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComcryptError {
    /// Output buffer too small for the operation.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Number of bytes needed.
        needed: usize,
        /// Number of bytes available.
        available: usize,
    },

    /// A block record ends before all of its fields are present.
    #[error("Incomplete block: expected {expected} more bytes")]
    IncompleteBlock {
        /// Number of bytes missing at the point the read failed.
        expected: usize,
    },

    /// A block record is internally inconsistent.
    #[error("Malformed block at offset {offset}: {message}")]
    MalformedBlock {
        /// Byte offset (relative to the block start) where it was detected.
        offset: usize,
        /// Description of the inconsistency.
        message: String,
    },

    /// The stream header carries an unknown version.
    #[error("Unsupported stream version: expected {expected:#010x}, found {found:#010x}")]
    UnsupportedVersion {
        /// Version this implementation speaks.
        expected: u32,
        /// Version found in the header.
        found: u32,
    },

    /// The caller declared end of stream while bytes were still pending.
    #[error("Unexpected end of stream: {pending} bytes of an incomplete record buffered")]
    UnexpectedEndOfStream {
        /// Number of buffered bytes that never formed a complete record.
        pending: usize,
    },

    /// Key rejected by the key scheduler.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Why the key was rejected.
        message: String,
    },

    /// Codec parameter outside its allowed range.
    #[error("Invalid parameter {name}: {value} (allowed {min}..={max})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: u32,
        /// Smallest allowed value.
        min: u32,
        /// Largest allowed value.
        max: u32,
    },
}

/// Result type alias for comcrypt operations.
pub type Result<T> = std::result::Result<T, ComcryptError>;

impl ComcryptError {
    /// Create a buffer too small error.
    pub fn buffer_too_small(needed: usize, available: usize) -> Self {
        Self::BufferTooSmall { needed, available }
    }

    /// Create an incomplete block error.
    pub fn incomplete(expected: usize) -> Self {
        Self::IncompleteBlock { expected }
    }

    /// Create a malformed block error.
    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Self::MalformedBlock {
            offset,
            message: message.into(),
        }
    }

    /// Create an unsupported version error.
    pub fn unsupported_version(expected: u32, found: u32) -> Self {
        Self::UnsupportedVersion { expected, found }
    }

    /// Create an unexpected end of stream error.
    pub fn unexpected_end_of_stream(pending: usize) -> Self {
        Self::UnexpectedEndOfStream { pending }
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: &'static str, value: u32, min: u32, max: u32) -> Self {
        Self::InvalidParameter {
            name,
            value,
            min,
            max,
        }
    }

    /// Whether retrying the same call with a larger output buffer can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BufferTooSmall { .. })
    }

    /// Whether this is the decoder's request for more input.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteBlock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ComcryptError::buffer_too_small(300, 10);
        assert!(err.to_string().contains("need 300 bytes"));

        let err = ComcryptError::malformed(4, "bad magic");
        assert!(err.to_string().contains("offset 4"));
        assert!(err.to_string().contains("bad magic"));

        let err = ComcryptError::unsupported_version(0x4343_0003, 0x1);
        assert!(err.to_string().contains("0x43430003"));
    }

    #[test]
    fn test_error_classes() {
        assert!(ComcryptError::buffer_too_small(1, 0).is_recoverable());
        assert!(!ComcryptError::malformed(0, "x").is_recoverable());
        assert!(ComcryptError::incomplete(3).is_incomplete());
        assert!(!ComcryptError::unexpected_end_of_stream(3).is_incomplete());
    }
}
