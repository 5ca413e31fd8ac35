//! Codec error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Envelope exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// No codec is registered for the envelope's version.
    #[error("unsupported codec version: {version}")]
    UnsupportedVersion {
        /// The unknown version.
        version: u32,
    },

    /// The target version cannot express this command or result.
    #[error("'{kind}' cannot be encoded for version {version}")]
    UnsupportedForVersion {
        /// Command or result name.
        kind: &'static str,
        /// Target version.
        version: u32,
    },

    /// Payload checksum does not match the envelope header.
    #[error("checksum mismatch: header {expected:#010x}, payload {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// Insufficient data to decode.
    #[error("insufficient data: need {need} bytes, have {have}")]
    InsufficientData {
        /// Bytes needed.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Unknown payload tag.
    #[error("unknown payload tag: {tag:#04x}")]
    UnknownTag {
        /// The unknown tag value.
        tag: u8,
    },

    /// A field holds a value outside its domain.
    #[error("invalid value {value} for field '{field}'")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending byte.
        value: u8,
    },

    /// Bytes were left over after the payload was decoded.
    #[error("{count} trailing bytes after payload")]
    TrailingBytes {
        /// Leftover byte count.
        count: usize,
    },

    /// A command was expected but a result was decoded, or vice versa.
    #[error("expected a {expected} payload")]
    UnexpectedPayload {
        /// What the caller asked for.
        expected: &'static str,
    },
}
