//! Error types for bundle and security-block coding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding bundle structures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CBOR decoding failed.
    #[error("CBOR decode failed: {0}")]
    Decode(String),

    /// CBOR encoding failed.
    #[error("CBOR encode failed: {0}")]
    Encode(String),

    /// A CBOR item had an unexpected type.
    #[error("unexpected CBOR item (expected {expected})")]
    UnexpectedItem {
        /// What the decoder expected at this position.
        expected: &'static str,
    },

    /// A CBOR array was shorter than the structure requires.
    #[error("truncated {structure} (expected at least {expected} items, got {got})")]
    TruncatedArray {
        /// The structure being decoded.
        structure: &'static str,
        /// Minimum number of items required.
        expected: usize,
        /// Number of items present.
        got: usize,
    },

    /// The primary block carries an unsupported protocol version.
    #[error("unsupported bundle protocol version {got} (expected 7)")]
    UnsupportedVersion {
        /// Version number found on the wire.
        got: u64,
    },

    /// An EID used a scheme other than ipn.
    #[error("unsupported EID scheme {got} (expected ipn = 2)")]
    UnsupportedScheme {
        /// Scheme number found on the wire.
        got: u64,
    },

    /// Unknown CRC type code.
    #[error("unknown CRC type code {got}")]
    UnknownCrcType {
        /// CRC type code found on the wire.
        got: u64,
    },

    /// A block CRC did not match its contents.
    #[error("CRC mismatch on block {block_number}")]
    CrcMismatch {
        /// Number of the corrupt block.
        block_number: u64,
    },

    /// An integer did not fit the target width.
    #[error("integer out of range for {field}")]
    IntegerOutOfRange {
        /// The field being decoded.
        field: &'static str,
    },
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
