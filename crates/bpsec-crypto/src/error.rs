//! Error types for BPSec cryptographic operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material has the wrong length for the selected algorithm.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes.
        expected: usize,
        /// Actual key length provided.
        actual: usize,
    },

    /// The IV length is not admitted by the AES-GCM context.
    #[error("invalid IV length {actual} (expected 12 or 16)")]
    InvalidIvLength {
        /// Actual IV length provided.
        actual: usize,
    },

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    AeadEncryptFailed,

    /// AEAD decryption failed (authentication failure or invalid ciphertext).
    #[error("AEAD decryption failed: authentication or decryption error")]
    AeadDecryptFailed,

    /// The supplied authentication tag has the wrong length.
    #[error("invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Expected tag length in bytes.
        expected: usize,
        /// Actual tag length provided.
        actual: usize,
    },

    /// MAC verification failed.
    #[error("MAC verification failed")]
    MacVerifyFailed,

    /// A key file could not be read.
    #[error("failed to read key file `{path}`")]
    KeyFileRead {
        /// Path of the unreadable key file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
