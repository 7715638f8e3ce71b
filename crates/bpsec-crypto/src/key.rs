//! Raw key material loaded from operator-provided key files.

use std::path::Path;

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Secret key bytes with zeroize-on-drop semantics.
///
/// BPSec key files are raw bytes with no header; the expected length is
/// fixed by the security context that references the file. Keys are loaded
/// eagerly at configuration time and shared read-only afterwards.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: Zeroizing<Vec<u8>>,
}

impl KeyMaterial {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Load a key file, optionally enforcing an exact byte length.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyFileRead` if the file cannot be read and
    /// `CryptoError::InvalidKeyLength` if `expected_len` is given and does
    /// not match.
    pub fn load(path: &Path, expected_len: Option<usize>) -> CryptoResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| CryptoError::KeyFileRead {
            path: path.to_owned(),
            source,
        })?;
        if let Some(expected) = expected_len {
            if bytes.len() != expected {
                return Err(CryptoError::InvalidKeyLength {
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        Ok(Self::from_bytes(bytes))
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
