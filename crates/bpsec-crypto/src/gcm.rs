//! AES-GCM sealing and opening for BCB confidentiality operations.
//!
//! BCB-AES-GCM (RFC 9173) admits the A128GCM and A256GCM variants with a
//! 12- or 16-byte IV. Encryption is performed in place with a detached
//! 16-byte authentication tag so that ciphertext replaces target-block data
//! without changing its length.

use aes_gcm::{
    aead::{
        consts::{U12, U16},
        AeadInPlace, KeyInit,
    },
    aes::{Aes128, Aes256},
    AesGcm, Nonce, Tag,
};

use crate::error::{CryptoError, CryptoResult};

/// AES-GCM authentication tag size (128 bits).
pub const GCM_TAG_SIZE: usize = 16;

type Aes128Gcm12 = AesGcm<Aes128, U12>;
type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm12 = AesGcm<Aes256, U12>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// AES-GCM key-size variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesVariant {
    /// A128GCM (16-byte key).
    Aes128,
    /// A256GCM (32-byte key).
    Aes256,
}

impl AesVariant {
    /// Key length in bytes for this variant.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }

    /// Select the variant whose key is `len` bytes, if any.
    #[must_use]
    pub const fn from_key_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(Self::Aes128),
            32 => Some(Self::Aes256),
            _ => None,
        }
    }
}

/// Generate a random IV of the requested length (12 or 16 bytes).
///
/// # Errors
///
/// Returns `CryptoError::InvalidIvLength` for any other length.
pub fn generate_iv(len: usize) -> CryptoResult<Vec<u8>> {
    if len != 12 && len != 16 {
        return Err(CryptoError::InvalidIvLength { actual: len });
    }
    let mut iv = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);
    Ok(iv)
}

fn check_key(variant: AesVariant, key: &[u8]) -> CryptoResult<()> {
    if key.len() == variant.key_len() {
        Ok(())
    } else {
        Err(CryptoError::InvalidKeyLength {
            expected: variant.key_len(),
            actual: key.len(),
        })
    }
}

/// Encrypt `buffer` in place, returning the detached authentication tag.
///
/// The IV must be 12 or 16 bytes; the key length must match `variant`.
///
/// # Errors
///
/// Returns an error on bad key/IV lengths or if encryption fails.
pub fn aes_gcm_seal_in_place(
    variant: AesVariant,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    buffer: &mut [u8],
) -> CryptoResult<[u8; GCM_TAG_SIZE]> {
    check_key(variant, key)?;
    let tag = match (variant, iv.len()) {
        (AesVariant::Aes128, 12) => Aes128Gcm12::new_from_slice(key)
            .map_err(|_| CryptoError::AeadEncryptFailed)?
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer),
        (AesVariant::Aes128, 16) => Aes128Gcm16::new_from_slice(key)
            .map_err(|_| CryptoError::AeadEncryptFailed)?
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer),
        (AesVariant::Aes256, 12) => Aes256Gcm12::new_from_slice(key)
            .map_err(|_| CryptoError::AeadEncryptFailed)?
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer),
        (AesVariant::Aes256, 16) => Aes256Gcm16::new_from_slice(key)
            .map_err(|_| CryptoError::AeadEncryptFailed)?
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer),
        (_, actual) => return Err(CryptoError::InvalidIvLength { actual }),
    }
    .map_err(|_| CryptoError::AeadEncryptFailed)?;
    Ok(tag.into())
}

/// Decrypt `buffer` in place, verifying the detached authentication tag.
///
/// # Errors
///
/// Returns `CryptoError::AeadDecryptFailed` on authentication failure; the
/// buffer contents are unspecified in that case and must not be used.
pub fn aes_gcm_open_in_place(
    variant: AesVariant,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
) -> CryptoResult<()> {
    check_key(variant, key)?;
    if tag.len() != GCM_TAG_SIZE {
        return Err(CryptoError::InvalidTagLength {
            expected: GCM_TAG_SIZE,
            actual: tag.len(),
        });
    }
    match (variant, iv.len()) {
        (AesVariant::Aes128, 12) => Aes128Gcm12::new_from_slice(key)
            .map_err(|_| CryptoError::AeadDecryptFailed)?
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer, Tag::from_slice(tag)),
        (AesVariant::Aes128, 16) => Aes128Gcm16::new_from_slice(key)
            .map_err(|_| CryptoError::AeadDecryptFailed)?
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer, Tag::from_slice(tag)),
        (AesVariant::Aes256, 12) => Aes256Gcm12::new_from_slice(key)
            .map_err(|_| CryptoError::AeadDecryptFailed)?
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer, Tag::from_slice(tag)),
        (AesVariant::Aes256, 16) => Aes256Gcm16::new_from_slice(key)
            .map_err(|_| CryptoError::AeadDecryptFailed)?
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer, Tag::from_slice(tag)),
        (_, actual) => return Err(CryptoError::InvalidIvLength { actual }),
    }
    .map_err(|_| CryptoError::AeadDecryptFailed)
}
