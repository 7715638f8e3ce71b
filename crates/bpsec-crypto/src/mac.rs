//! HMAC-SHA2 signing and verification for BIB integrity operations.
//!
//! BIB-HMAC-SHA2 (RFC 9173) admits the HMAC 256/256, 384/384 and 512/512
//! variants. Verification uses constant-time comparison.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};

/// SHA-2 variant selecting the HMAC truncation-free output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaVariant {
    /// HMAC 256/256 (32-byte MAC).
    Sha256,
    /// HMAC 384/384 (48-byte MAC).
    Sha384,
    /// HMAC 512/512 (64-byte MAC).
    Sha512,
}

impl ShaVariant {
    /// MAC output length in bytes.
    #[must_use]
    pub const fn mac_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Compute the HMAC of `message` under `key`.
#[must_use]
pub fn hmac_sha_sign(variant: ShaVariant, key: &[u8], message: &[u8]) -> Vec<u8> {
    match variant {
        ShaVariant::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .expect("HMAC accepts keys of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        ShaVariant::Sha384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(key)
                .expect("HMAC accepts keys of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        ShaVariant::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key)
                .expect("HMAC accepts keys of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Verify an HMAC in constant time.
///
/// # Errors
///
/// Returns `CryptoError::MacVerifyFailed` if the MAC does not match.
pub fn hmac_sha_verify(
    variant: ShaVariant,
    key: &[u8],
    message: &[u8],
    mac: &[u8],
) -> CryptoResult<()> {
    let computed = hmac_sha_sign(variant, key, message);
    if computed.len() == mac.len() && bool::from(computed.ct_eq(mac)) {
        Ok(())
    } else {
        Err(CryptoError::MacVerifyFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        for variant in [ShaVariant::Sha256, ShaVariant::Sha384, ShaVariant::Sha512] {
            let key = b"integrity key";
            let message = b"block contents";
            let mac = hmac_sha_sign(variant, key, message);
            assert_eq!(mac.len(), variant.mac_len());
            hmac_sha_verify(variant, key, message, &mac).unwrap();
        }
    }

    #[test]
    fn wrong_message_fails() {
        let mac = hmac_sha_sign(ShaVariant::Sha256, b"key", b"message 1");
        assert!(matches!(
            hmac_sha_verify(ShaVariant::Sha256, b"key", b"message 2", &mac),
            Err(CryptoError::MacVerifyFailed)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let mac = hmac_sha_sign(ShaVariant::Sha384, b"key 1", b"message");
        assert!(matches!(
            hmac_sha_verify(ShaVariant::Sha384, b"key 2", b"message", &mac),
            Err(CryptoError::MacVerifyFailed)
        ));
    }

    #[test]
    fn truncated_mac_fails() {
        let mac = hmac_sha_sign(ShaVariant::Sha512, b"key", b"message");
        assert!(hmac_sha_verify(ShaVariant::Sha512, b"key", b"message", &mac[..32]).is_err());
    }

    #[test]
    fn deterministic() {
        let a = hmac_sha_sign(ShaVariant::Sha256, b"key", b"message");
        let b = hmac_sha_sign(ShaVariant::Sha256, b"key", b"message");
        assert_eq!(a, b);
    }

    #[test]
    fn golden_vector_rfc4231_case1() {
        // RFC 4231 test case 1 (HMAC-SHA-256).
        let key = [0x0b; 20];
        let mac = hmac_sha_sign(ShaVariant::Sha256, &key, b"Hi There");
        assert_eq!(
            hex::encode(mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }
}
