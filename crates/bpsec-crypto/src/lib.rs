//! Cryptographic primitives for the BPSec security contexts.
//!
//! The policy engine abstracts its algorithms behind a small capability set:
//! `seal`/`open` for confidentiality (AES-GCM, RFC 9173 BCB-AES-GCM) and
//! `sign`/`verify` for integrity (HMAC-SHA2, RFC 9173 BIB-HMAC-SHA2). This
//! crate implements those capabilities plus raw key-file loading. It knows
//! nothing about bundles, blocks, or policies.

#![forbid(unsafe_code)]

mod error;
mod gcm;
mod key;
mod mac;

pub use error::{CryptoError, CryptoResult};
pub use gcm::{aes_gcm_open_in_place, aes_gcm_seal_in_place, generate_iv, AesVariant, GCM_TAG_SIZE};
pub use key::KeyMaterial;
pub use mac::{hmac_sha_sign, hmac_sha_verify, ShaVariant};
