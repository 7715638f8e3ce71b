//! BPv7 bundle view and BPSec wire structures.
//!
//! This crate is the byte-level foundation for the policy engine: the
//! primary/canonical block model with its deterministic CBOR encoding
//! (RFC 9171), block-level CRCs, and the Abstract Security Block structure
//! shared by BIB and BCB (RFC 9172/9173). It performs no cryptography and
//! holds no policy.

#![forbid(unsafe_code)]

mod asb;
mod block;
mod bundle;
mod cbor;
mod crc;
mod error;

pub use asb::{
    AbstractSecurityBlock, AsbValue, ScopeFlags, AES_VARIANT_A128GCM, AES_VARIANT_A256GCM,
    BCB_PARAM_AAD_SCOPE_FLAGS, BCB_PARAM_AES_VARIANT, BCB_PARAM_IV, BCB_RESULT_AUTH_TAG,
    BCB_RESULT_TARGET_IV, BIB_PARAM_INTEGRITY_SCOPE_FLAGS, BIB_PARAM_SHA_VARIANT, BIB_RESULT_HMAC,
    SECURITY_CONTEXT_BCB_AES_GCM, SECURITY_CONTEXT_BIB_HMAC_SHA2, SHA_VARIANT_HMAC_256,
    SHA_VARIANT_HMAC_384, SHA_VARIANT_HMAC_512,
};
pub use block::{
    BlockControlFlags, BundleControlFlags, CanonicalBlock, CreationTimestamp, PrimaryBlock,
    BLOCK_TYPE_BCB, BLOCK_TYPE_BIB, BLOCK_TYPE_PAYLOAD,
};
pub use bundle::{BlockView, BundleView};
pub use crc::CrcType;
pub use error::{CodecError, CodecResult};
