//! The security context registry: named algorithm bindings plus parameter
//! schema validation and eager key loading.
//!
//! Two contexts are built in, matching the RFC 9173 registrations: `aesGcm`
//! (BCB-AES-GCM) and `hmacSha` (BIB-HMAC-SHA2). Resolving a policy rule
//! validates its parameters against the context's fixed schema, loads the
//! key file, and yields the policy's `SecurityOperation` payload.
//!
//! Roles other than the security source configure only the key file; the
//! algorithm variant and scope flags they verify under are taken from the
//! received security block, so key length is checked against the wire
//! variant at use time.

use std::path::Path;
use std::sync::Arc;

use bpsec_codec::{CrcType, ScopeFlags};
use bpsec_config::{ParamName, PolicyRuleConfig, SecurityContextName, SecurityServiceConfig};
use bpsec_crypto::{AesVariant, KeyMaterial, ShaVariant};

use crate::error::LoadError;
use crate::policy::{BcbParams, BibParams, BpSecRole, SecurityOperation};

const DEFAULT_AES_VARIANT: AesVariant = AesVariant::Aes256;
const DEFAULT_SHA_VARIANT: ShaVariant = ShaVariant::Sha384;
const DEFAULT_IV_LEN: usize = 12;
const DEFAULT_SCOPE_FLAGS: ScopeFlags = ScopeFlags::all();

/// Registry of named security contexts.
///
/// The recognized contexts form a closed set; the registry exists to keep
/// name resolution, parameter schemas and key loading in one place.
#[derive(Debug, Default)]
pub struct SecurityContextRegistry(());

impl SecurityContextRegistry {
    /// Create the registry with the built-in contexts.
    #[must_use]
    pub fn new() -> Self {
        Self(())
    }

    /// Whether `name` is a recognized context.
    #[must_use]
    pub fn contains(&self, name: SecurityContextName) -> bool {
        matches!(name, SecurityContextName::AesGcm | SecurityContextName::HmacSha)
    }

    /// Resolve a rule's context binding into a security operation payload.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::KeyLoad` when the key file is unreadable or has
    /// the wrong length for the configured variant, and
    /// `LoadError::Resolve` when a parameter is missing or inconsistent.
    pub fn resolve(
        &self,
        role: BpSecRole,
        rule: &PolicyRuleConfig,
    ) -> Result<SecurityOperation, LoadError> {
        let key_path = rule.key_file().ok_or_else(|| LoadError::Resolve {
            rule_id: rule.security_policy_rule_id,
            name: "keyFile".to_owned(),
        })?;

        match rule.security_service {
            SecurityServiceConfig::Confidentiality => {
                let aes_variant = match rule.param_u64(ParamName::AesVariant) {
                    Some(128) => AesVariant::Aes128,
                    Some(256) => AesVariant::Aes256,
                    None => DEFAULT_AES_VARIANT,
                    Some(_) => {
                        return Err(LoadError::Resolve {
                            rule_id: rule.security_policy_rule_id,
                            name: "aesVariant".to_owned(),
                        })
                    }
                };
                let key = self.load_key(rule, key_path, |len| match role {
                    // The source encrypts under the configured variant.
                    BpSecRole::Source => len == aes_variant.key_len(),
                    // Verifier/acceptor keys follow the wire variant.
                    _ => AesVariant::from_key_len(len).is_some(),
                })?;
                Ok(SecurityOperation::Confidentiality(BcbParams {
                    aes_variant,
                    iv_len: rule
                        .param_u64(ParamName::IvSizeBytes)
                        .map_or(DEFAULT_IV_LEN, |v| v as usize),
                    scope_flags: scope_flags(rule),
                    crc_type: crc_type(rule),
                    key,
                }))
            }
            SecurityServiceConfig::Integrity => {
                let sha_variant = match rule.param_u64(ParamName::ShaVariant) {
                    Some(256) => ShaVariant::Sha256,
                    Some(384) => ShaVariant::Sha384,
                    Some(512) => ShaVariant::Sha512,
                    None => DEFAULT_SHA_VARIANT,
                    Some(_) => {
                        return Err(LoadError::Resolve {
                            rule_id: rule.security_policy_rule_id,
                            name: "shaVariant".to_owned(),
                        })
                    }
                };
                let key = self.load_key(rule, key_path, |len| len > 0)?;
                Ok(SecurityOperation::Integrity(BibParams {
                    sha_variant,
                    scope_flags: scope_flags(rule),
                    crc_type: crc_type(rule),
                    key,
                }))
            }
        }
    }

    fn load_key(
        &self,
        rule: &PolicyRuleConfig,
        path: &str,
        length_ok: impl Fn(usize) -> bool,
    ) -> Result<Arc<KeyMaterial>, LoadError> {
        let key = KeyMaterial::load(Path::new(path), None).map_err(|source| {
            LoadError::KeyLoad {
                rule_id: rule.security_policy_rule_id,
                source,
            }
        })?;
        if !length_ok(key.len()) {
            return Err(LoadError::KeyLoad {
                rule_id: rule.security_policy_rule_id,
                source: bpsec_crypto::CryptoError::InvalidKeyLength {
                    expected: 0,
                    actual: key.len(),
                },
            });
        }
        Ok(Arc::new(key))
    }
}

fn scope_flags(rule: &PolicyRuleConfig) -> ScopeFlags {
    rule.param_u64(ParamName::ScopeFlags)
        .map_or(DEFAULT_SCOPE_FLAGS, ScopeFlags::from_bits_truncate)
}

fn crc_type(rule: &PolicyRuleConfig) -> CrcType {
    match rule.param_u64(ParamName::SecurityBlockCrc) {
        Some(16) => CrcType::Crc16X25,
        Some(32) => CrcType::Crc32Castagnoli,
        _ => CrcType::None,
    }
}
