//! Policies and their security operation payloads.

use std::sync::Arc;

use bpsec_codec::{CrcType, ScopeFlags};
use bpsec_crypto::{AesVariant, KeyMaterial, ShaVariant};

use crate::events::EventSetHandle;

/// Roles a policy can apply at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BpSecRole {
    /// Creates security blocks for departing bundles.
    Source,
    /// Checks security operations on transiting bundles and forwards.
    Verifier,
    /// Checks, strips and consumes security operations at the destination.
    Acceptor,
}

/// Number of policy roles; sizes the per-role slots in store terminals and
/// processing-context caches.
pub(crate) const ROLE_COUNT: usize = 3;

impl BpSecRole {
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Source => 0,
            Self::Verifier => 1,
            Self::Acceptor => 2,
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Verifier => "verifier",
            Self::Acceptor => "acceptor",
        }
    }
}

impl From<bpsec_config::SecurityRoleConfig> for BpSecRole {
    fn from(role: bpsec_config::SecurityRoleConfig) -> Self {
        match role {
            bpsec_config::SecurityRoleConfig::Source => Self::Source,
            bpsec_config::SecurityRoleConfig::Verifier => Self::Verifier,
            bpsec_config::SecurityRoleConfig::Acceptor => Self::Acceptor,
        }
    }
}

/// Resolved parameters of a confidentiality (BCB) operation.
#[derive(Debug, Clone)]
pub struct BcbParams {
    /// Configured AES variant (used when creating security blocks).
    pub aes_variant: AesVariant,
    /// Configured IV length in bytes (12 or 16).
    pub iv_len: usize,
    /// AAD scope flags.
    pub scope_flags: ScopeFlags,
    /// CRC type on emitted security blocks.
    pub crc_type: CrcType,
    /// Loaded key material, shared read-only.
    pub key: Arc<KeyMaterial>,
}

/// Resolved parameters of an integrity (BIB) operation.
#[derive(Debug, Clone)]
pub struct BibParams {
    /// Configured SHA variant (used when creating security blocks).
    pub sha_variant: ShaVariant,
    /// MAC input scope flags.
    pub scope_flags: ScopeFlags,
    /// CRC type on emitted security blocks.
    pub crc_type: CrcType,
    /// Loaded key material, shared read-only.
    pub key: Arc<KeyMaterial>,
}

/// The security operation a policy performs.
#[derive(Debug, Clone)]
pub enum SecurityOperation {
    /// BCB confidentiality.
    Confidentiality(BcbParams),
    /// BIB integrity.
    Integrity(BibParams),
}

impl SecurityOperation {
    /// Key material of either operation kind.
    #[must_use]
    pub fn key(&self) -> &KeyMaterial {
        match self {
            Self::Confidentiality(params) => &params.key,
            Self::Integrity(params) => &params.key,
        }
    }
}

/// A stored security policy.
///
/// Policies are created by the store, populated by the loader, and immutable
/// once the engine is published. Processors borrow them for the duration of
/// one bundle.
#[derive(Debug)]
pub struct BpSecPolicy {
    /// Role this policy applies at.
    pub role: BpSecRole,
    /// Operator-assigned rule id, for diagnostics.
    pub rule_id: u64,
    /// Operator description.
    pub description: String,
    /// Block type codes a source-role policy protects.
    pub target_block_types: Vec<u8>,
    /// The resolved security operation; absent until the loader fills it.
    pub operation: Option<SecurityOperation>,
    /// Failure event set applied by this policy.
    pub event_set: Option<EventSetHandle>,
}

impl BpSecPolicy {
    pub(crate) fn new(role: BpSecRole) -> Self {
        Self {
            role,
            rule_id: 0,
            description: String::new(),
            target_block_types: Vec::new(),
            operation: None,
            event_set: None,
        }
    }
}

/// Stable handle to a stored policy.
///
/// Handles index the store's append-only arena; they remain valid for the
/// lifetime of the store that issued them and are what search caches hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyHandle(pub(crate) u32);
