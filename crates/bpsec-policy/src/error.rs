//! Error types for policy loading and outgoing security processing.
//!
//! Load-time errors abort the whole load and leave no partial state behind.
//! Incoming-path failures are never surfaced as errors; they are routed
//! through security failure event sets and collapse into the
//! accept-or-drop disposition.

use bpsec_codec::CodecError;
use bpsec_config::ConfigError;
use bpsec_crypto::CryptoError;
use thiserror::Error;

/// Errors that abort a configuration load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The configuration record itself was rejected.
    #[error("configuration rejected")]
    Config(#[from] ConfigError),

    /// A rule pattern failed to parse when inserted into the store.
    #[error("rule {rule_id}: pattern `{pattern}` rejected by the policy store")]
    RulePattern {
        /// Operator-assigned rule id.
        rule_id: u64,
        /// The offending pattern.
        pattern: String,
    },

    /// Two rules expanded to the same `(patterns, role)` key.
    #[error("rule {rule_id}: duplicate policy for `{security_source}` `{bundle_source}` `{bundle_final_destination}` ({role})")]
    DuplicateRule {
        /// Operator-assigned rule id.
        rule_id: u64,
        /// Security source pattern.
        security_source: String,
        /// Bundle source pattern.
        bundle_source: String,
        /// Bundle final destination pattern.
        bundle_final_destination: String,
        /// Policy role name.
        role: &'static str,
    },

    /// A rule references an unknown event set or security context.
    #[error("rule {rule_id}: unresolved reference `{name}`")]
    Resolve {
        /// Operator-assigned rule id.
        rule_id: u64,
        /// The dangling name.
        name: String,
    },

    /// Key material could not be loaded or has the wrong length.
    #[error("rule {rule_id}: key load failed")]
    KeyLoad {
        /// Operator-assigned rule id.
        rule_id: u64,
        /// Underlying crypto error.
        #[source]
        source: CryptoError,
    },
}

/// Errors that fail an outgoing security operation; the bundle must not be
/// emitted when one is returned.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A cryptographic operation failed.
    #[error("security operation failed on block {block_number}")]
    Crypto {
        /// Target block number being protected.
        block_number: u64,
        /// Underlying crypto error.
        #[source]
        source: CryptoError,
    },

    /// Bundle or security block encoding failed.
    #[error("security block encoding failed")]
    Codec(#[from] CodecError),
}
