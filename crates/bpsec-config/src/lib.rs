//! BPSec configuration record parsing and validation.
//!
//! This crate provides a strict, machine-checkable interpretation of the
//! operator-facing JSON configuration: policy rules plus named security
//! failure event sets. Parsing fails closed: unknown fields, unknown
//! enumeration values, malformed patterns, and out-of-domain parameter
//! values are all rejected before the record reaches the policy loader.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::str::FromStr;

use bpsec_eid::{EidParseError, EidPattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing or validating a configuration record.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON deserialization failed (syntax, unknown field, unknown
    /// enumeration value).
    #[error("config JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A field violated a validation rule.
    #[error("invalid `{field}`: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What went wrong.
        message: String,
    },

    /// An EID pattern failed to parse.
    #[error("invalid EID pattern `{pattern}` in `{field}`")]
    Pattern {
        /// Dotted path of the offending field.
        field: &'static str,
        /// The pattern text.
        pattern: String,
        /// Underlying parse error.
        #[source]
        source: EidParseError,
    },

    /// A rule references an event set that is not declared.
    #[error("unresolved security failure event set reference `{reference}`")]
    UnresolvedEventSet {
        /// The dangling reference.
        reference: String,
    },
}

/// Security role a policy rule applies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityRoleConfig {
    /// Security source: creates security blocks.
    Source,
    /// Verifier: checks and forwards.
    Verifier,
    /// Acceptor: checks, strips, consumes.
    Acceptor,
}

/// Security service a policy rule provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityServiceConfig {
    /// BCB confidentiality.
    Confidentiality,
    /// BIB integrity.
    Integrity,
}

/// Named security context selecting the algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityContextName {
    /// BCB-AES-GCM.
    AesGcm,
    /// BIB-HMAC-SHA2.
    HmacSha,
}

/// Recognized security context parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamName {
    /// AES key-size variant: 128 or 256.
    AesVariant,
    /// SHA variant: 256, 384 or 512.
    ShaVariant,
    /// IV length in bytes: 12 or 16.
    IvSizeBytes,
    /// Path of the raw key file.
    KeyFile,
    /// CRC on the emitted security block: 0, 16 or 32.
    SecurityBlockCrc,
    /// AAD/MAC scope flags, 0..=7.
    ScopeFlags,
}

/// A parameter value: an unsigned integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric value.
    Number(u64),
    /// Text value (key file paths).
    Text(String),
}

/// One `{paramName, value}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SecurityContextParam {
    /// Recognized parameter name.
    pub param_name: ParamName,
    /// Parameter value.
    pub value: ParamValue,
}

/// Recognized security operation event identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventIdConfig {
    /// No policy found at a verifier.
    SopMissingAtVerifier,
    /// Policy found but inconsistent at a verifier.
    SopMisconfiguredAtVerifier,
    /// No policy found at an acceptor.
    SopMissingAtAcceptor,
    /// Policy found but inconsistent at an acceptor.
    SopMisconfiguredAtAcceptor,
    /// Integrity/authentication failure at an acceptor.
    SopCorruptedAtAcceptor,
}

/// Recognized security failure actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventActionConfig {
    /// Drop the affected ASB entry.
    RemoveSecurityOperation,
    /// Remove the target block and its ASB entry.
    RemoveSecurityOperationTargetBlock,
    /// Remove every ASB entry naming the target, across all ASBs.
    RemoveAllSecurityTargetOperations,
    /// Mark the bundle undeliverable but keep processing.
    DoNotForwardBundle,
    /// Drop the bundle.
    FailBundleForwarding,
    /// Mark the bundle for retention.
    RequestBundleStorage,
    /// Emit a status report with the BPSec reason code.
    ReportReasonCode,
    /// Replace the target block's processing control flags.
    OverrideSecurityTargetBlockBpcf,
    /// Replace the security block's processing control flags.
    OverrideSopBpcf,
}

/// One `(eventId, actions)` entry of an event set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SecurityOperationEvent {
    /// Triggering event.
    pub event_id: EventIdConfig,
    /// Actions applied in declared order.
    pub actions: Vec<EventActionConfig>,
    /// Replacement flags for `overrideSecurityTargetBlockBpcf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_target_block_bpcf: Option<u64>,
    /// Replacement flags for `overrideSopBpcf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sop_bpcf: Option<u64>,
}

/// A named security failure event set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EventSetConfig {
    /// Event set name referenced by policy rules.
    pub name: String,
    /// Operator description.
    #[serde(default)]
    pub description: String,
    /// Event entries.
    pub security_operation_events: Vec<SecurityOperationEvent>,
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PolicyRuleConfig {
    /// Operator description.
    #[serde(default)]
    pub description: String,
    /// Operator-assigned rule id, used in diagnostics.
    pub security_policy_rule_id: u64,
    /// Role this rule applies at.
    pub security_role: SecurityRoleConfig,
    /// Security source pattern.
    pub security_source: String,
    /// Bundle source patterns (cross-multiplied with destinations).
    pub bundle_source: Vec<String>,
    /// Bundle final destination patterns.
    pub bundle_final_destination: Vec<String>,
    /// Block type codes targeted by a source-role rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_target_block_types: Vec<u8>,
    /// Security service provided.
    pub security_service: SecurityServiceConfig,
    /// Security context binding.
    pub security_context: SecurityContextName,
    /// Referenced failure event set.
    pub security_failure_event_set_reference: String,
    /// Context parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_context_params: Vec<SecurityContextParam>,
}

impl PolicyRuleConfig {
    /// Numeric parameter by name.
    #[must_use]
    pub fn param_u64(&self, name: ParamName) -> Option<u64> {
        self.security_context_params
            .iter()
            .find(|p| p.param_name == name)
            .and_then(|p| match &p.value {
                ParamValue::Number(v) => Some(*v),
                ParamValue::Text(_) => None,
            })
    }

    /// Text parameter by name.
    #[must_use]
    pub fn param_text(&self, name: ParamName) -> Option<&str> {
        self.security_context_params
            .iter()
            .find(|p| p.param_name == name)
            .and_then(|p| match &p.value {
                ParamValue::Number(_) => None,
                ParamValue::Text(v) => Some(v.as_str()),
            })
    }

    /// The key file path, required for every rule.
    #[must_use]
    pub fn key_file(&self) -> Option<&str> {
        self.param_text(ParamName::KeyFile)
    }
}

/// The validated top-level configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BpSecConfig {
    /// Operator-assigned configuration name.
    pub bpsec_config_name: String,
    /// Policy rules.
    #[serde(default)]
    pub policy_rules: Vec<PolicyRuleConfig>,
    /// Named failure event sets; the first declared set is the bundle-wide
    /// default.
    #[serde(default)]
    pub security_failure_event_sets: Vec<EventSetConfig>,
}

impl BpSecConfig {
    /// Parse a configuration from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails or if validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: Self = serde_json::from_str(input)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Validate the record for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bpsec_config_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "bpsecConfigName",
                message: "must not be empty".into(),
            });
        }

        let mut event_set_names = HashSet::new();
        for event_set in &self.security_failure_event_sets {
            event_set.validate()?;
            if !event_set_names.insert(event_set.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "securityFailureEventSets.name",
                    message: format!("duplicate event set `{}`", event_set.name),
                });
            }
        }

        for rule in &self.policy_rules {
            rule.validate()?;
            if !event_set_names.contains(rule.security_failure_event_set_reference.as_str()) {
                return Err(ConfigError::UnresolvedEventSet {
                    reference: rule.security_failure_event_set_reference.clone(),
                });
            }
        }
        Ok(())
    }
}

impl EventSetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "securityFailureEventSets.name",
                message: "must not be empty".into(),
            });
        }
        let mut seen = HashSet::new();
        for event in &self.security_operation_events {
            if !seen.insert(event.event_id) {
                return Err(ConfigError::Invalid {
                    field: "securityOperationEvents.eventId",
                    message: format!("duplicate event entry in `{}`", self.name),
                });
            }
            if event
                .actions
                .contains(&EventActionConfig::OverrideSecurityTargetBlockBpcf)
                && event.security_target_block_bpcf.is_none()
            {
                return Err(ConfigError::Invalid {
                    field: "securityOperationEvents.securityTargetBlockBpcf",
                    message: "required by overrideSecurityTargetBlockBpcf".into(),
                });
            }
            if event.actions.contains(&EventActionConfig::OverrideSopBpcf)
                && event.sop_bpcf.is_none()
            {
                return Err(ConfigError::Invalid {
                    field: "securityOperationEvents.sopBpcf",
                    message: "required by overrideSopBpcf".into(),
                });
            }
        }
        Ok(())
    }
}

fn check_pattern(field: &'static str, pattern: &str) -> Result<(), ConfigError> {
    EidPattern::from_str(pattern)
        .map(|_| ())
        .map_err(|source| ConfigError::Pattern {
            field,
            pattern: pattern.to_owned(),
            source,
        })
}

impl PolicyRuleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_pattern("policyRules.securitySource", &self.security_source)?;
        if self.bundle_source.is_empty() {
            return Err(ConfigError::Invalid {
                field: "policyRules.bundleSource",
                message: "must contain at least one pattern".into(),
            });
        }
        for pattern in &self.bundle_source {
            check_pattern("policyRules.bundleSource", pattern)?;
        }
        if self.bundle_final_destination.is_empty() {
            return Err(ConfigError::Invalid {
                field: "policyRules.bundleFinalDestination",
                message: "must contain at least one pattern".into(),
            });
        }
        for pattern in &self.bundle_final_destination {
            check_pattern("policyRules.bundleFinalDestination", pattern)?;
        }

        if self.security_role == SecurityRoleConfig::Source
            && self.security_target_block_types.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "policyRules.securityTargetBlockTypes",
                message: "required for the source role".into(),
            });
        }

        let expected_context = match self.security_service {
            SecurityServiceConfig::Confidentiality => SecurityContextName::AesGcm,
            SecurityServiceConfig::Integrity => SecurityContextName::HmacSha,
        };
        if self.security_context != expected_context {
            return Err(ConfigError::Invalid {
                field: "policyRules.securityContext",
                message: format!(
                    "context does not provide the `{:?}` service",
                    self.security_service
                ),
            });
        }

        self.validate_params()?;

        if self.key_file().is_none() {
            return Err(ConfigError::Invalid {
                field: "policyRules.securityContextParams",
                message: "a `keyFile` parameter is required".into(),
            });
        }
        Ok(())
    }

    fn validate_params(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for param in &self.security_context_params {
            if !seen.insert(param.param_name) {
                return Err(ConfigError::Invalid {
                    field: "policyRules.securityContextParams",
                    message: format!("duplicate parameter `{:?}`", param.param_name),
                });
            }
            let field = "policyRules.securityContextParams.value";
            match (param.param_name, &param.value) {
                (ParamName::AesVariant, ParamValue::Number(v)) if matches!(*v, 128 | 256) => {}
                (ParamName::ShaVariant, ParamValue::Number(v))
                    if matches!(*v, 256 | 384 | 512) => {}
                (ParamName::IvSizeBytes, ParamValue::Number(v)) if matches!(*v, 12 | 16) => {}
                (ParamName::SecurityBlockCrc, ParamValue::Number(v))
                    if matches!(*v, 0 | 16 | 32) => {}
                (ParamName::ScopeFlags, ParamValue::Number(v)) if *v <= 7 => {}
                (ParamName::KeyFile, ParamValue::Text(path)) if !path.is_empty() => {}
                (name, _) => {
                    return Err(ConfigError::Invalid {
                        field,
                        message: format!("value out of domain for `{name:?}`"),
                    });
                }
            }
        }
        Ok(())
    }
}
