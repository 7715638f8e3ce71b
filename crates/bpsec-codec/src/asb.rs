//! Abstract Security Block encoding and decoding (RFC 9172 §3.6).
//!
//! Both BIB and BCB carry the same block-type-specific structure:
//!
//! ```text
//! ASB = [ security_targets : [+ u64],
//!         security_context_id : u64,
//!         security_context_flags : u64,   ; bit 0: parameters present
//!         security_source : [2, [node, service]],
//!         ? security_context_parameters : [+ [param_id, value]],
//!         security_results : [+ [+ [result_id, value]]] ]
//! ```
//!
//! The outer `security_results` array is parallel to `security_targets`:
//! entry `i` holds the results for target `i`. Parameter and result ids
//! follow the registered security context (RFC 9173).

use bitflags::bitflags;
use bpsec_eid::Eid;
use ciborium::value::Value;

use crate::cbor;
use crate::error::{CodecError, CodecResult};

/// BIB-HMAC-SHA2 security context id (RFC 9173).
pub const SECURITY_CONTEXT_BIB_HMAC_SHA2: u64 = 1;
/// BCB-AES-GCM security context id (RFC 9173).
pub const SECURITY_CONTEXT_BCB_AES_GCM: u64 = 2;

/// BCB-AES-GCM parameter: initialization vector.
pub const BCB_PARAM_IV: u64 = 1;
/// BCB-AES-GCM parameter: AES variant.
pub const BCB_PARAM_AES_VARIANT: u64 = 2;
/// BCB-AES-GCM parameter: AAD scope flags.
pub const BCB_PARAM_AAD_SCOPE_FLAGS: u64 = 4;
/// BCB-AES-GCM result: authentication tag.
pub const BCB_RESULT_AUTH_TAG: u64 = 1;
/// BCB-AES-GCM result: per-target IV. Targets never share a nonce, so each
/// target entry carries its own IV alongside the tag.
pub const BCB_RESULT_TARGET_IV: u64 = 2;

/// BIB-HMAC-SHA2 parameter: SHA variant.
pub const BIB_PARAM_SHA_VARIANT: u64 = 1;
/// BIB-HMAC-SHA2 parameter: integrity scope flags.
pub const BIB_PARAM_INTEGRITY_SCOPE_FLAGS: u64 = 3;
/// BIB-HMAC-SHA2 result: HMAC value.
pub const BIB_RESULT_HMAC: u64 = 1;

/// RFC 9173 AES variant code for A128GCM.
pub const AES_VARIANT_A128GCM: u64 = 1;
/// RFC 9173 AES variant code for A256GCM.
pub const AES_VARIANT_A256GCM: u64 = 3;
/// RFC 9173 SHA variant code for HMAC 256/256.
pub const SHA_VARIANT_HMAC_256: u64 = 5;
/// RFC 9173 SHA variant code for HMAC 384/384.
pub const SHA_VARIANT_HMAC_384: u64 = 6;
/// RFC 9173 SHA variant code for HMAC 512/512.
pub const SHA_VARIANT_HMAC_512: u64 = 7;

const FLAG_PARAMETERS_PRESENT: u64 = 0x01;

bitflags! {
    /// Scope flags selecting the canonical segments fed to AEAD AAD or MAC
    /// input, in the fixed order primary block, target header, security
    /// header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ScopeFlags: u64 {
        /// Include the canonical primary block encoding.
        const INCLUDE_PRIMARY_BLOCK = 0x01;
        /// Include the target block header triple.
        const INCLUDE_TARGET_HEADER = 0x02;
        /// Include the security block header triple.
        const INCLUDE_SECURITY_HEADER = 0x04;
    }
}

/// A parameter or result value: an unsigned integer or a byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsbValue {
    /// Unsigned integer value.
    Uint(u64),
    /// Byte-string value.
    Bytes(Vec<u8>),
}

impl AsbValue {
    /// The integer value, if this is an integer.
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Bytes(_) => None,
        }
    }

    /// The byte-string value, if this is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Uint(_) => None,
            Self::Bytes(b) => Some(b),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Uint(v) => cbor::uint(*v),
            Self::Bytes(b) => Value::Bytes(b.clone()),
        }
    }

    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Integer(i) => Ok(Self::Uint(
                u64::try_from(*i).map_err(|_| CodecError::IntegerOutOfRange {
                    field: "ASB value",
                })?,
            )),
            Value::Bytes(b) => Ok(Self::Bytes(b.clone())),
            _ => Err(CodecError::UnexpectedItem {
                expected: "integer or byte string",
            }),
        }
    }
}

/// The Abstract Security Block carried as BIB/BCB block data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractSecurityBlock {
    /// Block numbers of the security targets.
    pub security_targets: Vec<u64>,
    /// Registered security context id.
    pub security_context_id: u64,
    /// EID of the node that added this security block.
    pub security_source: Eid,
    /// Security context parameters, `(param_id, value)` pairs.
    pub parameters: Vec<(u64, AsbValue)>,
    /// Per-target result sets, parallel to `security_targets`.
    pub results: Vec<Vec<(u64, AsbValue)>>,
}

impl AbstractSecurityBlock {
    /// Look up a parameter by id.
    #[must_use]
    pub fn parameter(&self, param_id: u64) -> Option<&AsbValue> {
        self.parameters
            .iter()
            .find(|(id, _)| *id == param_id)
            .map(|(_, value)| value)
    }

    /// Look up a result by id within the result set of target index `index`.
    #[must_use]
    pub fn result(&self, index: usize, result_id: u64) -> Option<&AsbValue> {
        self.results.get(index).and_then(|set| {
            set.iter()
                .find(|(id, _)| *id == result_id)
                .map(|(_, value)| value)
        })
    }

    /// Index of `target` in the target list.
    #[must_use]
    pub fn target_index(&self, target: u64) -> Option<usize> {
        self.security_targets.iter().position(|t| *t == target)
    }

    /// Remove `target` and its result set. Returns whether it was present.
    pub fn remove_target(&mut self, target: u64) -> bool {
        match self.target_index(target) {
            Some(index) => {
                self.security_targets.remove(index);
                if index < self.results.len() {
                    self.results.remove(index);
                }
                true
            }
            None => false,
        }
    }

    /// Whether no targets remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.security_targets.is_empty()
    }

    /// Encode to block-type-specific data bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let flags = if self.parameters.is_empty() {
            0
        } else {
            FLAG_PARAMETERS_PRESENT
        };
        let mut items = vec![
            Value::Array(self.security_targets.iter().map(|t| cbor::uint(*t)).collect()),
            cbor::uint(self.security_context_id),
            cbor::uint(flags),
            cbor::encode_eid(self.security_source),
        ];
        if !self.parameters.is_empty() {
            items.push(Value::Array(
                self.parameters
                    .iter()
                    .map(|(id, value)| Value::Array(vec![cbor::uint(*id), value.to_value()]))
                    .collect(),
            ));
        }
        items.push(Value::Array(
            self.results
                .iter()
                .map(|set| {
                    Value::Array(
                        set.iter()
                            .map(|(id, value)| {
                                Value::Array(vec![cbor::uint(*id), value.to_value()])
                            })
                            .collect(),
                    )
                })
                .collect(),
        ));
        cbor::to_bytes(&Value::Array(items))
    }

    /// Decode from block-type-specific data bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CBOR or structure.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let value = cbor::from_bytes(data)?;
        let items = cbor::as_array(&value, "abstract security block")?;
        if items.len() < 5 {
            return Err(CodecError::TruncatedArray {
                structure: "abstract security block",
                expected: 5,
                got: items.len(),
            });
        }
        let targets = cbor::as_array(&items[0], "security targets")?
            .iter()
            .map(|t| cbor::as_u64(t, "security target"))
            .collect::<CodecResult<Vec<u64>>>()?;
        let context_id = cbor::as_u64(&items[1], "security context id")?;
        let flags = cbor::as_u64(&items[2], "security context flags")?;
        let source = cbor::decode_eid(&items[3])?;
        let parameters_present = flags & FLAG_PARAMETERS_PRESENT != 0;
        let expected_len = if parameters_present { 6 } else { 5 };
        if items.len() != expected_len {
            return Err(CodecError::TruncatedArray {
                structure: "abstract security block",
                expected: expected_len,
                got: items.len(),
            });
        }
        let parameters = if parameters_present {
            decode_pairs(&items[4], "security context parameters")?
        } else {
            Vec::new()
        };
        let results_item = &items[expected_len - 1];
        let results = cbor::as_array(results_item, "security results")?
            .iter()
            .map(|set| decode_pairs(set, "security result set"))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self {
            security_targets: targets,
            security_context_id: context_id,
            security_source: source,
            parameters,
            results,
        })
    }
}

fn decode_pairs(value: &Value, what: &'static str) -> CodecResult<Vec<(u64, AsbValue)>> {
    cbor::as_array(value, what)?
        .iter()
        .map(|pair| {
            let pair = cbor::as_array(pair, "id/value pair")?;
            if pair.len() != 2 {
                return Err(CodecError::TruncatedArray {
                    structure: "id/value pair",
                    expected: 2,
                    got: pair.len(),
                });
            }
            Ok((cbor::as_u64(&pair[0], "id")?, AsbValue::from_value(&pair[1])?))
        })
        .collect()
}
