//! BPv7 primary and canonical block structures.
//!
//! Wire encoding follows RFC 9171: the primary block is
//! `[version, flags, crc_type, destination, source, report_to,
//! [creation_time_ms, sequence], lifetime_ms, ?crc]` and a canonical block
//! is `[block_type, block_number, flags, crc_type, data, ?crc]`. When a CRC
//! is present it is computed over the block encoding with the CRC field set
//! to zero bytes.

use bitflags::bitflags;
use bpsec_eid::Eid;
use ciborium::value::Value;

use crate::cbor;
use crate::crc::CrcType;
use crate::error::{CodecError, CodecResult};

/// Payload block type code; the payload always carries block number 1.
pub const BLOCK_TYPE_PAYLOAD: u8 = 1;
/// Block Integrity Block type code (RFC 9172).
pub const BLOCK_TYPE_BIB: u8 = 11;
/// Block Confidentiality Block type code (RFC 9172).
pub const BLOCK_TYPE_BCB: u8 = 12;

bitflags! {
    /// Bundle processing control flags (primary block).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BundleControlFlags: u64 {
        /// Bundle is a fragment.
        const IS_FRAGMENT = 0x0001;
        /// Payload is an administrative record.
        const ADMIN_RECORD = 0x0002;
        /// Bundle must not be fragmented.
        const NO_FRAGMENT = 0x0004;
        /// Acknowledgement by the user application is requested.
        const ACK_REQUESTED = 0x0020;
        /// Status time is requested in all status reports.
        const STATUS_TIME_REQUESTED = 0x0040;
    }
}

bitflags! {
    /// Block processing control flags (canonical blocks).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockControlFlags: u64 {
        /// Block must be replicated in every fragment.
        const REPLICATE_IN_EVERY_FRAGMENT = 0x01;
        /// Report status if the block cannot be processed.
        const STATUS_REPORT_IF_UNPROCESSABLE = 0x02;
        /// Delete the bundle if the block cannot be processed.
        const DELETE_BUNDLE_IF_UNPROCESSABLE = 0x04;
        /// Remove the block if it cannot be processed.
        const REMOVE_BLOCK_IF_UNPROCESSABLE = 0x10;
    }
}

/// Bundle creation timestamp: milliseconds since the DTN epoch plus a
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreationTimestamp {
    /// Milliseconds since 2000-01-01T00:00:00Z.
    pub dtn_time_ms: u64,
    /// Sequence number disambiguating bundles created in the same
    /// millisecond.
    pub sequence_number: u64,
}

/// BPv7 primary block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    /// Bundle processing control flags.
    pub bundle_flags: BundleControlFlags,
    /// CRC type protecting the primary block.
    pub crc_type: CrcType,
    /// Bundle final destination.
    pub destination: Eid,
    /// Bundle source node.
    pub source: Eid,
    /// Status report destination.
    pub report_to: Eid,
    /// Creation timestamp.
    pub creation_timestamp: CreationTimestamp,
    /// Lifetime in milliseconds.
    pub lifetime_ms: u64,
}

const BP_VERSION: u64 = 7;
const PRIMARY_FIELDS: usize = 8;
const CANONICAL_FIELDS: usize = 5;

impl PrimaryBlock {
    fn to_value(&self, crc: Option<Vec<u8>>) -> Value {
        let mut items = vec![
            cbor::uint(BP_VERSION),
            cbor::uint(self.bundle_flags.bits()),
            cbor::uint(self.crc_type.wire_code()),
            cbor::encode_eid(self.destination),
            cbor::encode_eid(self.source),
            cbor::encode_eid(self.report_to),
            Value::Array(vec![
                cbor::uint(self.creation_timestamp.dtn_time_ms),
                cbor::uint(self.creation_timestamp.sequence_number),
            ]),
            cbor::uint(self.lifetime_ms),
        ];
        if let Some(crc) = crc {
            items.push(Value::Bytes(crc));
        }
        Value::Array(items)
    }

    /// Canonical encoding of the primary block, CRC included if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode_value(&self) -> CodecResult<Value> {
        if self.crc_type.is_none() {
            return Ok(self.to_value(None));
        }
        let zeroed = self.to_value(Some(vec![0u8; self.crc_type.len()]));
        let crc = self.crc_type.compute(&cbor::to_bytes(&zeroed)?);
        Ok(self.to_value(Some(crc)))
    }

    /// Canonical CBOR bytes of the primary block (used as AAD input).
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        cbor::to_bytes(&self.encode_value()?)
    }

    pub(crate) fn from_value(value: &Value) -> CodecResult<Self> {
        let items = cbor::as_array(value, "primary block")?;
        if items.len() < PRIMARY_FIELDS {
            return Err(CodecError::TruncatedArray {
                structure: "primary block",
                expected: PRIMARY_FIELDS,
                got: items.len(),
            });
        }
        let version = cbor::as_u64(&items[0], "protocol version")?;
        if version != BP_VERSION {
            return Err(CodecError::UnsupportedVersion { got: version });
        }
        let crc_type = CrcType::from_wire_code(cbor::as_u64(&items[2], "CRC type")?)?;
        let timestamp = cbor::as_array(&items[6], "creation timestamp")?;
        if timestamp.len() != 2 {
            return Err(CodecError::TruncatedArray {
                structure: "creation timestamp",
                expected: 2,
                got: timestamp.len(),
            });
        }
        let block = Self {
            bundle_flags: BundleControlFlags::from_bits_retain(cbor::as_u64(
                &items[1],
                "bundle flags",
            )?),
            crc_type,
            destination: cbor::decode_eid(&items[3])?,
            source: cbor::decode_eid(&items[4])?,
            report_to: cbor::decode_eid(&items[5])?,
            creation_timestamp: CreationTimestamp {
                dtn_time_ms: cbor::as_u64(&timestamp[0], "creation time")?,
                sequence_number: cbor::as_u64(&timestamp[1], "sequence number")?,
            },
            lifetime_ms: cbor::as_u64(&items[7], "lifetime")?,
        };
        if !crc_type.is_none() {
            let carried = cbor::as_bytes(
                items.get(PRIMARY_FIELDS).ok_or(CodecError::TruncatedArray {
                    structure: "primary block CRC",
                    expected: PRIMARY_FIELDS + 1,
                    got: items.len(),
                })?,
                "primary block CRC",
            )?;
            let zeroed = block.to_value(Some(vec![0u8; crc_type.len()]));
            let expected = crc_type.compute(&cbor::to_bytes(&zeroed)?);
            if carried != expected {
                return Err(CodecError::CrcMismatch { block_number: 0 });
            }
        }
        Ok(block)
    }
}

/// BPv7 canonical (non-primary) block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBlock {
    /// Block type code.
    pub block_type: u8,
    /// Block number, unique within the bundle.
    pub block_number: u64,
    /// Block processing control flags.
    pub flags: BlockControlFlags,
    /// CRC type protecting this block.
    pub crc_type: CrcType,
    /// Block-type-specific data.
    pub data: Vec<u8>,
}

impl CanonicalBlock {
    fn to_value(&self, crc: Option<Vec<u8>>) -> Value {
        let mut items = vec![
            cbor::uint(u64::from(self.block_type)),
            cbor::uint(self.block_number),
            cbor::uint(self.flags.bits()),
            cbor::uint(self.crc_type.wire_code()),
            Value::Bytes(self.data.clone()),
        ];
        if let Some(crc) = crc {
            items.push(Value::Bytes(crc));
        }
        Value::Array(items)
    }

    /// Canonical encoding of the block, CRC included if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode_value(&self) -> CodecResult<Value> {
        if self.crc_type.is_none() {
            return Ok(self.to_value(None));
        }
        let zeroed = self.to_value(Some(vec![0u8; self.crc_type.len()]));
        let crc = self.crc_type.compute(&cbor::to_bytes(&zeroed)?);
        Ok(self.to_value(Some(crc)))
    }

    /// Canonical CBOR encoding of the block header triple
    /// `[block_type, block_number, flags]`, used as scope-flag AAD input.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode_header(&self) -> CodecResult<Vec<u8>> {
        cbor::to_bytes(&Value::Array(vec![
            cbor::uint(u64::from(self.block_type)),
            cbor::uint(self.block_number),
            cbor::uint(self.flags.bits()),
        ]))
    }

    pub(crate) fn from_value(value: &Value) -> CodecResult<Self> {
        let items = cbor::as_array(value, "canonical block")?;
        if items.len() < CANONICAL_FIELDS {
            return Err(CodecError::TruncatedArray {
                structure: "canonical block",
                expected: CANONICAL_FIELDS,
                got: items.len(),
            });
        }
        let block_type_raw = cbor::as_u64(&items[0], "block type")?;
        let block_type = u8::try_from(block_type_raw)
            .map_err(|_| CodecError::IntegerOutOfRange { field: "block type" })?;
        let block = Self {
            block_type,
            block_number: cbor::as_u64(&items[1], "block number")?,
            flags: BlockControlFlags::from_bits_retain(cbor::as_u64(&items[2], "block flags")?),
            crc_type: CrcType::from_wire_code(cbor::as_u64(&items[3], "CRC type")?)?,
            data: cbor::as_bytes(&items[4], "block data")?.to_vec(),
        };
        if !block.crc_type.is_none() {
            let carried = cbor::as_bytes(
                items
                    .get(CANONICAL_FIELDS)
                    .ok_or(CodecError::TruncatedArray {
                        structure: "canonical block CRC",
                        expected: CANONICAL_FIELDS + 1,
                        got: items.len(),
                    })?,
                "canonical block CRC",
            )?;
            let zeroed = block.to_value(Some(vec![0u8; block.crc_type.len()]));
            let expected = block.crc_type.compute(&cbor::to_bytes(&zeroed)?);
            if carried != expected {
                return Err(CodecError::CrcMismatch {
                    block_number: block.block_number,
                });
            }
        }
        Ok(block)
    }
}
