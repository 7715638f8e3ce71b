//! An in-memory view over a BPv7 bundle.
//!
//! `BundleView` owns the decoded primary block plus the canonical blocks in
//! bundle order, and tracks the node-local `is_encrypted` indicator for each
//! block. Loading a bundle marks every block targeted by a BCB as encrypted;
//! the incoming processor clears the mark when it accepts the operation and
//! restores plaintext.

use ciborium::value::Value;

use crate::asb::AbstractSecurityBlock;
use crate::block::{CanonicalBlock, PrimaryBlock, BLOCK_TYPE_BCB};
use crate::cbor;
use crate::error::{CodecError, CodecResult};

/// A canonical block plus node-local processing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    /// The canonical block itself.
    pub block: CanonicalBlock,
    /// Whether the block data is currently ciphertext under some BCB.
    pub is_encrypted: bool,
}

/// A decoded bundle: primary block plus canonical blocks in bundle order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleView {
    /// The primary block.
    pub primary: PrimaryBlock,
    blocks: Vec<BlockView>,
}

impl BundleView {
    /// Create a bundle with no canonical blocks.
    #[must_use]
    pub fn new(primary: PrimaryBlock) -> Self {
        Self {
            primary,
            blocks: Vec::new(),
        }
    }

    /// Append a canonical block at the end of the bundle.
    pub fn append_block(&mut self, block: CanonicalBlock) {
        self.blocks.push(BlockView {
            block,
            is_encrypted: false,
        });
    }

    /// Insert a block immediately before the block numbered `anchor`.
    ///
    /// Falls back to appending when `anchor` is not present.
    pub fn insert_block_before(&mut self, anchor: u64, block: CanonicalBlock) {
        let view = BlockView {
            block,
            is_encrypted: false,
        };
        match self.blocks.iter().position(|b| b.block.block_number == anchor) {
            Some(index) => self.blocks.insert(index, view),
            None => self.blocks.push(view),
        }
    }

    /// Remove the block numbered `number`. Returns whether it was present.
    pub fn remove_block(&mut self, number: u64) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.block.block_number != number);
        self.blocks.len() != before
    }

    /// All canonical blocks in bundle order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockView] {
        &self.blocks
    }

    /// Mutable access to all canonical blocks.
    pub fn blocks_mut(&mut self) -> &mut [BlockView] {
        &mut self.blocks
    }

    /// The block numbered `number`, if present.
    #[must_use]
    pub fn block_by_number(&self, number: u64) -> Option<&BlockView> {
        self.blocks.iter().find(|b| b.block.block_number == number)
    }

    /// Mutable access to the block numbered `number`.
    pub fn block_by_number_mut(&mut self, number: u64) -> Option<&mut BlockView> {
        self.blocks
            .iter_mut()
            .find(|b| b.block.block_number == number)
    }

    /// Block numbers of all blocks with the given type code, in bundle order.
    #[must_use]
    pub fn block_numbers_by_type(&self, block_type: u8) -> Vec<u64> {
        self.blocks
            .iter()
            .filter(|b| b.block.block_type == block_type)
            .map(|b| b.block.block_number)
            .collect()
    }

    /// The lowest block number not yet in use (the payload always owns 1).
    #[must_use]
    pub fn next_block_number(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| b.block.block_number)
            .max()
            .unwrap_or(1)
            .max(1)
            + 1
    }

    /// Serialize the bundle to its canonical CBOR encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut items = Vec::with_capacity(1 + self.blocks.len());
        items.push(self.primary.encode_value()?);
        for view in &self.blocks {
            items.push(view.block.encode_value()?);
        }
        cbor::to_bytes(&Value::Array(items))
    }

    /// Deserialize a bundle and mark BCB-targeted blocks as encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CBOR, an unsupported protocol version,
    /// or a CRC mismatch.
    pub fn from_bytes(data: &[u8]) -> CodecResult<Self> {
        let value = cbor::from_bytes(data)?;
        let items = cbor::as_array(&value, "bundle")?;
        if items.is_empty() {
            return Err(CodecError::TruncatedArray {
                structure: "bundle",
                expected: 1,
                got: 0,
            });
        }
        let primary = PrimaryBlock::from_value(&items[0])?;
        let mut view = Self::new(primary);
        for item in &items[1..] {
            view.append_block(CanonicalBlock::from_value(item)?);
        }
        view.mark_encrypted_targets();
        Ok(view)
    }

    // Malformed ASBs are skipped here; the security processor reports them.
    fn mark_encrypted_targets(&mut self) {
        let mut encrypted = Vec::new();
        for number in self.block_numbers_by_type(BLOCK_TYPE_BCB) {
            let Some(bcb) = self.block_by_number(number) else {
                continue;
            };
            if let Ok(asb) = AbstractSecurityBlock::decode(&bcb.block.data) {
                encrypted.extend(asb.security_targets);
            }
        }
        for number in encrypted {
            if let Some(target) = self.block_by_number_mut(number) {
                target.is_encrypted = true;
            }
        }
    }
}
