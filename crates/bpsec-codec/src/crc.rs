//! Block-level CRC support (BPv7 CRC types 1 and 2).

use crc::{Crc, CRC_16_IBM_SDLC, CRC_32_ISCSI};

use crate::error::{CodecError, CodecResult};

const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// CRC type carried in primary and canonical block headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CrcType {
    /// No CRC present.
    #[default]
    None,
    /// CRC-16/X.25 (wire code 1).
    Crc16X25,
    /// CRC-32/Castagnoli (wire code 2).
    Crc32Castagnoli,
}

impl CrcType {
    /// Wire code for this CRC type.
    #[must_use]
    pub const fn wire_code(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Crc16X25 => 1,
            Self::Crc32Castagnoli => 2,
        }
    }

    /// Decode a wire code.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownCrcType` for unassigned codes.
    pub const fn from_wire_code(code: u64) -> CodecResult<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Crc16X25),
            2 => Ok(Self::Crc32Castagnoli),
            got => Err(CodecError::UnknownCrcType { got }),
        }
    }

    /// CRC field width in bytes (0 when absent).
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc16X25 => 2,
            Self::Crc32Castagnoli => 4,
        }
    }

    /// Whether no CRC is carried.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Compute the CRC over `bytes`, big-endian as it appears on the wire.
    #[must_use]
    pub fn compute(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Crc16X25 => X25.checksum(bytes).to_be_bytes().to_vec(),
            Self::Crc32Castagnoli => CASTAGNOLI.checksum(bytes).to_be_bytes().to_vec(),
        }
    }
}
