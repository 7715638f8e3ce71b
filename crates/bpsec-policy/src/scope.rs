//! Scope-flag-driven assembly of AAD / MAC input.

use bpsec_codec::{CanonicalBlock, CodecResult, PrimaryBlock, ScopeFlags};

/// Append the canonical encodings selected by `scope` to `buf`, in the fixed
/// order primary block, target block header, security block header.
pub(crate) fn append_scope_data(
    buf: &mut Vec<u8>,
    scope: ScopeFlags,
    primary: &PrimaryBlock,
    target: &CanonicalBlock,
    security_header: &CanonicalBlock,
) -> CodecResult<()> {
    if scope.contains(ScopeFlags::INCLUDE_PRIMARY_BLOCK) {
        buf.extend_from_slice(&primary.encode()?);
    }
    if scope.contains(ScopeFlags::INCLUDE_TARGET_HEADER) {
        buf.extend_from_slice(&target.encode_header()?);
    }
    if scope.contains(ScopeFlags::INCLUDE_SECURITY_HEADER) {
        buf.extend_from_slice(&security_header.encode_header()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use bpsec_codec::{
        BlockControlFlags, BundleControlFlags, CreationTimestamp, CrcType, BLOCK_TYPE_BCB,
        BLOCK_TYPE_PAYLOAD,
    };
    use bpsec_eid::Eid;

    fn fixtures() -> (PrimaryBlock, CanonicalBlock, CanonicalBlock) {
        let primary = PrimaryBlock {
            bundle_flags: BundleControlFlags::NO_FRAGMENT,
            crc_type: CrcType::None,
            destination: Eid::new(2, 1),
            source: Eid::new(1, 1),
            report_to: Eid::new(0, 0),
            creation_timestamp: CreationTimestamp {
                dtn_time_ms: 1,
                sequence_number: 1,
            },
            lifetime_ms: 1000,
        };
        let target = CanonicalBlock {
            block_type: BLOCK_TYPE_PAYLOAD,
            block_number: 1,
            flags: BlockControlFlags::empty(),
            crc_type: CrcType::None,
            data: b"payload".to_vec(),
        };
        let security = CanonicalBlock {
            block_type: BLOCK_TYPE_BCB,
            block_number: 3,
            flags: BlockControlFlags::empty(),
            crc_type: CrcType::None,
            data: Vec::new(),
        };
        (primary, target, security)
    }

    #[test]
    fn empty_scope_contributes_nothing() {
        let (primary, target, security) = fixtures();
        let mut buf = Vec::new();
        append_scope_data(&mut buf, ScopeFlags::empty(), &primary, &target, &security).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn segments_concatenate_in_fixed_order() {
        let (primary, target, security) = fixtures();
        let mut all = Vec::new();
        append_scope_data(&mut all, ScopeFlags::all(), &primary, &target, &security).unwrap();

        let mut expected = primary.encode().unwrap();
        expected.extend_from_slice(&target.encode_header().unwrap());
        expected.extend_from_slice(&security.encode_header().unwrap());
        assert_eq!(all, expected);
    }

    #[test]
    fn target_data_never_contributes_to_scope() {
        let (primary, mut target, security) = fixtures();
        let mut before = Vec::new();
        append_scope_data(&mut before, ScopeFlags::all(), &primary, &target, &security).unwrap();
        target.data = b"different".to_vec();
        let mut after = Vec::new();
        append_scope_data(&mut after, ScopeFlags::all(), &primary, &target, &security).unwrap();
        assert_eq!(before, after);
    }
}
