//! Source-role processing: build and attach security blocks on departing
//! bundles.

use bpsec_codec::{
    AbstractSecurityBlock, AsbValue, BlockControlFlags, BundleView, CanonicalBlock,
    AES_VARIANT_A128GCM, AES_VARIANT_A256GCM, BCB_PARAM_AAD_SCOPE_FLAGS, BCB_PARAM_AES_VARIANT,
    BCB_RESULT_AUTH_TAG, BCB_RESULT_TARGET_IV, BIB_PARAM_INTEGRITY_SCOPE_FLAGS,
    BIB_PARAM_SHA_VARIANT, BIB_RESULT_HMAC, BLOCK_TYPE_BCB, BLOCK_TYPE_BIB,
    SECURITY_CONTEXT_BCB_AES_GCM, SECURITY_CONTEXT_BIB_HMAC_SHA2, SHA_VARIANT_HMAC_256,
    SHA_VARIANT_HMAC_384, SHA_VARIANT_HMAC_512,
};
use bpsec_crypto::{aes_gcm_seal_in_place, generate_iv, hmac_sha_sign, AesVariant, ShaVariant};
use bpsec_eid::Eid;
use tracing::trace;

use crate::context::ProcessingContext;
use crate::engine::PolicyEngine;
use crate::error::ProcessingError;
use crate::policy::{BcbParams, BibParams, BpSecRole, SecurityOperation};
use crate::scope::append_scope_data;

/// Apply the best-match source policy to a departing bundle.
///
/// Returns whether a security block was attached. On error the bundle may
/// hold partially encrypted blocks and must not be emitted.
pub(crate) fn process_outgoing(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    local_security_source: Eid,
) -> Result<bool, ProcessingError> {
    ctx.begin_bundle();
    let handle = engine.store().find_with_cache(
        local_security_source,
        bundle.primary.source,
        bundle.primary.destination,
        BpSecRole::Source,
        ctx.cache_for(BpSecRole::Source),
    );
    let Some(handle) = handle else {
        return Ok(false);
    };
    let policy = engine.store().policy(handle);
    let Some(operation) = policy.operation.as_ref() else {
        return Ok(false);
    };

    // Targets in bundle order; security blocks are never targets of new
    // operations here.
    let targets: Vec<u64> = bundle
        .blocks()
        .iter()
        .filter(|view| {
            let block_type = view.block.block_type;
            block_type != BLOCK_TYPE_BIB
                && block_type != BLOCK_TYPE_BCB
                && policy.target_block_types.contains(&block_type)
        })
        .map(|view| view.block.block_number)
        .collect();
    if targets.is_empty() {
        return Ok(false);
    }
    let earliest_target = targets[0];
    let security_block_number = bundle.next_block_number();

    trace!(
        rule_id = policy.rule_id,
        security_block_number,
        ?targets,
        "applying source security operation"
    );

    let security_block = match operation {
        SecurityOperation::Confidentiality(params) => apply_bcb(
            bundle,
            ctx,
            local_security_source,
            params,
            &targets,
            security_block_number,
        )?,
        SecurityOperation::Integrity(params) => apply_bib(
            bundle,
            ctx,
            local_security_source,
            params,
            &targets,
            security_block_number,
        )?,
    };
    bundle.insert_block_before(earliest_target, security_block);
    Ok(true)
}

fn new_security_block(
    block_type: u8,
    block_number: u64,
    params_crc: bpsec_codec::CrcType,
) -> CanonicalBlock {
    CanonicalBlock {
        block_type,
        block_number,
        flags: BlockControlFlags::empty(),
        crc_type: params_crc,
        data: Vec::new(),
    }
}

fn apply_bcb(
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    security_source: Eid,
    params: &BcbParams,
    targets: &[u64],
    block_number: u64,
) -> Result<CanonicalBlock, ProcessingError> {
    let mut security_block = new_security_block(BLOCK_TYPE_BCB, block_number, params.crc_type);
    let variant_code = match params.aes_variant {
        AesVariant::Aes128 => AES_VARIANT_A128GCM,
        AesVariant::Aes256 => AES_VARIANT_A256GCM,
    };
    let mut asb = AbstractSecurityBlock {
        security_targets: Vec::with_capacity(targets.len()),
        security_context_id: SECURITY_CONTEXT_BCB_AES_GCM,
        security_source,
        parameters: vec![
            (BCB_PARAM_AES_VARIANT, AsbValue::Uint(variant_code)),
            (
                BCB_PARAM_AAD_SCOPE_FLAGS,
                AsbValue::Uint(params.scope_flags.bits()),
            ),
        ],
        results: Vec::with_capacity(targets.len()),
    };

    for &target_number in targets {
        let Some(target_view) = bundle.block_by_number(target_number) else {
            continue;
        };
        ctx.scope_scratch.clear();
        append_scope_data(
            &mut ctx.scope_scratch,
            params.scope_flags,
            &bundle.primary,
            &target_view.block,
            &security_block,
        )?;
        let iv = generate_iv(params.iv_len).map_err(|source| ProcessingError::Crypto {
            block_number: target_number,
            source,
        })?;
        let Some(target_view) = bundle.block_by_number_mut(target_number) else {
            continue;
        };
        let tag = aes_gcm_seal_in_place(
            params.aes_variant,
            params.key.as_bytes(),
            &iv,
            &ctx.scope_scratch,
            &mut target_view.block.data,
        )
        .map_err(|source| ProcessingError::Crypto {
            block_number: target_number,
            source,
        })?;
        target_view.is_encrypted = true;
        asb.security_targets.push(target_number);
        asb.results.push(vec![
            (BCB_RESULT_AUTH_TAG, AsbValue::Bytes(tag.to_vec())),
            (BCB_RESULT_TARGET_IV, AsbValue::Bytes(iv)),
        ]);
    }

    security_block.data = asb.encode()?;
    Ok(security_block)
}

fn apply_bib(
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    security_source: Eid,
    params: &BibParams,
    targets: &[u64],
    block_number: u64,
) -> Result<CanonicalBlock, ProcessingError> {
    let mut security_block = new_security_block(BLOCK_TYPE_BIB, block_number, params.crc_type);
    let variant_code = match params.sha_variant {
        ShaVariant::Sha256 => SHA_VARIANT_HMAC_256,
        ShaVariant::Sha384 => SHA_VARIANT_HMAC_384,
        ShaVariant::Sha512 => SHA_VARIANT_HMAC_512,
    };
    let mut asb = AbstractSecurityBlock {
        security_targets: Vec::with_capacity(targets.len()),
        security_context_id: SECURITY_CONTEXT_BIB_HMAC_SHA2,
        security_source,
        parameters: vec![
            (BIB_PARAM_SHA_VARIANT, AsbValue::Uint(variant_code)),
            (
                BIB_PARAM_INTEGRITY_SCOPE_FLAGS,
                AsbValue::Uint(params.scope_flags.bits()),
            ),
        ],
        results: Vec::with_capacity(targets.len()),
    };

    for &target_number in targets {
        let Some(target_view) = bundle.block_by_number(target_number) else {
            continue;
        };
        ctx.scope_scratch.clear();
        append_scope_data(
            &mut ctx.scope_scratch,
            params.scope_flags,
            &bundle.primary,
            &target_view.block,
            &security_block,
        )?;
        ctx.scope_scratch.extend_from_slice(&target_view.block.data);
        let mac = hmac_sha_sign(params.sha_variant, params.key.as_bytes(), &ctx.scope_scratch);
        asb.security_targets.push(target_number);
        asb.results.push(vec![(BIB_RESULT_HMAC, AsbValue::Bytes(mac))]);
    }

    security_block.data = asb.encode()?;
    Ok(security_block)
}
