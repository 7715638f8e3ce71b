//! Verifier/acceptor processing of received bundles.
//!
//! Security blocks are handled BCB first, then BIB (RFC 9172 §3.6). Every
//! runtime failure is routed through a security failure event set; nothing
//! escapes as an error and the only externally visible outcome is the
//! accept-or-drop disposition. A failed decryption or MAC check at an
//! acceptor additionally drops the bundle: the destination could never use
//! the protected data, so forwarding it on would only leak ciphertext.

use bpsec_codec::{
    AbstractSecurityBlock, AsbValue, BundleView, CanonicalBlock, ScopeFlags, AES_VARIANT_A128GCM,
    AES_VARIANT_A256GCM, BCB_PARAM_AAD_SCOPE_FLAGS, BCB_PARAM_AES_VARIANT, BCB_PARAM_IV,
    BCB_RESULT_AUTH_TAG, BCB_RESULT_TARGET_IV, BIB_PARAM_INTEGRITY_SCOPE_FLAGS,
    BIB_PARAM_SHA_VARIANT, BIB_RESULT_HMAC, BLOCK_TYPE_BCB, BLOCK_TYPE_BIB,
    SECURITY_CONTEXT_BCB_AES_GCM, SECURITY_CONTEXT_BIB_HMAC_SHA2, SHA_VARIANT_HMAC_256,
    SHA_VARIANT_HMAC_384, SHA_VARIANT_HMAC_512,
};
use bpsec_crypto::{aes_gcm_open_in_place, hmac_sha_verify, AesVariant, ShaVariant};
use tracing::{debug, warn};

use crate::context::ProcessingContext;
use crate::engine::{BundleDisposition, PolicyEngine};
use crate::events::{EventAction, EventId, EventSetHandle};
use crate::policy::{BcbParams, BibParams, BpSecRole, SecurityOperation};
use crate::scope::append_scope_data;

/// How one security target fared.
enum TargetOutcome {
    /// Acceptor decrypted/verified the target; plaintext replaces the data
    /// for BCB targets.
    Accepted(Option<Vec<u8>>),
    /// Verifier checked the target; blocks stay intact.
    Verified,
    /// AEAD/MAC failure.
    Corrupt,
    /// Policy or block state inconsistent with the operation.
    Misconfigured,
}

pub(crate) fn process_incoming(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
) -> BundleDisposition {
    ctx.begin_bundle();
    let mut drop_bundle = false;

    let mut queue = bundle.block_numbers_by_type(BLOCK_TYPE_BCB);
    queue.extend(bundle.block_numbers_by_type(BLOCK_TYPE_BIB));
    for security_block_number in queue {
        if drop_bundle {
            break;
        }
        process_security_block(engine, bundle, ctx, security_block_number, &mut drop_bundle);
    }

    if drop_bundle {
        BundleDisposition::Drop
    } else {
        BundleDisposition::Accept
    }
}

fn process_security_block(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    security_block_number: u64,
    drop_bundle: &mut bool,
) {
    // May have been removed by an earlier block's event actions.
    let Some(security_view) = bundle.block_by_number(security_block_number) else {
        return;
    };
    let block_type = security_view.block.block_type;
    let security_header = CanonicalBlock {
        block_type,
        block_number: security_block_number,
        flags: security_view.block.flags,
        crc_type: security_view.block.crc_type,
        data: Vec::new(),
    };

    let mut asb = match AbstractSecurityBlock::decode(&security_view.block.data) {
        Ok(asb) => asb,
        Err(err) => {
            warn!(
                block = security_block_number,
                %err,
                "malformed abstract security block"
            );
            let mut ignored = AbstractSecurityBlock {
                security_targets: Vec::new(),
                security_context_id: 0,
                security_source: bundle.primary.source,
                parameters: Vec::new(),
                results: Vec::new(),
            };
            let mut asb_removed = false;
            let mut dirty = false;
            fire_event(
                engine,
                engine.default_event_set(),
                EventId::SopCorruptedAtAcceptor,
                None,
                security_block_number,
                bundle,
                &mut ignored,
                &mut asb_removed,
                &mut dirty,
                ctx,
                drop_bundle,
            );
            return;
        }
    };

    // Role preference: acceptor, then verifier.
    let lookup = |role: BpSecRole, ctx: &mut ProcessingContext| {
        engine.store().find_with_cache(
            asb.security_source,
            bundle.primary.source,
            bundle.primary.destination,
            role,
            ctx.cache_for(role),
        )
    };
    let (handle, role) = match lookup(BpSecRole::Acceptor, ctx) {
        Some(handle) => (handle, BpSecRole::Acceptor),
        None => match lookup(BpSecRole::Verifier, ctx) {
            Some(handle) => (handle, BpSecRole::Verifier),
            None => {
                let mut asb_removed = false;
                let mut dirty = false;
                fire_event(
                    engine,
                    engine.default_event_set(),
                    EventId::SopMissingAtAcceptor,
                    None,
                    security_block_number,
                    bundle,
                    &mut asb,
                    &mut asb_removed,
                    &mut dirty,
                    ctx,
                    drop_bundle,
                );
                return;
            }
        },
    };

    let policy = engine.store().policy(handle);
    let event_set = policy.event_set.or(engine.default_event_set());
    let misconfigured = misconfigured_event(role);

    let mut asb_removed = false;
    let mut dirty = false;
    let consistent = match (block_type, policy.operation.as_ref()) {
        (BLOCK_TYPE_BCB, Some(SecurityOperation::Confidentiality(params)))
            if asb.security_context_id == SECURITY_CONTEXT_BCB_AES_GCM =>
        {
            process_bcb_targets(
                engine,
                bundle,
                ctx,
                &mut asb,
                &security_header,
                params,
                role,
                event_set,
                &mut asb_removed,
                &mut dirty,
                drop_bundle,
            );
            true
        }
        (BLOCK_TYPE_BIB, Some(SecurityOperation::Integrity(params)))
            if asb.security_context_id == SECURITY_CONTEXT_BIB_HMAC_SHA2 =>
        {
            process_bib_targets(
                engine,
                bundle,
                ctx,
                &mut asb,
                &security_header,
                params,
                role,
                event_set,
                &mut asb_removed,
                &mut dirty,
                drop_bundle,
            );
            true
        }
        _ => false,
    };
    if !consistent {
        fire_event(
            engine,
            event_set,
            misconfigured,
            None,
            security_block_number,
            bundle,
            &mut asb,
            &mut asb_removed,
            &mut dirty,
            ctx,
            drop_bundle,
        );
    }

    if asb_removed || asb.is_empty() {
        bundle.remove_block(security_block_number);
    } else if dirty {
        if let Ok(data) = asb.encode() {
            if let Some(view) = bundle.block_by_number_mut(security_block_number) {
                view.block.data = data;
            }
        }
    }
}

const fn misconfigured_event(role: BpSecRole) -> EventId {
    match role {
        BpSecRole::Verifier => EventId::SopMisconfiguredAtVerifier,
        _ => EventId::SopMisconfiguredAtAcceptor,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_bcb_targets(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    asb: &mut AbstractSecurityBlock,
    security_header: &CanonicalBlock,
    params: &BcbParams,
    role: BpSecRole,
    event_set: Option<EventSetHandle>,
    asb_removed: &mut bool,
    dirty: &mut bool,
    drop_bundle: &mut bool,
) {
    let security_block_number = security_header.block_number;
    let wire_variant = asb
        .parameter(BCB_PARAM_AES_VARIANT)
        .and_then(AsbValue::as_uint)
        .unwrap_or(AES_VARIANT_A256GCM);
    let variant = match wire_variant {
        AES_VARIANT_A128GCM => Some(AesVariant::Aes128),
        AES_VARIANT_A256GCM => Some(AesVariant::Aes256),
        _ => None,
    };
    let scope = ScopeFlags::from_bits_truncate(
        asb.parameter(BCB_PARAM_AAD_SCOPE_FLAGS)
            .and_then(AsbValue::as_uint)
            .unwrap_or(0),
    );
    let param_iv = asb
        .parameter(BCB_PARAM_IV)
        .and_then(AsbValue::as_bytes)
        .map(<[u8]>::to_vec);

    // The policy key must fit the wire variant; a mismatch is an operator
    // configuration problem, not corruption.
    let usable = variant.filter(|v| params.key.len() == v.key_len());

    let mut outcomes = Vec::with_capacity(asb.security_targets.len());
    for (index, &target_number) in asb.security_targets.iter().enumerate() {
        let outcome = match usable {
            None => TargetOutcome::Misconfigured,
            Some(variant) => evaluate_bcb_target(
                bundle,
                ctx,
                asb,
                index,
                target_number,
                security_header,
                variant,
                scope,
                param_iv.as_deref(),
                params,
                role,
            ),
        };
        outcomes.push((target_number, outcome));
    }

    apply_outcomes(
        engine,
        bundle,
        ctx,
        asb,
        outcomes,
        role,
        event_set,
        security_block_number,
        asb_removed,
        dirty,
        drop_bundle,
    );
}

#[allow(clippy::too_many_arguments)]
fn evaluate_bcb_target(
    bundle: &BundleView,
    ctx: &mut ProcessingContext,
    asb: &AbstractSecurityBlock,
    index: usize,
    target_number: u64,
    security_header: &CanonicalBlock,
    variant: AesVariant,
    scope: ScopeFlags,
    param_iv: Option<&[u8]>,
    params: &BcbParams,
    role: BpSecRole,
) -> TargetOutcome {
    let Some(target_view) = bundle.block_by_number(target_number) else {
        return TargetOutcome::Misconfigured;
    };
    let Some(tag) = asb.result(index, BCB_RESULT_AUTH_TAG).and_then(AsbValue::as_bytes) else {
        return TargetOutcome::Misconfigured;
    };
    let iv = match asb
        .result(index, BCB_RESULT_TARGET_IV)
        .and_then(AsbValue::as_bytes)
        .or(param_iv)
    {
        Some(iv) => iv,
        None => return TargetOutcome::Misconfigured,
    };

    ctx.scope_scratch.clear();
    if append_scope_data(
        &mut ctx.scope_scratch,
        scope,
        &bundle.primary,
        &target_view.block,
        security_header,
    )
    .is_err()
    {
        return TargetOutcome::Misconfigured;
    }

    let mut data = target_view.block.data.clone();
    match aes_gcm_open_in_place(
        variant,
        params.key.as_bytes(),
        iv,
        &ctx.scope_scratch,
        &mut data,
        tag,
    ) {
        Ok(()) => match role {
            BpSecRole::Acceptor => TargetOutcome::Accepted(Some(data)),
            _ => TargetOutcome::Verified,
        },
        Err(_) => TargetOutcome::Corrupt,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_bib_targets(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    asb: &mut AbstractSecurityBlock,
    security_header: &CanonicalBlock,
    params: &BibParams,
    role: BpSecRole,
    event_set: Option<EventSetHandle>,
    asb_removed: &mut bool,
    dirty: &mut bool,
    drop_bundle: &mut bool,
) {
    let security_block_number = security_header.block_number;
    let wire_variant = asb
        .parameter(BIB_PARAM_SHA_VARIANT)
        .and_then(AsbValue::as_uint)
        .unwrap_or(SHA_VARIANT_HMAC_384);
    let variant = match wire_variant {
        SHA_VARIANT_HMAC_256 => Some(ShaVariant::Sha256),
        SHA_VARIANT_HMAC_384 => Some(ShaVariant::Sha384),
        SHA_VARIANT_HMAC_512 => Some(ShaVariant::Sha512),
        _ => None,
    };
    let scope = ScopeFlags::from_bits_truncate(
        asb.parameter(BIB_PARAM_INTEGRITY_SCOPE_FLAGS)
            .and_then(AsbValue::as_uint)
            .unwrap_or(0),
    );

    let mut outcomes = Vec::with_capacity(asb.security_targets.len());
    for (index, &target_number) in asb.security_targets.iter().enumerate() {
        let outcome = match variant {
            None => TargetOutcome::Misconfigured,
            Some(variant) => evaluate_bib_target(
                bundle,
                ctx,
                asb,
                index,
                target_number,
                security_header,
                variant,
                scope,
                params,
                role,
            ),
        };
        outcomes.push((target_number, outcome));
    }

    apply_outcomes(
        engine,
        bundle,
        ctx,
        asb,
        outcomes,
        role,
        event_set,
        security_block_number,
        asb_removed,
        dirty,
        drop_bundle,
    );
}

#[allow(clippy::too_many_arguments)]
fn evaluate_bib_target(
    bundle: &BundleView,
    ctx: &mut ProcessingContext,
    asb: &AbstractSecurityBlock,
    index: usize,
    target_number: u64,
    security_header: &CanonicalBlock,
    variant: ShaVariant,
    scope: ScopeFlags,
    params: &BibParams,
    role: BpSecRole,
) -> TargetOutcome {
    let Some(target_view) = bundle.block_by_number(target_number) else {
        return TargetOutcome::Misconfigured;
    };
    let Some(mac) = asb.result(index, BIB_RESULT_HMAC).and_then(AsbValue::as_bytes) else {
        return TargetOutcome::Misconfigured;
    };

    ctx.scope_scratch.clear();
    if append_scope_data(
        &mut ctx.scope_scratch,
        scope,
        &bundle.primary,
        &target_view.block,
        security_header,
    )
    .is_err()
    {
        return TargetOutcome::Misconfigured;
    }
    ctx.scope_scratch.extend_from_slice(&target_view.block.data);

    match hmac_sha_verify(variant, params.key.as_bytes(), &ctx.scope_scratch, mac) {
        Ok(()) => match role {
            BpSecRole::Acceptor => TargetOutcome::Accepted(None),
            _ => TargetOutcome::Verified,
        },
        Err(_) => TargetOutcome::Corrupt,
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_outcomes(
    engine: &PolicyEngine,
    bundle: &mut BundleView,
    ctx: &mut ProcessingContext,
    asb: &mut AbstractSecurityBlock,
    outcomes: Vec<(u64, TargetOutcome)>,
    role: BpSecRole,
    event_set: Option<EventSetHandle>,
    security_block_number: u64,
    asb_removed: &mut bool,
    dirty: &mut bool,
    drop_bundle: &mut bool,
) {
    for (target_number, outcome) in outcomes {
        match outcome {
            TargetOutcome::Accepted(plaintext) => {
                if let Some(plaintext) = plaintext {
                    if let Some(view) = bundle.block_by_number_mut(target_number) {
                        view.block.data = plaintext;
                        view.is_encrypted = false;
                    }
                }
                asb.remove_target(target_number);
                *dirty = true;
            }
            TargetOutcome::Verified => {}
            TargetOutcome::Corrupt => {
                fire_event(
                    engine,
                    event_set,
                    EventId::SopCorruptedAtAcceptor,
                    Some(target_number),
                    security_block_number,
                    bundle,
                    asb,
                    asb_removed,
                    dirty,
                    ctx,
                    drop_bundle,
                );
                // An acceptor that cannot recover the protected data must
                // not let the bundle continue.
                if role == BpSecRole::Acceptor {
                    *drop_bundle = true;
                }
            }
            TargetOutcome::Misconfigured => {
                fire_event(
                    engine,
                    event_set,
                    misconfigured_event(role),
                    Some(target_number),
                    security_block_number,
                    bundle,
                    asb,
                    asb_removed,
                    dirty,
                    ctx,
                    drop_bundle,
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fire_event(
    engine: &PolicyEngine,
    event_set: Option<EventSetHandle>,
    event: EventId,
    target: Option<u64>,
    security_block_number: u64,
    bundle: &mut BundleView,
    asb: &mut AbstractSecurityBlock,
    asb_removed: &mut bool,
    dirty: &mut bool,
    ctx: &mut ProcessingContext,
    drop_bundle: &mut bool,
) {
    let Some(handle) = event_set else {
        debug!(event = event.name(), "security failure with no event set bound");
        return;
    };
    let set = engine.event_sets().get(handle);
    let Some(actions) = set.actions(event) else {
        debug!(
            event = event.name(),
            event_set = %set.name,
            "event not defined in event set"
        );
        return;
    };
    debug!(
        event = event.name(),
        event_set = %set.name,
        block = security_block_number,
        ?target,
        "firing security failure event"
    );

    for action in actions {
        match action {
            EventAction::RemoveSecurityOperation => {
                if let Some(target) = target {
                    if asb.remove_target(target) {
                        *dirty = true;
                    }
                    if asb.is_empty() {
                        *asb_removed = true;
                    }
                }
            }
            EventAction::RemoveSecurityOperationTargetBlock => {
                if let Some(target) = target {
                    bundle.remove_block(target);
                    if asb.remove_target(target) {
                        *dirty = true;
                    }
                    if asb.is_empty() {
                        *asb_removed = true;
                    }
                }
            }
            EventAction::RemoveAllSecurityTargetOperations => {
                if let Some(target) = target {
                    if asb.remove_target(target) {
                        *dirty = true;
                    }
                    if asb.is_empty() {
                        *asb_removed = true;
                    }
                    strip_target_from_other_asbs(bundle, target, security_block_number);
                }
            }
            EventAction::DoNotForwardBundle => ctx.undeliverable = true,
            EventAction::FailBundleForwarding => *drop_bundle = true,
            EventAction::RequestBundleStorage => ctx.retention_requested = true,
            EventAction::ReportReasonCode => {
                ctx.pending_reason_codes.push(event.reason_code());
            }
            EventAction::OverrideSecurityTargetBlockBpcf(flags) => {
                if let Some(target) = target {
                    if let Some(view) = bundle.block_by_number_mut(target) {
                        view.block.flags = *flags;
                    }
                }
            }
            EventAction::OverrideSopBpcf(flags) => {
                if let Some(view) = bundle.block_by_number_mut(security_block_number) {
                    view.block.flags = *flags;
                }
            }
        }
    }
}

/// Remove `target` from every other security block's ASB; empty ASBs take
/// their block with them.
fn strip_target_from_other_asbs(bundle: &mut BundleView, target: u64, except: u64) {
    let mut numbers = bundle.block_numbers_by_type(BLOCK_TYPE_BCB);
    numbers.extend(bundle.block_numbers_by_type(BLOCK_TYPE_BIB));
    for number in numbers {
        if number == except {
            continue;
        }
        let Some(view) = bundle.block_by_number(number) else {
            continue;
        };
        let Ok(mut other) = AbstractSecurityBlock::decode(&view.block.data) else {
            continue;
        };
        if !other.remove_target(target) {
            continue;
        }
        if other.is_empty() {
            bundle.remove_block(number);
        } else if let Ok(data) = other.encode() {
            if let Some(view) = bundle.block_by_number_mut(number) {
                view.block.data = data;
            }
        }
    }
}
