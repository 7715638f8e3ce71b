//! End-to-end security processing: a source engine encrypts or signs a
//! bundle, a receiving engine verifies or accepts it.

use std::io::Write;
use std::path::Path;

use bpsec_codec::{
    BlockControlFlags, BundleControlFlags, BundleView, CanonicalBlock, CreationTimestamp, CrcType,
    PrimaryBlock, BLOCK_TYPE_BCB, BLOCK_TYPE_BIB, BLOCK_TYPE_PAYLOAD,
};
use bpsec_eid::Eid;
use bpsec_policy::{
    BpSecReasonCode, BpSecRole, BundleDisposition, PolicyEngine, ProcessingContext,
};

const PAYLOAD: &[u8] = b"This is the data inside the bpv7 payload block!!!";
const EXTENSION: &[u8] = b"My custom extension block.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_bundle() -> Vec<u8> {
    let mut bundle = BundleView::new(PrimaryBlock {
        bundle_flags: BundleControlFlags::NO_FRAGMENT,
        crc_type: CrcType::None,
        destination: Eid::new(2, 1),
        source: Eid::new(1, 1),
        report_to: Eid::new(0, 0),
        creation_timestamp: CreationTimestamp {
            dtn_time_ms: 1000,
            sequence_number: 1,
        },
        lifetime_ms: 1000,
    });
    bundle.append_block(CanonicalBlock {
        block_type: 4,
        block_number: 2,
        flags: BlockControlFlags::REMOVE_BLOCK_IF_UNPROCESSABLE,
        crc_type: CrcType::None,
        data: EXTENSION.to_vec(),
    });
    bundle.append_block(CanonicalBlock {
        block_type: BLOCK_TYPE_PAYLOAD,
        block_number: 1,
        flags: BlockControlFlags::REMOVE_BLOCK_IF_UNPROCESSABLE,
        crc_type: CrcType::None,
        data: PAYLOAD.to_vec(),
    });
    bundle.to_bytes().unwrap()
}

fn write_key(dir: &Path, name: &str, fill: u8) -> String {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&[fill; 32]).unwrap();
    path.display().to_string()
}

fn source_config(key_path: &str) -> String {
    format!(
        r#"{{
            "bpsecConfigName": "my BPSec Config",
            "policyRules": [
                {{
                    "description": "Confidentiality source rule",
                    "securityPolicyRuleId": 1,
                    "securityRole": "source",
                    "securitySource": "ipn:10.*",
                    "bundleSource": ["ipn:*.*"],
                    "bundleFinalDestination": ["ipn:*.*"],
                    "securityTargetBlockTypes": [1],
                    "securityService": "confidentiality",
                    "securityContext": "aesGcm",
                    "securityFailureEventSetReference": "default_confidentiality",
                    "securityContextParams": [
                        {{ "paramName": "aesVariant", "value": 256 }},
                        {{ "paramName": "ivSizeBytes", "value": 12 }},
                        {{ "paramName": "keyFile", "value": "{key_path}" }},
                        {{ "paramName": "securityBlockCrc", "value": 0 }},
                        {{ "paramName": "scopeFlags", "value": 7 }}
                    ]
                }}
            ],
            "securityFailureEventSets": [
                {{
                    "name": "default_confidentiality",
                    "description": "default bcb confidentiality security operations event set",
                    "securityOperationEvents": [
                        {{
                            "eventId": "sopCorruptedAtAcceptor",
                            "actions": ["removeSecurityOperation"]
                        }},
                        {{
                            "eventId": "sopMisconfiguredAtVerifier",
                            "actions": ["failBundleForwarding", "reportReasonCode"]
                        }}
                    ]
                }}
            ]
        }}"#
    )
}

fn acceptor_config(key_path: &str) -> String {
    format!(
        r#"{{
            "bpsecConfigName": "my BPSec Config",
            "policyRules": [
                {{
                    "description": "Confidentiality acceptor rule",
                    "securityPolicyRuleId": 1,
                    "securityRole": "acceptor",
                    "securitySource": "ipn:10.1",
                    "bundleSource": ["ipn:*.*"],
                    "bundleFinalDestination": ["ipn:*.*"],
                    "securityService": "confidentiality",
                    "securityContext": "aesGcm",
                    "securityFailureEventSetReference": "default_confidentiality",
                    "securityContextParams": [
                        {{ "paramName": "keyFile", "value": "{key_path}" }}
                    ]
                }}
            ],
            "securityFailureEventSets": [
                {{
                    "name": "default_confidentiality",
                    "securityOperationEvents": [
                        {{
                            "eventId": "sopCorruptedAtAcceptor",
                            "actions": ["removeSecurityOperation"]
                        }}
                    ]
                }}
            ]
        }}"#
    )
}

/// Encrypt at a security source configured for `ipn:10.*`.
fn encrypt_at_source(dir: &Path) -> Vec<u8> {
    let key_path = write_key(dir, "ipn10.1_confidentiality.key", 0xA5);
    let engine = PolicyEngine::load_from_json(&source_config(&key_path)).unwrap();
    assert!(engine
        .find_policy(
            Eid::new(10, 1),
            Eid::new(1, 1),
            Eid::new(2, 1),
            BpSecRole::Source
        )
        .is_some());

    let original = build_bundle();
    let mut bundle = BundleView::from_bytes(&original).unwrap();
    let mut ctx = ProcessingContext::new();
    let applied = engine
        .process_outgoing(&mut bundle, &mut ctx, Eid::new(10, 1))
        .unwrap();
    assert!(applied);

    let encrypted = bundle.to_bytes().unwrap();
    // The bundle grows with the added security block.
    assert!(encrypted.len() > original.len());
    encrypted
}

#[test]
fn confidentiality_roundtrip_decrypts_the_payload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let encrypted = encrypt_at_source(dir.path());

    let key_path = write_key(dir.path(), "rx_ipn10.1_confidentiality.key", 0xA5);
    let engine = PolicyEngine::load_from_json(&acceptor_config(&key_path)).unwrap();
    assert!(engine
        .find_policy(
            Eid::new(10, 1),
            Eid::new(1, 1),
            Eid::new(2, 1),
            BpSecRole::Acceptor
        )
        .is_some());

    let mut bundle = BundleView::from_bytes(&encrypted).unwrap();
    let payload = bundle.block_by_number(1).unwrap();
    assert!(payload.is_encrypted);
    assert_ne!(payload.block.data, PAYLOAD);

    let mut ctx = ProcessingContext::new();
    assert_eq!(
        engine.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Accept
    );

    let payload = bundle.block_by_number(1).unwrap();
    assert_eq!(payload.block.data, PAYLOAD);
    assert!(!payload.is_encrypted);
    // The fully processed BCB is stripped.
    assert!(bundle.block_numbers_by_type(BLOCK_TYPE_BCB).is_empty());
    // The untargeted extension block is untouched.
    assert_eq!(bundle.block_by_number(2).unwrap().block.data, EXTENSION);
    assert!(!ctx.undeliverable);
}

#[test]
fn wrong_acceptor_key_drops_the_bundle() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let encrypted = encrypt_at_source(dir.path());

    // The acceptor references a different key.
    let key_path = write_key(dir.path(), "ipn1.1_confidentiality.key", 0x3C);
    let engine = PolicyEngine::load_from_json(&acceptor_config(&key_path)).unwrap();

    let mut bundle = BundleView::from_bytes(&encrypted).unwrap();
    let mut ctx = ProcessingContext::new();
    assert_eq!(
        engine.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Drop
    );
    // No plaintext was exposed.
    let payload = bundle.block_by_number(1).unwrap();
    assert_ne!(payload.block.data, PAYLOAD);
    assert!(payload.is_encrypted);
}

#[test]
fn tampered_ciphertext_drops_the_bundle() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let encrypted = encrypt_at_source(dir.path());

    let key_path = write_key(dir.path(), "rx_ipn10.1_confidentiality.key", 0xA5);
    let engine = PolicyEngine::load_from_json(&acceptor_config(&key_path)).unwrap();

    let mut bundle = BundleView::from_bytes(&encrypted).unwrap();
    let payload = bundle.block_by_number_mut(1).unwrap();
    payload.block.data[0] ^= 0xFF;

    let mut ctx = ProcessingContext::new();
    assert_eq!(
        engine.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Drop
    );
}

fn integrity_config(role: &str, security_source: &str, key_path: &str) -> String {
    format!(
        r#"{{
            "bpsecConfigName": "integrity",
            "policyRules": [
                {{
                    "securityPolicyRuleId": 2,
                    "securityRole": "{role}",
                    "securitySource": "{security_source}",
                    "bundleSource": ["ipn:*.*"],
                    "bundleFinalDestination": ["ipn:*.*"],
                    "securityTargetBlockTypes": [1],
                    "securityService": "integrity",
                    "securityContext": "hmacSha",
                    "securityFailureEventSetReference": "default_integrity",
                    "securityContextParams": [
                        {{ "paramName": "shaVariant", "value": 512 }},
                        {{ "paramName": "scopeFlags", "value": 7 }},
                        {{ "paramName": "keyFile", "value": "{key_path}" }}
                    ]
                }}
            ],
            "securityFailureEventSets": [
                {{
                    "name": "default_integrity",
                    "securityOperationEvents": [
                        {{
                            "eventId": "sopCorruptedAtAcceptor",
                            "actions": ["removeSecurityOperation", "doNotForwardBundle"]
                        }}
                    ]
                }}
            ]
        }}"#
    )
}

#[test]
fn integrity_verify_then_accept() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let key_path = write_key(dir.path(), "ipn10.1_integrity.key", 0x77);

    // Sign at the source.
    let tx = PolicyEngine::load_from_json(&integrity_config("source", "ipn:10.*", &key_path))
        .unwrap();
    let mut bundle = BundleView::from_bytes(&build_bundle()).unwrap();
    let mut ctx = ProcessingContext::new();
    assert!(tx
        .process_outgoing(&mut bundle, &mut ctx, Eid::new(10, 1))
        .unwrap());
    let signed = bundle.to_bytes().unwrap();

    // An intermediate verifier leaves the BIB in place.
    let verifier =
        PolicyEngine::load_from_json(&integrity_config("verifier", "ipn:10.1", &key_path))
            .unwrap();
    let mut bundle = BundleView::from_bytes(&signed).unwrap();
    let mut ctx = ProcessingContext::new();
    assert_eq!(
        verifier.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Accept
    );
    assert_eq!(bundle.block_numbers_by_type(BLOCK_TYPE_BIB).len(), 1);
    assert_eq!(bundle.block_by_number(1).unwrap().block.data, PAYLOAD);

    // The acceptor strips the processed BIB.
    let acceptor =
        PolicyEngine::load_from_json(&integrity_config("acceptor", "ipn:10.1", &key_path))
            .unwrap();
    let mut bundle = BundleView::from_bytes(&signed).unwrap();
    let mut ctx = ProcessingContext::new();
    assert_eq!(
        acceptor.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Accept
    );
    assert!(bundle.block_numbers_by_type(BLOCK_TYPE_BIB).is_empty());
    assert_eq!(bundle.block_by_number(1).unwrap().block.data, PAYLOAD);
}

#[test]
fn verifier_failure_follows_event_actions_without_dropping() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let key_path = write_key(dir.path(), "ipn10.1_integrity.key", 0x77);
    let wrong_key_path = write_key(dir.path(), "wrong_integrity.key", 0x78);

    let tx = PolicyEngine::load_from_json(&integrity_config("source", "ipn:10.*", &key_path))
        .unwrap();
    let mut bundle = BundleView::from_bytes(&build_bundle()).unwrap();
    let mut ctx = ProcessingContext::new();
    assert!(tx
        .process_outgoing(&mut bundle, &mut ctx, Eid::new(10, 1))
        .unwrap());
    let signed = bundle.to_bytes().unwrap();

    // A verifier with the wrong key sees corruption; its event set says
    // doNotForwardBundle rather than dropping outright.
    let verifier =
        PolicyEngine::load_from_json(&integrity_config("verifier", "ipn:10.1", &wrong_key_path))
            .unwrap();
    let mut bundle = BundleView::from_bytes(&signed).unwrap();
    let mut ctx = ProcessingContext::new();
    assert_eq!(
        verifier.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Accept
    );
    assert!(ctx.undeliverable);
}

#[test]
fn missing_policy_fires_the_default_event_set() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let key_path = write_key(dir.path(), "ipn10.1_confidentiality.key", 0xA5);
    let encrypted = {
        let engine = PolicyEngine::load_from_json(&source_config(&key_path)).unwrap();
        let mut bundle = BundleView::from_bytes(&build_bundle()).unwrap();
        let mut ctx = ProcessingContext::new();
        assert!(engine
            .process_outgoing(&mut bundle, &mut ctx, Eid::new(10, 1))
            .unwrap());
        bundle.to_bytes().unwrap()
    };

    // A node with no matching policy, only a default event set.
    let rx_config = r#"{
        "bpsecConfigName": "no rules",
        "securityFailureEventSets": [
            {
                "name": "default",
                "securityOperationEvents": [
                    {
                        "eventId": "sopMissingAtAcceptor",
                        "actions": ["doNotForwardBundle", "reportReasonCode"]
                    }
                ]
            }
        ]
    }"#;
    let engine = PolicyEngine::load_from_json(rx_config).unwrap();
    let mut bundle = BundleView::from_bytes(&encrypted).unwrap();
    let mut ctx = ProcessingContext::new();
    assert_eq!(
        engine.process_incoming(&mut bundle, &mut ctx),
        BundleDisposition::Accept
    );
    assert!(ctx.undeliverable);
    assert_eq!(
        ctx.pending_reason_codes,
        vec![BpSecReasonCode::MissingSecurityOperation]
    );
    // The unprocessed security block stays on the bundle.
    assert_eq!(bundle.block_numbers_by_type(BLOCK_TYPE_BCB).len(), 1);
}
