//! Translation of a validated configuration record into a live engine.

use bpsec_config::BpSecConfig;
use tracing::warn;

use crate::contexts::SecurityContextRegistry;
use crate::engine::PolicyEngine;
use crate::error::LoadError;
use crate::events::{EventSet, EventSetRegistry};
use crate::policy::BpSecRole;
use crate::store::PolicyStore;

pub(crate) fn load(config: &BpSecConfig) -> Result<PolicyEngine, LoadError> {
    build(config).map_err(|err| {
        warn!(config = %config.bpsec_config_name, %err, "BPSec policy load failed");
        err
    })
}

fn build(config: &BpSecConfig) -> Result<PolicyEngine, LoadError> {
    config.validate()?;

    let mut event_sets = EventSetRegistry::default();
    for set_config in &config.security_failure_event_sets {
        if event_sets.register(EventSet::from_config(set_config)).is_none() {
            return Err(LoadError::Resolve {
                rule_id: 0,
                name: set_config.name.clone(),
            });
        }
    }
    let default_event_set = event_sets.first();

    let contexts = SecurityContextRegistry::new();
    let mut store = PolicyStore::new();
    for rule in &config.policy_rules {
        let role = BpSecRole::from(rule.security_role);
        let event_set = event_sets
            .lookup(&rule.security_failure_event_set_reference)
            .ok_or_else(|| LoadError::Resolve {
                rule_id: rule.security_policy_rule_id,
                name: rule.security_failure_event_set_reference.clone(),
            })?;
        let operation = contexts.resolve(role, rule)?;

        // A rule with several bundle-source or destination patterns expands
        // to their cross product.
        for bundle_source in &rule.bundle_source {
            for bundle_final_destination in &rule.bundle_final_destination {
                let Some((handle, is_new)) = store.create_or_get(
                    &rule.security_source,
                    bundle_source,
                    bundle_final_destination,
                    role,
                ) else {
                    return Err(LoadError::RulePattern {
                        rule_id: rule.security_policy_rule_id,
                        pattern: format!(
                            "{} / {} / {}",
                            rule.security_source, bundle_source, bundle_final_destination
                        ),
                    });
                };
                if !is_new {
                    return Err(LoadError::DuplicateRule {
                        rule_id: rule.security_policy_rule_id,
                        security_source: rule.security_source.clone(),
                        bundle_source: bundle_source.clone(),
                        bundle_final_destination: bundle_final_destination.clone(),
                        role: role.name(),
                    });
                }
                let policy = store.policy_mut(handle);
                policy.rule_id = rule.security_policy_rule_id;
                policy.description = rule.description.clone();
                policy.target_block_types = rule.security_target_block_types.clone();
                policy.operation = Some(operation.clone());
                policy.event_set = Some(event_set);
            }
        }
    }

    Ok(PolicyEngine {
        config_name: config.bpsec_config_name.clone(),
        store,
        event_sets,
        default_event_set,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use bpsec_eid::Eid;

    use crate::policy::BpSecRole;

    fn write_key(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0x42; len]).unwrap();
        file
    }

    fn rule_json(role: &str, security_source: &str, key_path: &str) -> String {
        format!(
            r#"{{
                "securityPolicyRuleId": 1,
                "securityRole": "{role}",
                "securitySource": "{security_source}",
                "bundleSource": ["ipn:1.*", "ipn:2.*"],
                "bundleFinalDestination": ["ipn:3.*", "ipn:4.*"],
                "securityTargetBlockTypes": [1],
                "securityService": "confidentiality",
                "securityContext": "aesGcm",
                "securityFailureEventSetReference": "es",
                "securityContextParams": [
                    {{ "paramName": "keyFile", "value": "{key_path}" }}
                ]
            }}"#
        )
    }

    fn config_json(rules: &[String]) -> String {
        format!(
            r#"{{
                "bpsecConfigName": "loader test",
                "policyRules": [{}],
                "securityFailureEventSets": [
                    {{
                        "name": "es",
                        "securityOperationEvents": [
                            {{ "eventId": "sopCorruptedAtAcceptor", "actions": ["removeSecurityOperation"] }}
                        ]
                    }}
                ]
            }}"#,
            rules.join(",")
        )
    }

    #[test]
    fn cross_product_expansion() {
        let key = write_key(32);
        let json = config_json(&[rule_json(
            "acceptor",
            "ipn:10.*",
            &key.path().display().to_string(),
        )]);
        let engine = PolicyEngine::load_from_json(&json).unwrap();
        // 2 bundle sources x 2 destinations.
        assert_eq!(engine.store().len(), 4);
        for (bs, bd) in [(1, 3), (1, 4), (2, 3), (2, 4)] {
            assert!(engine
                .find_policy(
                    Eid::new(10, 1),
                    Eid::new(bs, 9),
                    Eid::new(bd, 9),
                    BpSecRole::Acceptor
                )
                .is_some());
        }
        assert!(engine
            .find_policy(
                Eid::new(10, 1),
                Eid::new(5, 9),
                Eid::new(3, 9),
                BpSecRole::Acceptor
            )
            .is_none());
    }

    #[test]
    fn duplicate_rules_abort_the_load() {
        let key = write_key(32);
        let path = key.path().display().to_string();
        let rule = rule_json("acceptor", "ipn:10.*", &path);
        let json = config_json(&[rule.clone(), rule]);
        let err = PolicyEngine::load_from_json(&json).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateRule { rule_id: 1, .. }));
    }

    #[test]
    fn same_patterns_different_roles_coexist() {
        let key = write_key(32);
        let path = key.path().display().to_string();
        let json = config_json(&[
            rule_json("acceptor", "ipn:10.*", &path),
            rule_json("verifier", "ipn:10.*", &path),
        ]);
        let engine = PolicyEngine::load_from_json(&json).unwrap();
        assert_eq!(engine.store().len(), 8);
    }

    #[test]
    fn missing_key_file_aborts_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.key").display().to_string();
        let json = config_json(&[rule_json("acceptor", "ipn:10.*", &missing)]);
        let err = PolicyEngine::load_from_json(&json).unwrap_err();
        assert!(matches!(err, LoadError::KeyLoad { rule_id: 1, .. }));
    }

    #[test]
    fn policies_carry_their_event_set() {
        let key = write_key(32);
        let json = config_json(&[rule_json(
            "acceptor",
            "ipn:10.*",
            &key.path().display().to_string(),
        )]);
        let engine = PolicyEngine::load_from_json(&json).unwrap();
        let handle = engine
            .find_policy(
                Eid::new(10, 1),
                Eid::new(1, 1),
                Eid::new(3, 1),
                BpSecRole::Acceptor,
            )
            .unwrap();
        let policy = engine.store().policy(handle);
        let event_set = policy.event_set.unwrap();
        assert_eq!(engine.event_sets().get(event_set).name, "es");
        assert_eq!(engine.default_event_set(), Some(event_set));
    }
}
