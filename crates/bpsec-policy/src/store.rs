//! The policy store: a wildcard decision tree over EID pattern axes.
//!
//! Policies are keyed by three patterns in priority order security source,
//! bundle source, bundle final destination, each contributing a node axis
//! and a service axis. The tree descends six matcher levels, trying `Exact`
//! before `Any` at every level, so an exact pattern always wins over a
//! wildcard on the highest-priority axis where they differ. Lookup is
//! allocation-free; terminals hold one policy handle per role.

use std::collections::HashMap;
use std::str::FromStr;

use bpsec_eid::{Eid, EidPattern, PatternMatcher};

use crate::cache::PolicySearchCache;
use crate::policy::{BpSecPolicy, BpSecRole, PolicyHandle, ROLE_COUNT};

const AXIS_COUNT: usize = 6;

#[derive(Debug, Default)]
struct PatternNode {
    exact: HashMap<u64, PatternNode>,
    any: Option<Box<PatternNode>>,
    terminal: Option<[Option<PolicyHandle>; ROLE_COUNT]>,
}

impl PatternNode {
    fn child_mut(&mut self, matcher: PatternMatcher) -> &mut PatternNode {
        match matcher {
            PatternMatcher::Exact(value) => self.exact.entry(value).or_default(),
            PatternMatcher::Any => self.any.get_or_insert_with(Box::default),
        }
    }
}

fn descend(node: &PatternNode, axes: &[u64], role_index: usize) -> Option<PolicyHandle> {
    let Some((&value, rest)) = axes.split_first() else {
        return node.terminal.as_ref().and_then(|slots| slots[role_index]);
    };
    if let Some(child) = node.exact.get(&value) {
        if let Some(found) = descend(child, rest, role_index) {
            return Some(found);
        }
    }
    node.any
        .as_deref()
        .and_then(|child| descend(child, rest, role_index))
}

/// Deduplicating store of security policies with best-match lookup.
#[derive(Debug, Default)]
pub struct PolicyStore {
    arena: Vec<BpSecPolicy>,
    root: PatternNode,
}

impl PolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the store holds no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Borrow the policy behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was issued by a different store.
    #[must_use]
    pub fn policy(&self, handle: PolicyHandle) -> &BpSecPolicy {
        &self.arena[handle.0 as usize]
    }

    /// Mutable access for the loader; only valid before the engine is
    /// published.
    pub(crate) fn policy_mut(&mut self, handle: PolicyHandle) -> &mut BpSecPolicy {
        &mut self.arena[handle.0 as usize]
    }

    /// Parse the three patterns and insert a policy at `(patterns, role)` if
    /// absent.
    ///
    /// Returns the stable handle plus whether the policy is new, or `None`
    /// without mutating the store when any pattern fails to parse.
    pub fn create_or_get(
        &mut self,
        security_source: &str,
        bundle_source: &str,
        bundle_final_destination: &str,
        role: BpSecRole,
    ) -> Option<(PolicyHandle, bool)> {
        let ss = EidPattern::from_str(security_source).ok()?;
        let bs = EidPattern::from_str(bundle_source).ok()?;
        let bd = EidPattern::from_str(bundle_final_destination).ok()?;

        let mut node = &mut self.root;
        for matcher in [ss.node, ss.service, bs.node, bs.service, bd.node, bd.service] {
            node = node.child_mut(matcher);
        }
        let slots = node.terminal.get_or_insert_with(Default::default);
        if let Some(existing) = slots[role.index()] {
            return Some((existing, false));
        }
        let handle = PolicyHandle(u32::try_from(self.arena.len()).ok()?);
        self.arena.push(BpSecPolicy::new(role));
        slots[role.index()] = Some(handle);
        Some((handle, true))
    }

    /// Find the most specific policy matching the three EIDs under `role`.
    #[must_use]
    pub fn find(
        &self,
        security_source: Eid,
        bundle_source: Eid,
        bundle_final_destination: Eid,
        role: BpSecRole,
    ) -> Option<PolicyHandle> {
        let axes = [
            security_source.node_id,
            security_source.service_id,
            bundle_source.node_id,
            bundle_source.service_id,
            bundle_final_destination.node_id,
            bundle_final_destination.service_id,
        ];
        debug_assert_eq!(axes.len(), AXIS_COUNT);
        descend(&self.root, &axes, role.index())
    }

    /// Like [`find`](Self::find) but memoized through a single-slot cache.
    ///
    /// The repeated query of a processing context hits the cache without
    /// touching the tree; negative results are cached too. Coherence holds
    /// while the store is unchanged, which the engine guarantees by never
    /// mutating a published store.
    pub fn find_with_cache(
        &self,
        security_source: Eid,
        bundle_source: Eid,
        bundle_final_destination: Eid,
        role: BpSecRole,
        cache: &mut PolicySearchCache,
    ) -> Option<PolicyHandle> {
        let query = (security_source, bundle_source, bundle_final_destination, role);
        if cache.last_query == Some(query) {
            cache.was_cache_hit = true;
            return cache.last_result;
        }
        let result = self.find(security_source, bundle_source, bundle_final_destination, role);
        cache.last_query = Some(query);
        cache.last_result = result;
        cache.was_cache_hit = false;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANY: &str = "ipn:*.*";

    #[test]
    fn bad_syntax_is_rejected_without_mutation() {
        let mut store = PolicyStore::new();
        assert!(store
            .create_or_get("ipn:**.*", ANY, ANY, BpSecRole::Acceptor)
            .is_none());
        assert!(store
            .create_or_get(ANY, "ipn:*.**", ANY, BpSecRole::Acceptor)
            .is_none());
        assert!(store
            .create_or_get(ANY, ANY, "ipn:***.*", BpSecRole::Acceptor)
            .is_none());
        assert!(store.create_or_get("", ANY, ANY, BpSecRole::Acceptor).is_none());
        assert!(store
            .create_or_get("ipn:", ANY, ANY, BpSecRole::Acceptor)
            .is_none());
        assert!(store
            .create_or_get("ipn:1x.2", ANY, ANY, BpSecRole::Acceptor)
            .is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_keys_return_the_same_policy_once() {
        let mut store = PolicyStore::new();
        let (acceptor, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert!(is_new);
        let (again, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert_eq!(again, acceptor);
        assert!(!is_new);
        let (third, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert_eq!(third, acceptor);
        assert!(!is_new);

        // Roles are independent at the same key.
        let (source, is_new) = store.create_or_get(ANY, ANY, ANY, BpSecRole::Source).unwrap();
        assert!(is_new);
        assert_ne!(source, acceptor);
        let (source_again, is_new) = store.create_or_get(ANY, ANY, ANY, BpSecRole::Source).unwrap();
        assert_eq!(source_again, source);
        assert!(!is_new);

        let (verifier, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Verifier)
            .unwrap();
        assert!(is_new);
        assert_ne!(verifier, acceptor);
        assert_ne!(verifier, source);
        let (verifier_again, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Verifier)
            .unwrap();
        assert_eq!(verifier_again, verifier);
        assert!(!is_new);
    }

    #[test]
    fn create_and_find_prefers_the_specific_policy() {
        let mut store = PolicyStore::new();
        let ss = Eid::new(1, 1);
        let bs = Eid::new(2, 1);
        let bd = Eid::new(3, 1);
        assert!(store.find(ss, bs, bd, BpSecRole::Acceptor).is_none());
        assert!(store.find(ss, bs, bd, BpSecRole::Acceptor).is_none());

        let (wildcard, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert!(is_new);
        assert_eq!(store.find(ss, bs, bd, BpSecRole::Acceptor), Some(wildcard));
        assert_eq!(store.find(ss, bs, bd, BpSecRole::Acceptor), Some(wildcard));

        let (specific, is_new) = store
            .create_or_get("ipn:1.1", ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert!(is_new);
        assert_ne!(specific, wildcard);
        assert_eq!(store.find(ss, bs, bd, BpSecRole::Acceptor), Some(specific));
        // ipn:1.2 misses the exact subtree and falls back to the wildcard.
        assert_eq!(
            store.find(Eid::new(1, 2), bs, bd, BpSecRole::Acceptor),
            Some(wildcard)
        );
        assert!(store.find(Eid::new(1, 2), bs, bd, BpSecRole::Verifier).is_none());
        assert!(store.find(ss, bs, bd, BpSecRole::Verifier).is_none());
    }

    #[test]
    fn brute_force_matrix() {
        // One axis exact per rule, the rest wildcards; each probe tuple must
        // select exactly its rule.
        let cases: [[&str; 3]; 7] = [
            ["ipn:*.*", "ipn:*.*", "ipn:*.*"],
            ["ipn:1.1", "ipn:*.*", "ipn:*.*"],
            ["ipn:1.*", "ipn:*.*", "ipn:*.*"],
            ["ipn:*.*", "ipn:2.1", "ipn:*.*"],
            ["ipn:*.*", "ipn:2.*", "ipn:*.*"],
            ["ipn:*.*", "ipn:*.*", "ipn:3.1"],
            ["ipn:*.*", "ipn:*.*", "ipn:3.*"],
        ];
        let probes: [[Eid; 3]; 7] = [
            [Eid::new(10, 10), Eid::new(20, 10), Eid::new(30, 10)],
            [Eid::new(1, 1), Eid::new(20, 10), Eid::new(30, 10)],
            [Eid::new(1, 10), Eid::new(20, 10), Eid::new(30, 10)],
            [Eid::new(10, 10), Eid::new(2, 1), Eid::new(30, 10)],
            [Eid::new(10, 10), Eid::new(2, 10), Eid::new(30, 10)],
            [Eid::new(10, 10), Eid::new(20, 10), Eid::new(3, 1)],
            [Eid::new(10, 10), Eid::new(20, 10), Eid::new(3, 10)],
        ];

        let mut store = PolicyStore::new();
        let mut handles = Vec::new();
        for case in &cases {
            let (handle, is_new) = store
                .create_or_get(case[0], case[1], case[2], BpSecRole::Acceptor)
                .unwrap();
            assert!(is_new);
            assert!(!handles.contains(&handle));
            handles.push(handle);
        }
        for (case_index, probe) in probes.iter().enumerate() {
            let found = store
                .find(probe[0], probe[1], probe[2], BpSecRole::Acceptor)
                .unwrap();
            assert_eq!(found, handles[case_index], "probe {case_index}");
        }
    }

    #[test]
    fn cache_hits_and_misses() {
        let mut store = PolicyStore::new();
        let mut cache = PolicySearchCache::default();
        let ss = Eid::new(1, 1);
        let bs = Eid::new(2, 1);
        let bd = Eid::new(3, 1);
        let (wildcard, is_new) = store
            .create_or_get(ANY, ANY, ANY, BpSecRole::Acceptor)
            .unwrap();
        assert!(is_new);

        let found = store.find_with_cache(ss, bs, bd, BpSecRole::Acceptor, &mut cache);
        assert_eq!(found, Some(wildcard));
        assert!(!cache.was_cache_hit);
        let found = store.find_with_cache(ss, bs, bd, BpSecRole::Acceptor, &mut cache);
        assert_eq!(found, Some(wildcard));
        assert!(cache.was_cache_hit);

        // New query tuple.
        let ss2 = Eid::new(10, 1);
        let found = store.find_with_cache(ss2, bs, bd, BpSecRole::Acceptor, &mut cache);
        assert_eq!(found, Some(wildcard));
        assert!(!cache.was_cache_hit);
        let found = store.find_with_cache(ss2, bs, bd, BpSecRole::Acceptor, &mut cache);
        assert_eq!(found, Some(wildcard));
        assert!(cache.was_cache_hit);
    }

    #[test]
    fn negative_results_are_cached() {
        let store = PolicyStore::new();
        let mut cache = PolicySearchCache::default();
        let ss = Eid::new(1, 1);
        let bs = Eid::new(2, 1);
        let bd = Eid::new(3, 1);

        assert!(store
            .find_with_cache(ss, bs, bd, BpSecRole::Acceptor, &mut cache)
            .is_none());
        assert!(!cache.was_cache_hit);
        assert!(store
            .find_with_cache(ss, bs, bd, BpSecRole::Acceptor, &mut cache)
            .is_none());
        assert!(cache.was_cache_hit);
    }

    #[test]
    fn found_policy_actually_matches_the_query() {
        let mut store = PolicyStore::new();
        store
            .create_or_get("ipn:1.*", "ipn:2.1", ANY, BpSecRole::Verifier)
            .unwrap();
        let handle = store
            .find(Eid::new(1, 9), Eid::new(2, 1), Eid::new(7, 7), BpSecRole::Verifier)
            .unwrap();
        assert_eq!(store.policy(handle).role, BpSecRole::Verifier);
        // An EID outside the bundle-source exact pattern must not match.
        assert!(store
            .find(Eid::new(1, 9), Eid::new(2, 2), Eid::new(7, 7), BpSecRole::Verifier)
            .is_none());
    }
}
