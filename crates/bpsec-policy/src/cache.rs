//! Single-slot memoization of policy lookups.

use bpsec_eid::Eid;

use crate::policy::{BpSecRole, PolicyHandle};

/// Memo of the most recent policy lookup.
///
/// Bundles between the same endpoints arrive in runs, so one slot removes
/// almost every tree walk from the steady-state path. The cache stores the
/// result even when it is absent. It is owned by a processing context and
/// never shared between threads; swapping in a rebuilt store discards the
/// contexts (and with them these caches), so a stale handle can never cross
/// a rebuild.
#[derive(Debug, Clone, Default)]
pub struct PolicySearchCache {
    /// The memoized query tuple.
    pub(crate) last_query: Option<(Eid, Eid, Eid, BpSecRole)>,
    /// The memoized result; `None` is a cached negative.
    pub(crate) last_result: Option<PolicyHandle>,
    /// Whether the most recent lookup was answered from the cache.
    pub was_cache_hit: bool,
}

impl PolicySearchCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the memoized query.
    pub fn clear(&mut self) {
        self.last_query = None;
        self.last_result = None;
        self.was_cache_hit = false;
    }
}
