//! Per-thread processing scratch state.

use crate::cache::PolicySearchCache;
use crate::events::BpSecReasonCode;
use crate::policy::{BpSecRole, ROLE_COUNT};

/// Scratch memory reused across the bundles one thread processes.
///
/// Holds one single-slot policy search cache per lookup role, so the
/// acceptor-then-verifier probe sequence of incoming processing stays
/// memoized, plus the per-bundle outcome the caller inspects after
/// `process_incoming`. A context is owned by the calling thread and never
/// shared; create one per worker and reuse it.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    caches: [PolicySearchCache; ROLE_COUNT],
    /// Assembly buffer for AAD / MAC input; capacity is reused across
    /// bundles.
    pub(crate) scope_scratch: Vec<u8>,
    /// Set by `doNotForwardBundle`: the caller must not forward the bundle.
    pub undeliverable: bool,
    /// Set by `requestBundleStorage`: the caller should retain the bundle.
    pub retention_requested: bool,
    /// Reason codes recorded by `reportReasonCode`, in firing order.
    pub pending_reason_codes: Vec<BpSecReasonCode>,
}

impl ProcessingContext {
    /// Create a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The search cache used for lookups under `role`.
    pub fn cache_for(&mut self, role: BpSecRole) -> &mut PolicySearchCache {
        &mut self.caches[role.index()]
    }

    /// Reset the per-bundle outcome; caches survive across bundles.
    pub(crate) fn begin_bundle(&mut self) {
        self.undeliverable = false;
        self.retention_requested = false;
        self.pending_reason_codes.clear();
    }
}
