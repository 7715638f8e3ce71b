//! The loaded policy engine.

use bpsec_codec::BundleView;
use bpsec_config::BpSecConfig;
use bpsec_eid::Eid;

use crate::context::ProcessingContext;
use crate::error::{LoadError, ProcessingError};
use crate::events::{EventSetHandle, EventSetRegistry};
use crate::policy::{BpSecRole, PolicyHandle};
use crate::store::PolicyStore;
use crate::{incoming, loader, outgoing};

/// Outcome of incoming processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleDisposition {
    /// Forward/deliver the bundle (with mutations applied).
    Accept,
    /// Discard the bundle.
    Drop,
}

/// An immutable, fully resolved policy set ready for concurrent use.
///
/// The loader produces an engine as a value; callers share it behind an
/// `Arc` and attach per-thread [`ProcessingContext`]s. Rebuilding a changed
/// configuration produces a fresh engine; swapping it in retires every
/// handle issued by the old one together with the contexts that cached
/// them.
#[derive(Debug)]
pub struct PolicyEngine {
    pub(crate) config_name: String,
    pub(crate) store: PolicyStore,
    pub(crate) event_sets: EventSetRegistry,
    pub(crate) default_event_set: Option<EventSetHandle>,
}

impl PolicyEngine {
    /// Build an engine from a validated configuration record.
    ///
    /// # Errors
    ///
    /// Returns the first load failure; no partial state escapes.
    pub fn load_from_config(config: &BpSecConfig) -> Result<Self, LoadError> {
        loader::load(config)
    }

    /// Parse a JSON configuration and build an engine from it.
    ///
    /// # Errors
    ///
    /// Returns configuration or load failures.
    pub fn load_from_json(json: &str) -> Result<Self, LoadError> {
        let config = BpSecConfig::from_json_str(json)?;
        loader::load(&config)
    }

    /// Operator-assigned configuration name.
    #[must_use]
    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    /// The policy store.
    #[must_use]
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// The event-set registry.
    #[must_use]
    pub fn event_sets(&self) -> &EventSetRegistry {
        &self.event_sets
    }

    /// The bundle-wide default event set (the first declared one).
    #[must_use]
    pub fn default_event_set(&self) -> Option<EventSetHandle> {
        self.default_event_set
    }

    /// Uncached best-match lookup, mostly useful in tests and telemetry.
    #[must_use]
    pub fn find_policy(
        &self,
        security_source: Eid,
        bundle_source: Eid,
        bundle_final_destination: Eid,
        role: BpSecRole,
    ) -> Option<PolicyHandle> {
        self.store
            .find(security_source, bundle_source, bundle_final_destination, role)
    }

    /// Apply the best-match source policy to a departing bundle.
    ///
    /// Returns whether a security block was attached.
    ///
    /// # Errors
    ///
    /// Returns an error when a cryptographic or encoding step fails; the
    /// bundle must not be emitted in that case.
    pub fn process_outgoing(
        &self,
        bundle: &mut BundleView,
        ctx: &mut ProcessingContext,
        local_security_source: Eid,
    ) -> Result<bool, ProcessingError> {
        outgoing::process_outgoing(self, bundle, ctx, local_security_source)
    }

    /// Verify/accept the security operations on a received bundle.
    ///
    /// Never fails; all runtime failures route through event sets. Inspect
    /// `ctx` afterwards for the undeliverable/retention markers and any
    /// recorded status-report reason codes.
    pub fn process_incoming(
        &self,
        bundle: &mut BundleView,
        ctx: &mut ProcessingContext,
    ) -> BundleDisposition {
        incoming::process_incoming(self, bundle, ctx)
    }
}
