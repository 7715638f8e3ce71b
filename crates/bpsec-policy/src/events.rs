//! Security failure events, their action lists, and the event-set registry.

use std::collections::HashMap;

use bpsec_codec::BlockControlFlags;
use bpsec_config::{EventActionConfig, EventIdConfig, EventSetConfig, SecurityOperationEvent};

/// Security operation failure events (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    /// No policy found for a security block at a verifier.
    SopMissingAtVerifier,
    /// Policy found but inconsistent with the block at a verifier.
    SopMisconfiguredAtVerifier,
    /// No policy found for a security block at an acceptor.
    SopMissingAtAcceptor,
    /// Policy found but inconsistent with the block at an acceptor.
    SopMisconfiguredAtAcceptor,
    /// Decryption or MAC verification failed at an acceptor.
    SopCorruptedAtAcceptor,
}

impl EventId {
    /// The BPSec status-report reason code reported for this event.
    #[must_use]
    pub const fn reason_code(self) -> BpSecReasonCode {
        match self {
            Self::SopMissingAtVerifier | Self::SopMissingAtAcceptor => {
                BpSecReasonCode::MissingSecurityOperation
            }
            Self::SopMisconfiguredAtVerifier | Self::SopMisconfiguredAtAcceptor => {
                BpSecReasonCode::ConflictingSecurityOperation
            }
            Self::SopCorruptedAtAcceptor => BpSecReasonCode::FailedSecurityOperation,
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::SopMissingAtVerifier => "sopMissingAtVerifier",
            Self::SopMisconfiguredAtVerifier => "sopMisconfiguredAtVerifier",
            Self::SopMissingAtAcceptor => "sopMissingAtAcceptor",
            Self::SopMisconfiguredAtAcceptor => "sopMisconfiguredAtAcceptor",
            Self::SopCorruptedAtAcceptor => "sopCorruptedAtAcceptor",
        }
    }
}

impl From<EventIdConfig> for EventId {
    fn from(id: EventIdConfig) -> Self {
        match id {
            EventIdConfig::SopMissingAtVerifier => Self::SopMissingAtVerifier,
            EventIdConfig::SopMisconfiguredAtVerifier => Self::SopMisconfiguredAtVerifier,
            EventIdConfig::SopMissingAtAcceptor => Self::SopMissingAtAcceptor,
            EventIdConfig::SopMisconfiguredAtAcceptor => Self::SopMisconfiguredAtAcceptor,
            EventIdConfig::SopCorruptedAtAcceptor => Self::SopCorruptedAtAcceptor,
        }
    }
}

/// BPSec bundle status-report reason codes (RFC 9172 registrations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum BpSecReasonCode {
    /// A required security operation was absent.
    MissingSecurityOperation = 12,
    /// The security operation used an unknown context.
    UnknownSecurityOperation = 13,
    /// A security operation appeared where none was expected.
    UnexpectedSecurityOperation = 14,
    /// A security operation failed verification or decryption.
    FailedSecurityOperation = 15,
    /// A security operation conflicted with local policy.
    ConflictingSecurityOperation = 16,
}

/// One recovery action within an event entry (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Drop the ASB entry for the affected target; remove the ASB when it
    /// becomes empty.
    RemoveSecurityOperation,
    /// Remove the target block and its ASB entry.
    RemoveSecurityOperationTargetBlock,
    /// Remove every ASB entry naming the target block, across all ASBs.
    RemoveAllSecurityTargetOperations,
    /// Mark the bundle undeliverable; processing continues but the caller
    /// must not forward.
    DoNotForwardBundle,
    /// Drop the bundle.
    FailBundleForwarding,
    /// Mark the bundle for retention.
    RequestBundleStorage,
    /// Record a status report with the event's BPSec reason code.
    ReportReasonCode,
    /// Replace the target block's processing control flags.
    OverrideSecurityTargetBlockBpcf(BlockControlFlags),
    /// Replace the security block's processing control flags.
    OverrideSopBpcf(BlockControlFlags),
}

fn convert_action(event: &SecurityOperationEvent, action: EventActionConfig) -> EventAction {
    match action {
        EventActionConfig::RemoveSecurityOperation => EventAction::RemoveSecurityOperation,
        EventActionConfig::RemoveSecurityOperationTargetBlock => {
            EventAction::RemoveSecurityOperationTargetBlock
        }
        EventActionConfig::RemoveAllSecurityTargetOperations => {
            EventAction::RemoveAllSecurityTargetOperations
        }
        EventActionConfig::DoNotForwardBundle => EventAction::DoNotForwardBundle,
        EventActionConfig::FailBundleForwarding => EventAction::FailBundleForwarding,
        EventActionConfig::RequestBundleStorage => EventAction::RequestBundleStorage,
        EventActionConfig::ReportReasonCode => EventAction::ReportReasonCode,
        // Config validation guarantees the override values are present.
        EventActionConfig::OverrideSecurityTargetBlockBpcf => {
            EventAction::OverrideSecurityTargetBlockBpcf(BlockControlFlags::from_bits_retain(
                event.security_target_block_bpcf.unwrap_or_default(),
            ))
        }
        EventActionConfig::OverrideSopBpcf => EventAction::OverrideSopBpcf(
            BlockControlFlags::from_bits_retain(event.sop_bpcf.unwrap_or_default()),
        ),
    }
}

/// A named, ordered list of `(event, actions)` entries.
#[derive(Debug, Clone)]
pub struct EventSet {
    /// Event set name.
    pub name: String,
    entries: Vec<(EventId, Vec<EventAction>)>,
}

impl EventSet {
    /// Build an event set from its configuration record.
    #[must_use]
    pub fn from_config(config: &EventSetConfig) -> Self {
        let entries = config
            .security_operation_events
            .iter()
            .map(|event| {
                (
                    EventId::from(event.event_id),
                    event
                        .actions
                        .iter()
                        .map(|action| convert_action(event, *action))
                        .collect(),
                )
            })
            .collect();
        Self {
            name: config.name.clone(),
            entries,
        }
    }

    /// The ordered actions for `event`, if the set defines it.
    #[must_use]
    pub fn actions(&self, event: EventId) -> Option<&[EventAction]> {
        self.entries
            .iter()
            .find(|(id, _)| *id == event)
            .map(|(_, actions)| actions.as_slice())
    }
}

/// Stable handle to a registered event set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSetHandle(u32);

/// Name-keyed registry of event sets.
#[derive(Debug, Default)]
pub struct EventSetRegistry {
    arena: Vec<EventSet>,
    by_name: HashMap<String, EventSetHandle>,
}

impl EventSetRegistry {
    /// Register an event set. Returns `None` when the name is taken.
    pub fn register(&mut self, event_set: EventSet) -> Option<EventSetHandle> {
        if self.by_name.contains_key(&event_set.name) {
            return None;
        }
        let handle = EventSetHandle(u32::try_from(self.arena.len()).ok()?);
        self.by_name.insert(event_set.name.clone(), handle);
        self.arena.push(event_set);
        Some(handle)
    }

    /// Look up a handle by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<EventSetHandle> {
        self.by_name.get(name).copied()
    }

    /// Borrow the event set behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was issued by a different registry.
    #[must_use]
    pub fn get(&self, handle: EventSetHandle) -> &EventSet {
        &self.arena[handle.0 as usize]
    }

    /// Handle of the first registered set (the bundle-wide default).
    #[must_use]
    pub fn first(&self) -> Option<EventSetHandle> {
        if self.arena.is_empty() {
            None
        } else {
            Some(EventSetHandle(0))
        }
    }
}
