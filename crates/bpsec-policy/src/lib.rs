//! The BPSec policy engine.
//!
//! Matches bundles flowing through a DTN node against operator-declared
//! security policies and applies the corresponding BPSec (RFC 9172)
//! operations: source-side BCB/BIB creation, intermediate verification, and
//! acceptor-side decryption/integrity checking, with declarative failure
//! event handling.
//!
//! The engine is synchronous and shares-nothing on the hot path: a loaded
//! [`PolicyEngine`] is immutable and may be called from any thread, while
//! each caller owns a [`ProcessingContext`] holding its search caches and
//! scratch buffers.
//!
//! ```no_run
//! use bpsec_codec::BundleView;
//! use bpsec_policy::{BundleDisposition, PolicyEngine, ProcessingContext};
//!
//! # fn demo(config_json: &str, wire: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = PolicyEngine::load_from_json(config_json)?;
//! let mut ctx = ProcessingContext::new();
//! let mut bundle = BundleView::from_bytes(wire)?;
//! match engine.process_incoming(&mut bundle, &mut ctx) {
//!     BundleDisposition::Accept => { /* forward or deliver */ }
//!     BundleDisposition::Drop => { /* discard */ }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod cache;
mod context;
mod contexts;
mod engine;
mod error;
mod events;
mod incoming;
mod loader;
mod outgoing;
mod policy;
mod scope;
mod store;

pub use cache::PolicySearchCache;
pub use context::ProcessingContext;
pub use contexts::SecurityContextRegistry;
pub use engine::{BundleDisposition, PolicyEngine};
pub use error::{LoadError, ProcessingError};
pub use events::{
    BpSecReasonCode, EventAction, EventId, EventSet, EventSetHandle, EventSetRegistry,
};
pub use policy::{
    BcbParams, BibParams, BpSecPolicy, BpSecRole, PolicyHandle, SecurityOperation,
};
pub use store::PolicyStore;
