//! # Herald Core
//!
//! Audience resolution and notification payload construction for the Herald
//! inbox notification engine.
//!
//! A record-change event (old snapshot, new snapshot) is evaluated against a
//! catalog of declarative audience rules. For each rule the resolver computes
//! the audience of both snapshots; the delta of the two audiences is the set
//! of recipients that newly qualify and should be notified.
//!
//! This crate provides:
//!
//! - [`rule`] — Declarative audience rules and the validated rule catalog
//! - [`record`] — Semi-structured record snapshots and identifier types
//! - [`resolve`] — The audience resolver (rule × snapshot → recipients)
//! - [`delta`] — Newly-qualifying recipient computation
//! - [`payload`] — Payload construction with contextual summaries
//! - [`store`] — Read-only traits over the record and permission stores
//! - [`sink`] — Fire-and-forget failure reporting
//! - [`testing`] — In-memory fakes for the store traits

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Newly-qualifying recipient computation.
pub mod delta;

/// Error taxonomy for audience resolution and payload construction.
pub mod error;

/// Notification payload construction.
pub mod payload;

/// Gate predicates for conditional audience rules.
pub mod predicate;

/// Project-record derivations shared by the resolver and payload builder.
pub mod project;

/// Record snapshots and identifier types.
pub mod record;

/// The audience resolver.
pub mod resolve;

/// Declarative audience rules and the rule catalog.
pub mod rule;

/// Fire-and-forget observability reporting.
pub mod sink;

/// Read-only traits over the external record and permission stores.
pub mod store;

/// In-memory fakes for tests.
pub mod testing;

pub use error::EngineError;
pub use payload::{NotificationPayload, PayloadBuilder};
pub use record::{RecipientId, RecordId, RecordSnapshot, RoleId};
pub use resolve::AudienceResolver;
pub use rule::{
    AudienceRule, AudienceRuleBuilder, AudienceSelector, GateCondition, GateTarget, LinkSelector,
    ResolutionStrategy, RuleCatalog,
};
pub use sink::{ObservabilitySink, ReportContext, TracingSink};
pub use store::{Lookups, PermissionStore, RecordStore, StoreError};
