//! # Herald
//!
//! An inbox notification dispatch engine. Given the old and new versions of
//! a record, Herald evaluates a catalog of declarative audience rules
//! against both versions, computes which recipients *newly* qualify, builds
//! a notification payload, and fans it out to every push endpoint each of
//! those recipients has registered, isolating per-endpoint delivery
//! failures from one another and from the triggering write.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! let rule = AudienceRule::builder("Project", "late-estimate")
//!     .active_column("estimateLate")
//!     .send_to_users_with_permission("show-late-estimates")
//!     .build()?;
//! let catalog = Arc::new(RuleCatalog::new(
//!     vec![rule],
//!     [("late-estimate".to_owned(), "Late Estimate".to_owned())].into(),
//! )?);
//!
//! let dispatcher = PushDispatcher::new(
//!     subscriptions,
//!     transport,
//!     PushCredentials::new("mailto:ops@example.com", public_key, private_key),
//!     DispatchConfig::default(),
//!     Arc::new(TracingSink),
//! );
//! let engine = NotificationEngine::new(
//!     catalog,
//!     records,
//!     permissions,
//!     dispatcher,
//!     Arc::new(TracingSink),
//!     EngineConfig::default(),
//! );
//!
//! // Invoked after every committed write.
//! engine.on_record_changed("Project", &actor, &old, &new).await;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Engine configuration.
pub mod config;

/// The pipeline orchestrator.
pub mod engine;

pub use config::EngineConfig;
pub use engine::{EngineMetrics, NotificationEngine};

// Re-export the core model
pub use herald_core::{
    AudienceRule, AudienceRuleBuilder, EngineError, NotificationPayload, ObservabilitySink,
    RecipientId, RecordId, RecordSnapshot, RuleCatalog, TracingSink,
};

// Re-export the push-delivery surface
pub use herald_push::{
    DispatchConfig, DispatchReport, PushCredentials, PushDispatcher, PushEndpoint,
};

/// Commonly used types and traits.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    // Engine
    pub use crate::config::EngineConfig;
    pub use crate::engine::NotificationEngine;

    // Core model
    pub use herald_core::predicate::{GatePredicate, RecordPredicate, RelatedRecordsPredicate};
    pub use herald_core::store::{PermissionStore, RecordStore};
    pub use herald_core::{
        AudienceRule, EngineError, NotificationPayload, ObservabilitySink, RecipientId, RecordId,
        RecordSnapshot, RuleCatalog, TracingSink,
    };

    // Push delivery
    pub use herald_push::{
        DispatchConfig, PushCredentials, PushDispatcher, PushEndpoint, PushTransport,
        SubscriptionStore,
    };

    // Standard library re-exports for convenience
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
