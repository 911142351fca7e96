//! Error taxonomy for audience resolution and payload construction.
//!
//! Two classes of failure are distinguished:
//! - Configuration errors: the rule catalog references a table, strategy, or
//!   column the resolver does not support. These indicate a catalog defect
//!   and are reported, never silently swallowed.
//! - Lookup failures: a record-store or permission-store call failed or
//!   timed out. These are scoped to the rule (or payload) in which they
//!   occur and do not abort sibling rules.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while resolving audiences or building payloads.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A rule combines a strategy with a source table the resolver does not
    /// support. A silently-empty audience for a misconfigured rule would be
    /// a correctness hazard, so the pair is rejected outright.
    #[error("unsupported rule: strategy '{strategy}' on table '{table}'")]
    UnsupportedRule {
        /// Catalog tag of the offending strategy.
        strategy: &'static str,
        /// Source table the rule was declared for.
        table: String,
    },

    /// A column the rule requires is absent from the record snapshot.
    #[error("missing column '{column}'")]
    MissingColumn {
        /// The absent column.
        column: String,
    },

    /// A column exists but does not have the shape the rule requires.
    #[error("malformed column '{column}': {detail}")]
    MalformedColumn {
        /// The offending column.
        column: String,
        /// What was expected and what was found.
        detail: String,
    },

    /// Two catalog rules share a (source table, notification type) pair.
    #[error("duplicate rule for table '{table}', type '{notification_type}'")]
    DuplicateRule {
        /// Source table of the colliding rules.
        table: String,
        /// Notification type of the colliding rules.
        notification_type: String,
    },

    /// A rule's notification type has no default label in the catalog.
    #[error("no default label for notification type '{notification_type}'")]
    MissingLabel {
        /// The unlabeled notification type.
        notification_type: String,
    },

    /// A rule was declared with an inconsistent combination of options.
    #[error("invalid rule '{notification_type}': {detail}")]
    InvalidRule {
        /// Notification type of the rejected rule.
        notification_type: String,
        /// Why the declaration was rejected.
        detail: String,
    },

    /// A record-store or permission-store call failed or timed out.
    #[error("lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

impl EngineError {
    /// Returns `true` for catalog/record mismatches, `false` for runtime
    /// lookup failures.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Lookup(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_rule_names_the_pair() {
        let err = EngineError::UnsupportedRule {
            strategy: "category-manager",
            table: "Thread".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("category-manager"));
        assert!(msg.contains("Thread"));
    }

    #[test]
    fn test_configuration_classification() {
        let config = EngineError::MissingColumn {
            column: "estimateLate".into(),
        };
        assert!(config.is_configuration());

        let lookup = EngineError::Lookup(StoreError::Timeout(250));
        assert!(!lookup.is_configuration());
    }

    #[test]
    fn test_store_error_converts() {
        let err: EngineError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, EngineError::Lookup(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
