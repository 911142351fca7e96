//! Declarative audience rules and the rule catalog.
//!
//! An [`AudienceRule`] binds one (source table, notification type) pair to a
//! [`ResolutionStrategy`] describing how the rule's audience derives from a
//! record snapshot. The [`RuleCatalog`] holds every rule plus the static
//! default label per notification type; it is built once at process start
//! and read-only during dispatch.
//!
//! Rules are declared through [`AudienceRuleBuilder`], which enforces the
//! declaration invariants at build time: a rule names exactly one audience
//! target, direct column targets cannot be gated, and every gated target
//! requires an activation condition.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::EngineError;
use crate::predicate::GatePredicate;
use crate::record::{RecipientId, RecordSnapshot};

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// Pure derivation of a recipient list from a record snapshot.
pub type DerivedRecipients = Arc<dyn Fn(&RecordSnapshot) -> Vec<RecipientId> + Send + Sync>;

/// Pure derivation of at most one recipient from a record snapshot.
pub type DerivedRecipient = Arc<dyn Fn(&RecordSnapshot) -> Option<RecipientId> + Send + Sync>;

/// Source of a rule's direct audience: a stored column holding recipient
/// links, or a pure derivation of the record.
#[derive(Clone)]
pub enum AudienceSelector {
    /// A stored column holding a list of recipient identifiers.
    Column(String),
    /// A pure function of the record producing the recipient list.
    Derived(DerivedRecipients),
}

impl fmt::Debug for AudienceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Source of a rule's single-recipient audience.
#[derive(Clone)]
pub enum LinkSelector {
    /// A stored column holding at most one recipient identifier.
    Column(String),
    /// A pure function of the record producing at most one recipient.
    Derived(DerivedRecipient),
}

impl fmt::Debug for LinkSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Boolean condition guarding a gated resolution strategy.
#[derive(Clone)]
pub enum GateCondition {
    /// A stored boolean column on the record.
    Column(String),
    /// An async predicate with read access to related records.
    Predicate(Arc<dyn GatePredicate>),
}

impl fmt::Debug for GateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Audience target selected once a rule's gate condition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateTarget {
    /// Users managing any of the record's description categories.
    CategoryManager,
    /// Users holding any role granting the named permission.
    Permission {
        /// The qualifying permission.
        permission: String,
    },
    /// [`GateTarget::Permission`] plus the user stored on the record.
    UserColumnPlusPermission {
        /// The qualifying permission.
        permission: String,
        /// Column naming the always-notified user.
        column: String,
    },
    /// The user who completed the quote-request workflow step.
    QuoteRequestedBy,
    /// Personnel entries holding a role granting the named permission.
    ProjectRole {
        /// The qualifying permission.
        permission: String,
    },
}

impl GateTarget {
    /// Catalog tag for this target, used in configuration errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CategoryManager => "category-manager",
            Self::Permission { .. } => "permission",
            Self::UserColumnPlusPermission { .. } => "user-column",
            Self::QuoteRequestedBy => "quote-requested-by",
            Self::ProjectRole { .. } => "project-role",
        }
    }
}

// ---------------------------------------------------------------------------
// ResolutionStrategy
// ---------------------------------------------------------------------------

/// How a rule resolves its audience from a record snapshot.
#[derive(Debug, Clone)]
pub enum ResolutionStrategy {
    /// The record column (or derivation) already names every recipient.
    DirectColumn(AudienceSelector),
    /// Like [`ResolutionStrategy::DirectColumn`] but yielding at most one
    /// recipient.
    SingleLinkColumn(LinkSelector),
    /// Conditional strategies guarded by a record-level boolean.
    BooleanGate {
        /// The activation condition.
        condition: GateCondition,
        /// The audience to resolve once the condition holds.
        target: GateTarget,
    },
}

impl ResolutionStrategy {
    /// Catalog tag for this strategy, used in configuration errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectColumn(_) => "column",
            Self::SingleLinkColumn(_) => "column-single",
            Self::BooleanGate { target, .. } => target.name(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudienceRule
// ---------------------------------------------------------------------------

/// Declarative binding of (source table, notification type) to an audience
/// resolution strategy.
#[derive(Debug, Clone)]
pub struct AudienceRule {
    /// Entity kind whose writes this rule reacts to.
    pub source_table: String,
    /// Tag discriminating this rule's notifications.
    pub notification_type: String,
    /// Excluded from live dispatch; reserved for scheduled digests.
    pub dated: bool,
    /// Column supplying a per-record label override.
    pub label_column: Option<String>,
    /// How the audience derives from a record snapshot.
    pub strategy: ResolutionStrategy,
}

impl AudienceRule {
    /// Starts declaring a rule for the given table and notification type.
    #[must_use]
    pub fn builder(
        source_table: impl Into<String>,
        notification_type: impl Into<String>,
    ) -> AudienceRuleBuilder {
        AudienceRuleBuilder {
            source_table: source_table.into(),
            notification_type: notification_type.into(),
            dated: false,
            label_column: None,
            direct: None,
            single: None,
            condition: None,
            target: None,
        }
    }
}

/// Builder enforcing the rule declaration invariants.
#[derive(Debug)]
pub struct AudienceRuleBuilder {
    source_table: String,
    notification_type: String,
    dated: bool,
    label_column: Option<String>,
    direct: Option<AudienceSelector>,
    single: Option<LinkSelector>,
    condition: Option<GateCondition>,
    target: Option<GateTarget>,
}

impl AudienceRuleBuilder {
    /// Sends to every recipient listed in a stored column.
    #[must_use]
    pub fn send_to_users(mut self, column: impl Into<String>) -> Self {
        self.direct = Some(AudienceSelector::Column(column.into()));
        self
    }

    /// Sends to every recipient produced by a derivation of the record.
    #[must_use]
    pub fn send_to_users_derived(
        mut self,
        derive: impl Fn(&RecordSnapshot) -> Vec<RecipientId> + Send + Sync + 'static,
    ) -> Self {
        self.direct = Some(AudienceSelector::Derived(Arc::new(derive)));
        self
    }

    /// Sends to the single recipient linked by a stored column.
    #[must_use]
    pub fn send_to_user(mut self, column: impl Into<String>) -> Self {
        self.single = Some(LinkSelector::Column(column.into()));
        self
    }

    /// Sends to the single recipient produced by a derivation of the record.
    #[must_use]
    pub fn send_to_user_derived(
        mut self,
        derive: impl Fn(&RecordSnapshot) -> Option<RecipientId> + Send + Sync + 'static,
    ) -> Self {
        self.single = Some(LinkSelector::Derived(Arc::new(derive)));
        self
    }

    /// Gates the rule on a stored boolean column.
    #[must_use]
    pub fn active_column(mut self, column: impl Into<String>) -> Self {
        self.condition = Some(GateCondition::Column(column.into()));
        self
    }

    /// Gates the rule on a computed predicate.
    #[must_use]
    pub fn active_predicate(mut self, predicate: impl GatePredicate + 'static) -> Self {
        self.condition = Some(GateCondition::Predicate(Arc::new(predicate)));
        self
    }

    /// Sends to the managers of the record's description categories.
    #[must_use]
    pub fn send_to_category_manager(mut self) -> Self {
        self.target = Some(GateTarget::CategoryManager);
        self
    }

    /// Sends to every user holding a role granting `permission`.
    #[must_use]
    pub fn send_to_users_with_permission(mut self, permission: impl Into<String>) -> Self {
        self.target = Some(GateTarget::Permission {
            permission: permission.into(),
        });
        self
    }

    /// Sends to the record's `user` plus every user holding a role granting
    /// `permission`.
    #[must_use]
    pub fn send_to_user_column_if_permission(mut self, permission: impl Into<String>) -> Self {
        self.target = Some(GateTarget::UserColumnPlusPermission {
            permission: permission.into(),
            column: "user".into(),
        });
        self
    }

    /// Sends to the user who completed the quote-request workflow step.
    #[must_use]
    pub fn send_to_quote_requestor(mut self) -> Self {
        self.target = Some(GateTarget::QuoteRequestedBy);
        self
    }

    /// Sends to personnel holding a role granting `permission`.
    #[must_use]
    pub fn send_to_project_role_with_permission(mut self, permission: impl Into<String>) -> Self {
        self.target = Some(GateTarget::ProjectRole {
            permission: permission.into(),
        });
        self
    }

    /// Marks the rule as dated: kept in the catalog but excluded from live
    /// dispatch.
    #[must_use]
    pub fn dated(mut self, dated: bool) -> Self {
        self.dated = dated;
        self
    }

    /// Names the column supplying a per-record label override.
    #[must_use]
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRule`] when the declaration names no
    /// audience target, names more than one, gates a direct column target,
    /// or declares a gated target without an activation condition.
    pub fn build(self) -> Result<AudienceRule, EngineError> {
        let notification_type = self.notification_type.clone();
        let invalid = move |detail: &str| EngineError::InvalidRule {
            notification_type: notification_type.clone(),
            detail: detail.into(),
        };

        let targets =
            usize::from(self.direct.is_some()) + usize::from(self.single.is_some()) + usize::from(self.target.is_some());
        if targets == 0 {
            return Err(invalid("declares no audience target"));
        }
        if targets > 1 {
            return Err(invalid("declares more than one audience target"));
        }

        let strategy = if let Some(selector) = self.direct {
            if self.condition.is_some() {
                return Err(invalid("direct column targets cannot be gated"));
            }
            ResolutionStrategy::DirectColumn(selector)
        } else if let Some(selector) = self.single {
            if self.condition.is_some() {
                return Err(invalid("direct column targets cannot be gated"));
            }
            ResolutionStrategy::SingleLinkColumn(selector)
        } else {
            let target = self.target.ok_or_else(|| invalid("declares no audience target"))?;
            let Some(condition) = self.condition else {
                return Err(invalid("gated targets require an activation condition"));
            };
            ResolutionStrategy::BooleanGate { condition, target }
        };

        Ok(AudienceRule {
            source_table: self.source_table,
            notification_type: self.notification_type,
            dated: self.dated,
            label_column: self.label_column,
            strategy,
        })
    }
}

// ---------------------------------------------------------------------------
// RuleCatalog
// ---------------------------------------------------------------------------

/// The validated, read-only set of audience rules plus default labels.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<AudienceRule>,
    labels: HashMap<String, String>,
}

impl RuleCatalog {
    /// Validates and seals a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateRule`] when two rules share a
    /// (source table, notification type) pair, or
    /// [`EngineError::MissingLabel`] when a rule's type has no default
    /// label.
    pub fn new(
        rules: Vec<AudienceRule>,
        labels: HashMap<String, String>,
    ) -> Result<Self, EngineError> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for rule in &rules {
            if !seen.insert((&rule.source_table, &rule.notification_type)) {
                return Err(EngineError::DuplicateRule {
                    table: rule.source_table.clone(),
                    notification_type: rule.notification_type.clone(),
                });
            }
            if !labels.contains_key(&rule.notification_type) {
                return Err(EngineError::MissingLabel {
                    notification_type: rule.notification_type.clone(),
                });
            }
        }
        Ok(Self { rules, labels })
    }

    /// Iterates the rules reacting to writes on `table`, excluding dated
    /// rules.
    pub fn live_rules_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a AudienceRule> {
        self.rules
            .iter()
            .filter(move |rule| rule.source_table == table && !rule.dated)
    }

    /// Returns the static default label for a notification type.
    #[must_use]
    pub fn default_label(&self, notification_type: &str) -> Option<&str> {
        self.labels.get(notification_type).map(String::as_str)
    }

    /// Returns every rule, dated ones included.
    #[must_use]
    pub fn rules(&self) -> &[AudienceRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(types: &[&str]) -> HashMap<String, String> {
        types
            .iter()
            .map(|t| ((*t).to_owned(), format!("{t} label")))
            .collect()
    }

    #[test]
    fn test_builder_direct_column() {
        let rule = AudienceRule::builder("Thread", "new-message")
            .send_to_users("watchers")
            .build()
            .unwrap();
        assert_eq!(rule.strategy.name(), "column");
        assert!(!rule.dated);
    }

    #[test]
    fn test_builder_gated_target() {
        let rule = AudienceRule::builder("Project", "late-estimate")
            .active_column("estimateLate")
            .send_to_users_with_permission("show-late-estimates")
            .build()
            .unwrap();
        assert_eq!(rule.strategy.name(), "permission");
    }

    #[test]
    fn test_builder_rejects_gated_direct_column() {
        let err = AudienceRule::builder("Thread", "new-message")
            .send_to_users("watchers")
            .active_column("open")
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule { .. }));
    }

    #[test]
    fn test_builder_rejects_ungated_target() {
        let err = AudienceRule::builder("Project", "late-estimate")
            .send_to_users_with_permission("show-late-estimates")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("activation condition"));
    }

    #[test]
    fn test_builder_rejects_multiple_targets() {
        let err = AudienceRule::builder("Project", "late-estimate")
            .send_to_users("watchers")
            .send_to_quote_requestor()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_builder_rejects_no_target() {
        let err = AudienceRule::builder("Project", "late-estimate")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no audience target"));
    }

    #[test]
    fn test_catalog_rejects_duplicate_pairs() {
        let rule = |dated| {
            AudienceRule::builder("Project", "late-estimate")
                .active_column("estimateLate")
                .send_to_users_with_permission("show-late-estimates")
                .dated(dated)
                .build()
                .unwrap()
        };
        let err = RuleCatalog::new(vec![rule(false), rule(true)], labels(&["late-estimate"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRule { .. }));
    }

    #[test]
    fn test_catalog_requires_labels() {
        let rule = AudienceRule::builder("Project", "late-estimate")
            .active_column("estimateLate")
            .send_to_users_with_permission("show-late-estimates")
            .build()
            .unwrap();
        let err = RuleCatalog::new(vec![rule], HashMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::MissingLabel { .. }));
    }

    #[test]
    fn test_live_rules_exclude_dated_and_other_tables() {
        let live = AudienceRule::builder("Project", "late-estimate")
            .active_column("estimateLate")
            .send_to_users_with_permission("show-late-estimates")
            .build()
            .unwrap();
        let dated = AudienceRule::builder("Project", "follow-up")
            .active_column("followUpDue")
            .send_to_users_with_permission("show-follow-ups")
            .dated(true)
            .build()
            .unwrap();
        let other = AudienceRule::builder("Quotation", "unapproved")
            .active_column("pendingApproval")
            .send_to_users_with_permission("approve-quotations")
            .build()
            .unwrap();

        let catalog = RuleCatalog::new(
            vec![live, dated, other],
            labels(&["late-estimate", "follow-up", "unapproved"]),
        )
        .unwrap();

        let types: Vec<&str> = catalog
            .live_rules_for("Project")
            .map(|rule| rule.notification_type.as_str())
            .collect();
        assert_eq!(types, vec!["late-estimate"]);
        assert_eq!(catalog.rules().len(), 3);
    }

    #[test]
    fn test_default_label_lookup() {
        let rule = AudienceRule::builder("Project", "late-estimate")
            .active_column("estimateLate")
            .send_to_users_with_permission("show-late-estimates")
            .build()
            .unwrap();
        let catalog = RuleCatalog::new(vec![rule], labels(&["late-estimate"])).unwrap();
        assert_eq!(
            catalog.default_label("late-estimate"),
            Some("late-estimate label")
        );
        assert_eq!(catalog.default_label("unknown"), None);
    }
}
