//! The audience resolver: evaluates one rule against one record snapshot.
//!
//! `resolve` never fails for a well-formed rule/record pair. Malformed input
//! (a missing required column, an unsupported table for a strategy) fails
//! fast with a configuration error, because it indicates a catalog/code
//! mismatch rather than a runtime condition. A tombstone snapshot (absent
//! record version) short-circuits every strategy to an empty audience.
//!
//! Permission-backed strategies query the permission store in two steps
//! (roles granting a permission, then users holding any of those roles) so
//! one resolver instance serves every strategy through the same two store
//! traits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::EngineError;
use crate::project;
use crate::record::{RecipientId, RecordSnapshot, RoleId};
use crate::rule::{
    AudienceRule, AudienceSelector, GateCondition, GateTarget, LinkSelector, ResolutionStrategy,
};
use crate::store::{with_deadline, Lookups, PermissionStore, RecordStore};

/// Evaluates audience rules against record snapshots.
pub struct AudienceResolver {
    records: Arc<dyn RecordStore>,
    permissions: Arc<dyn PermissionStore>,
    lookup_deadline: Duration,
}

impl AudienceResolver {
    /// Creates a resolver over the given stores. Every store call runs under
    /// `lookup_deadline`.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        permissions: Arc<dyn PermissionStore>,
        lookup_deadline: Duration,
    ) -> Self {
        Self {
            records,
            permissions,
            lookup_deadline,
        }
    }

    /// Resolves the audience of `record` under `rule`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed records or unsupported
    /// (strategy, table) pairs, and a lookup failure when a store call fails
    /// or times out.
    pub async fn resolve(
        &self,
        rule: &AudienceRule,
        record: &RecordSnapshot,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        // A snapshot without a version models a record that does not exist
        // in a comparably-typed state, e.g. the old side of a creation.
        if record.record_version().is_none() {
            return Ok(HashSet::new());
        }

        match &rule.strategy {
            ResolutionStrategy::DirectColumn(selector) => Self::direct(selector, record),
            ResolutionStrategy::SingleLinkColumn(selector) => Self::single(selector, record),
            ResolutionStrategy::BooleanGate { condition, target } => {
                if !self.gate_holds(condition, record).await? {
                    return Ok(HashSet::new());
                }
                self.gated(rule, target, record).await
            }
        }
    }

    fn direct(
        selector: &AudienceSelector,
        record: &RecordSnapshot,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        let recipients = match selector {
            AudienceSelector::Column(column) => record.links_field(column)?,
            AudienceSelector::Derived(derive) => derive(record),
        };
        Ok(recipients.into_iter().collect())
    }

    fn single(
        selector: &LinkSelector,
        record: &RecordSnapshot,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        let recipient = match selector {
            LinkSelector::Column(column) => record.link_field(column)?,
            LinkSelector::Derived(derive) => derive(record),
        };
        Ok(recipient.into_iter().collect())
    }

    async fn gate_holds(
        &self,
        condition: &GateCondition,
        record: &RecordSnapshot,
    ) -> Result<bool, EngineError> {
        match condition {
            GateCondition::Column(column) => record.bool_field(column),
            GateCondition::Predicate(predicate) => {
                let lookups = Lookups::new(&*self.records, self.lookup_deadline);
                predicate.evaluate(record, &lookups).await
            }
        }
    }

    async fn gated(
        &self,
        rule: &AudienceRule,
        target: &GateTarget,
        record: &RecordSnapshot,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        match target {
            GateTarget::CategoryManager => match rule.source_table.as_str() {
                "Project" => {
                    let permissions = project::category_permissions(record)?;
                    self.users_with_any_permission(&permissions).await
                }
                _ => Err(Self::unsupported(rule)),
            },
            GateTarget::Permission { permission } => self.users_with_permission(permission).await,
            GateTarget::UserColumnPlusPermission { permission, column } => {
                let mut users = self.users_with_permission(permission).await?;
                if let Some(user) = record.link_field(column)? {
                    users.insert(user);
                }
                Ok(users)
            }
            GateTarget::QuoteRequestedBy => {
                let requestor = record.link_field("quoteRequestCompletedBy")?;
                Ok(requestor.into_iter().collect())
            }
            GateTarget::ProjectRole { permission } => {
                self.project_role(rule, permission, record).await
            }
        }
    }

    /// Joins permission-qualified roles against a personnel list, either
    /// embedded on the record (`Project`) or attached to the related project
    /// (`CustomerSurvey`).
    async fn project_role(
        &self,
        rule: &AudienceRule,
        permission: &str,
        record: &RecordSnapshot,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        match rule.source_table.as_str() {
            "Project" => {
                let roles = self.qualified_roles(permission).await?;
                let personnel = record.get("personnel").ok_or_else(|| {
                    EngineError::MissingColumn {
                        column: "personnel".into(),
                    }
                })?;
                personnel_members(personnel, &roles)
            }
            "CustomerSurvey" => {
                let Some(project) = record.ref_field("project")? else {
                    return Ok(HashSet::new());
                };
                let roles = self.qualified_roles(permission).await?;
                let projects = with_deadline(
                    self.lookup_deadline,
                    self.records.read_related("Project", "id", &project),
                )
                .await?;
                match projects.first().and_then(|parent| parent.get("personnel")) {
                    // A dangling project reference contributes nobody.
                    None => Ok(HashSet::new()),
                    Some(value) => personnel_members(value, &roles),
                }
            }
            _ => Err(Self::unsupported(rule)),
        }
    }

    async fn qualified_roles(&self, permission: &str) -> Result<HashSet<RoleId>, EngineError> {
        Ok(with_deadline(
            self.lookup_deadline,
            self.permissions.roles_granting(permission),
        )
        .await?)
    }

    async fn users_with_permission(
        &self,
        permission: &str,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        let roles = self.qualified_roles(permission).await?;
        self.users_holding(&roles).await
    }

    /// "Any" semantics: every user holding any role granting at least one of
    /// the permissions.
    async fn users_with_any_permission(
        &self,
        permissions: &[String],
    ) -> Result<HashSet<RecipientId>, EngineError> {
        let mut roles: HashSet<RoleId> = HashSet::new();
        for permission in permissions {
            roles.extend(self.qualified_roles(permission).await?);
        }
        self.users_holding(&roles).await
    }

    async fn users_holding(
        &self,
        roles: &HashSet<RoleId>,
    ) -> Result<HashSet<RecipientId>, EngineError> {
        if roles.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(with_deadline(
            self.lookup_deadline,
            self.permissions.users_with_any_role(roles),
        )
        .await?)
    }

    fn unsupported(rule: &AudienceRule) -> EngineError {
        EngineError::UnsupportedRule {
            strategy: rule.strategy.name(),
            table: rule.source_table.clone(),
        }
    }
}

/// Filters a personnel list down to the members holding a qualifying role.
fn personnel_members(
    personnel: &Value,
    roles: &HashSet<RoleId>,
) -> Result<HashSet<RecipientId>, EngineError> {
    let Value::Array(entries) = personnel else {
        return Err(EngineError::MalformedColumn {
            column: "personnel".into(),
            detail: format!("expected list, got {personnel}"),
        });
    };

    let mut members = HashSet::new();
    for entry in entries {
        let role = entry.get("role").and_then(Value::as_str);
        let user = entry.get("user").and_then(Value::as_str);
        // Entries with an unfilled role or user slot are ignored.
        if let (Some(role), Some(user)) = (role, user) {
            if roles.contains(&RoleId::new(role)) {
                members.insert(RecipientId::new(user));
            }
        }
    }
    Ok(members)
}
