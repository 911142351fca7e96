//! In-memory fakes for the store traits.
//!
//! Used by this crate's own tests and exported so downstream crates (and
//! applications) can exercise the pipeline without a live record or
//! permission store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::record::{RecipientId, RecordId, RecordSnapshot, RoleId};
use crate::sink::{ObservabilitySink, ReportContext};
use crate::store::{PermissionStore, RecordStore, StoreError};

/// In-memory record store keyed by table name.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<RecordSnapshot>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record to a table.
    pub fn insert(&self, table: impl Into<String>, record: RecordSnapshot) {
        self.tables.write().entry(table.into()).or_default().push(record);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn read_related(
        &self,
        table: &str,
        filter_column: &str,
        value: &RecordId,
    ) -> Result<Vec<RecordSnapshot>, StoreError> {
        let tables = self.tables.read();
        let records = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(records
            .iter()
            .filter(|record| {
                record
                    .get(filter_column)
                    .and_then(Value::as_str)
                    .is_some_and(|reference| reference == value.as_str())
            })
            .cloned()
            .collect())
    }

    async fn read_scalar(
        &self,
        table: &str,
        column: &str,
        id: &RecordId,
    ) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read();
        let records = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(records
            .iter()
            .find(|record| record.id().ok().as_ref() == Some(id))
            .and_then(|record| record.get(column).cloned()))
    }
}

/// In-memory permission store: roles grant permissions, users hold roles.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    role_permissions: RwLock<HashMap<RoleId, HashSet<String>>>,
    memberships: RwLock<HashMap<RecipientId, HashSet<RoleId>>>,
}

impl InMemoryPermissionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants a permission to a role.
    pub fn grant(&self, role: impl Into<RoleId>, permission: impl Into<String>) {
        self.role_permissions
            .write()
            .entry(role.into())
            .or_default()
            .insert(permission.into());
    }

    /// Assigns a role to a user.
    pub fn assign(&self, user: impl Into<RecipientId>, role: impl Into<RoleId>) {
        self.memberships
            .write()
            .entry(user.into())
            .or_default()
            .insert(role.into());
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn roles_granting(&self, permission: &str) -> Result<HashSet<RoleId>, StoreError> {
        Ok(self
            .role_permissions
            .read()
            .iter()
            .filter(|(_, permissions)| permissions.contains(permission))
            .map(|(role, _)| role.clone())
            .collect())
    }

    async fn users_with_any_role(
        &self,
        roles: &HashSet<RoleId>,
    ) -> Result<HashSet<RecipientId>, StoreError> {
        Ok(self
            .memberships
            .read()
            .iter()
            .filter(|(_, held)| !held.is_disjoint(roles))
            .map(|(user, _)| user.clone())
            .collect())
    }
}

/// Sink capturing every report for assertions.
#[derive(Debug, Default)]
pub struct CapturingSink {
    reports: Mutex<Vec<(String, String)>>,
}

impl CapturingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured `(error, context)` pairs.
    #[must_use]
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().clone()
    }

    /// Returns the number of captured reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Returns `true` when nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ObservabilitySink for CapturingSink {
    fn report(&self, error: &dyn std::error::Error, context: &ReportContext) {
        self.reports
            .lock()
            .push((error.to_string(), context.to_string()));
    }
}
