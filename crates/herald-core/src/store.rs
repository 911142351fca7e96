//! Read-only traits over the external record and permission stores.
//!
//! The engine consumes the relational record store and the permission/role
//! model through these narrow interfaces so that tests can supply in-memory
//! fakes (see [`crate::testing`]). Both stores are read-only from the
//! engine's perspective and are safely shared across concurrent dispatch
//! invocations.
//!
//! Every call is expected to run under an explicit deadline; use
//! [`with_deadline`] (or a [`Lookups`] view) so a hung store degrades to
//! [`StoreError::Timeout`] instead of stalling the pipeline.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::{RecipientId, RecordId, RecordSnapshot, RoleId};

/// Errors surfaced by the external store traits.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its deadline.
    #[error("lookup timed out after {0}ms")]
    Timeout(u64),
}

/// Read access to the relational record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads every record of `table` whose `filter_column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve the query.
    async fn read_related(
        &self,
        table: &str,
        filter_column: &str,
        value: &RecordId,
    ) -> Result<Vec<RecordSnapshot>, StoreError>;

    /// Reads one column of one record, `None` when the record is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve the query.
    async fn read_scalar(
        &self,
        table: &str,
        column: &str,
        id: &RecordId,
    ) -> Result<Option<Value>, StoreError>;
}

/// Read access to the permission/role model.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Returns every role granting `permission`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve the query.
    async fn roles_granting(&self, permission: &str) -> Result<HashSet<RoleId>, StoreError>;

    /// Returns every user holding at least one of `roles`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve the query.
    async fn users_with_any_role(
        &self,
        roles: &HashSet<RoleId>,
    ) -> Result<HashSet<RecipientId>, StoreError>;
}

/// Runs a store call under `deadline`, degrading to [`StoreError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or [`StoreError::Timeout`] when the
/// deadline elapses first.
#[allow(clippy::cast_possible_truncation)] // deadlines are far below u64 millis
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline.as_millis() as u64)),
    }
}

/// Deadline-scoped view of the record store handed to gate predicates.
///
/// Predicates receive this instead of a bare [`RecordStore`] so that every
/// side-lookup they perform inherits the resolver's deadline.
pub struct Lookups<'a> {
    records: &'a dyn RecordStore,
    deadline: Duration,
}

impl<'a> Lookups<'a> {
    /// Creates a view applying `deadline` to every call.
    #[must_use]
    pub fn new(records: &'a dyn RecordStore, deadline: Duration) -> Self {
        Self { records, deadline }
    }

    /// Deadline-bounded [`RecordStore::read_related`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure or deadline expiry.
    pub async fn read_related(
        &self,
        table: &str,
        filter_column: &str,
        value: &RecordId,
    ) -> Result<Vec<RecordSnapshot>, StoreError> {
        with_deadline(
            self.deadline,
            self.records.read_related(table, filter_column, value),
        )
        .await
    }

    /// Deadline-bounded [`RecordStore::read_scalar`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure or deadline expiry.
    pub async fn read_scalar(
        &self,
        table: &str,
        column: &str,
        id: &RecordId,
    ) -> Result<Option<Value>, StoreError> {
        with_deadline(self.deadline, self.records.read_scalar(table, column, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledStore;

    #[async_trait]
    impl RecordStore for StalledStore {
        async fn read_related(
            &self,
            _table: &str,
            _filter_column: &str,
            _value: &RecordId,
        ) -> Result<Vec<RecordSnapshot>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn read_scalar(
            &self,
            _table: &str,
            _column: &str,
            _id: &RecordId,
        ) -> Result<Option<Value>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let store = StalledStore;
        let lookups = Lookups::new(&store, Duration::from_millis(5));
        let result = lookups
            .read_scalar("Project", "summary", &RecordId::new("p-1"))
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(5))));
    }
}
