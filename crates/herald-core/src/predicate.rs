//! Gate predicates for conditional audience rules.
//!
//! A [`crate::rule::GateCondition::Predicate`] carries one of these instead
//! of a stored column name when the rule's activation condition must be
//! computed. Predicates are evaluated with read access to the record store
//! (via [`Lookups`]) because some conditions span related entities, e.g. a
//! project qualifies only once every one of its detail sheets reaches a
//! given state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::record::RecordSnapshot;
use crate::store::Lookups;

/// Record-level boolean condition guarding a gated resolution strategy.
#[async_trait]
pub trait GatePredicate: Send + Sync {
    /// Evaluates the condition against one record snapshot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed record, or a lookup
    /// failure when a required side-lookup fails or times out.
    async fn evaluate(
        &self,
        record: &RecordSnapshot,
        lookups: &Lookups<'_>,
    ) -> Result<bool, EngineError>;
}

/// A pure predicate over the record itself.
#[derive(Clone)]
pub struct RecordPredicate {
    eval: Arc<dyn Fn(&RecordSnapshot) -> bool + Send + Sync>,
}

impl RecordPredicate {
    /// Wraps a pure function of the record.
    #[must_use]
    pub fn new(eval: impl Fn(&RecordSnapshot) -> bool + Send + Sync + 'static) -> Self {
        Self {
            eval: Arc::new(eval),
        }
    }
}

impl fmt::Debug for RecordPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordPredicate(..)")
    }
}

#[async_trait]
impl GatePredicate for RecordPredicate {
    async fn evaluate(
        &self,
        record: &RecordSnapshot,
        _lookups: &Lookups<'_>,
    ) -> Result<bool, EngineError> {
        Ok((self.eval)(record))
    }
}

/// A predicate over the record plus its related records.
///
/// Fetches every record of `table` whose `filter_column` references the
/// evaluated record, then applies the closure to both.
#[derive(Clone)]
pub struct RelatedRecordsPredicate {
    table: String,
    filter_column: String,
    eval: Arc<dyn Fn(&RecordSnapshot, &[RecordSnapshot]) -> bool + Send + Sync>,
}

impl RelatedRecordsPredicate {
    /// Builds a predicate over `record` and the records of `table` whose
    /// `filter_column` equals the record's id.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        filter_column: impl Into<String>,
        eval: impl Fn(&RecordSnapshot, &[RecordSnapshot]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            filter_column: filter_column.into(),
            eval: Arc::new(eval),
        }
    }
}

impl fmt::Debug for RelatedRecordsPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelatedRecordsPredicate")
            .field("table", &self.table)
            .field("filter_column", &self.filter_column)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GatePredicate for RelatedRecordsPredicate {
    async fn evaluate(
        &self,
        record: &RecordSnapshot,
        lookups: &Lookups<'_>,
    ) -> Result<bool, EngineError> {
        let id = record.id()?;
        let related = lookups
            .read_related(&self.table, &self.filter_column, &id)
            .await?;
        Ok((self.eval)(record, &related))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::InMemoryRecordStore;

    #[tokio::test]
    async fn test_record_predicate_is_pure() {
        let store = InMemoryRecordStore::new();
        let lookups = Lookups::new(&store, Duration::from_secs(1));
        let predicate = RecordPredicate::new(|record| record.bool_field("late").unwrap_or(false));

        let late = RecordSnapshot::new(1).with("late", true);
        let on_time = RecordSnapshot::new(1).with("late", false);

        assert!(predicate.evaluate(&late, &lookups).await.unwrap());
        assert!(!predicate.evaluate(&on_time, &lookups).await.unwrap());
    }

    #[tokio::test]
    async fn test_related_records_predicate_fetches_siblings() {
        let store = InMemoryRecordStore::new();
        store.insert(
            "DetailSheet",
            RecordSnapshot::new(1)
                .with("id", "d-1")
                .with("project", "p-1")
                .with("certified", true),
        );
        store.insert(
            "DetailSheet",
            RecordSnapshot::new(1)
                .with("id", "d-2")
                .with("project", "p-1")
                .with("certified", false),
        );

        let predicate = RelatedRecordsPredicate::new("DetailSheet", "project", |_record, sheets| {
            sheets
                .iter()
                .all(|sheet| sheet.bool_field("certified").unwrap_or(false))
        });

        let lookups = Lookups::new(&store, Duration::from_secs(1));
        let project = RecordSnapshot::new(1).with("id", "p-1");
        assert!(!predicate.evaluate(&project, &lookups).await.unwrap());

        // A project with no sheets trivially satisfies the all() condition.
        let empty = RecordSnapshot::new(1).with("id", "p-2");
        assert!(predicate.evaluate(&empty, &lookups).await.unwrap());
    }

    #[tokio::test]
    async fn test_related_records_predicate_requires_an_id() {
        let store = InMemoryRecordStore::new();
        let lookups = Lookups::new(&store, Duration::from_secs(1));
        let predicate = RelatedRecordsPredicate::new("DetailSheet", "project", |_, _| true);

        let no_id = RecordSnapshot::new(1);
        assert!(matches!(
            predicate.evaluate(&no_id, &lookups).await,
            Err(EngineError::MissingColumn { .. })
        ));
    }
}
