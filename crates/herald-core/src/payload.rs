//! Notification payload construction.
//!
//! The payload is the only externally visible schema of the engine: a small
//! `{type, id, label}` record serialized to JSON and delivered verbatim to
//! every push endpoint. The label is the rule's per-record label column (or
//! the catalog's static default for the notification type), optionally
//! prefixed with a contextual summary such as the parent project's one-line
//! description.
//!
//! Summary resolution is memo-free: it reads current state on every call,
//! and a dangling parent reference degrades to an absent prefix rather than
//! blocking the notification.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EngineError;
use crate::project;
use crate::record::{RecordId, RecordSnapshot};
use crate::rule::{AudienceRule, RuleCatalog};
use crate::store::{with_deadline, RecordStore};

/// Wire payload delivered to push endpoints, serialized as
/// `{"type": …, "id": …, "label": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identifier of the record that triggered the notification.
    pub id: RecordId,
    /// Human-readable label, optionally prefixed with a contextual summary.
    pub label: String,
}

impl NotificationPayload {
    /// Serializes the payload to its wire form.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error; with string-only fields this does not
    /// occur in practice.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Where a source table's contextual summary comes from.
enum SummarySource {
    /// The table has no natural project association.
    Absent,
    /// The record is itself a project; the summary derives locally.
    Local,
    /// The summary belongs to the project referenced by the named column.
    Reference(&'static str),
}

/// Tables whose records reference their project through the `project`
/// column.
const PROJECT_LINKED_TABLES: &[&str] = &[
    "Invoice",
    "Payout",
    "ProjectUnlockRequest",
    "Quotation",
    "DetailSheet",
    "SiteVisitReport",
    "CoreValueNotice",
    "CompletionSurvey",
    "WarrantyReview",
    "CustomerSurvey",
];

fn summary_source(table: &str) -> SummarySource {
    match table {
        "Thread" | "Contact" => SummarySource::Absent,
        "Project" => SummarySource::Local,
        "EstimateCopyRequest" | "QuotationCopyRequest" => SummarySource::Reference("target"),
        table if PROJECT_LINKED_TABLES.contains(&table) => SummarySource::Reference("project"),
        _ => SummarySource::Absent,
    }
}

/// Builds notification payloads for newly-qualifying audiences.
pub struct PayloadBuilder {
    records: Arc<dyn RecordStore>,
    catalog: Arc<RuleCatalog>,
    lookup_deadline: Duration,
}

impl PayloadBuilder {
    /// Creates a builder over the record store and the catalog's default
    /// labels.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        catalog: Arc<RuleCatalog>,
        lookup_deadline: Duration,
    ) -> Self {
        Self {
            records,
            catalog,
            lookup_deadline,
        }
    }

    /// Builds the payload for `record` under `rule`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the record has no identifier or
    /// the rule's type has no default label. Summary lookup failures degrade
    /// to an absent prefix and are not errors.
    pub async fn build(
        &self,
        rule: &AudienceRule,
        record: &RecordSnapshot,
    ) -> Result<NotificationPayload, EngineError> {
        let id = record.id()?;
        let summary = self.contextual_summary(&rule.source_table, record).await;

        let body = rule
            .label_column
            .as_deref()
            .and_then(|column| record.get(column))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let body = match body {
            Some(body) => body,
            None => self
                .catalog
                .default_label(&rule.notification_type)
                .ok_or_else(|| EngineError::MissingLabel {
                    notification_type: rule.notification_type.clone(),
                })?
                .to_owned(),
        };

        let label = match summary {
            Some(summary) => format!("{summary} {body}"),
            None => body,
        };

        Ok(NotificationPayload {
            kind: rule.notification_type.clone(),
            id,
            label,
        })
    }

    async fn contextual_summary(&self, table: &str, record: &RecordSnapshot) -> Option<String> {
        match summary_source(table) {
            SummarySource::Absent => None,
            SummarySource::Local => match project::summary(record) {
                Ok(summary) => Some(summary),
                Err(error) => {
                    warn!(%error, "project summary derivation failed");
                    None
                }
            },
            SummarySource::Reference(column) => {
                let id = RecordId::new(record.get(column)?.as_str()?);
                let lookup = with_deadline(
                    self.lookup_deadline,
                    self.records.read_scalar("Project", "summary", &id),
                )
                .await;
                match lookup {
                    Ok(Some(value)) => value.as_str().map(str::to_owned),
                    // Dangling reference: the parent was deleted.
                    Ok(None) => None,
                    Err(error) => {
                        warn!(%error, table, "contextual summary lookup failed");
                        None
                    }
                }
            }
        }
    }
}
