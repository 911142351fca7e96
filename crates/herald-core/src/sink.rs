//! Fire-and-forget observability reporting.
//!
//! Failures inside the dispatch pipeline never surface to the acting user;
//! they are reported to an [`ObservabilitySink`] with the scope they were
//! caught at (table, rule, recipient, endpoint) and otherwise swallowed.
//! Sink implementations must never themselves fail.

use std::fmt;

use crate::record::RecipientId;

/// Scope a failure was caught at.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    /// Source table of the triggering event.
    pub table: Option<String>,
    /// Notification type of the rule being processed.
    pub notification_type: Option<String>,
    /// Recipient whose delivery was being processed.
    pub recipient: Option<RecipientId>,
    /// Push endpoint address the failure is scoped to.
    pub endpoint: Option<String>,
}

impl ReportContext {
    /// Context scoped to a record-change event.
    #[must_use]
    pub fn for_event(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    /// Narrows the context to one rule.
    #[must_use]
    pub fn with_rule(mut self, notification_type: impl Into<String>) -> Self {
        self.notification_type = Some(notification_type.into());
        self
    }

    /// Narrows the context to one recipient.
    #[must_use]
    pub fn with_recipient(mut self, recipient: RecipientId) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Narrows the context to one endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl fmt::Display for ReportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(table) = &self.table {
            parts.push(format!("table={table}"));
        }
        if let Some(notification_type) = &self.notification_type {
            parts.push(format!("type={notification_type}"));
        }
        if let Some(recipient) = &self.recipient {
            parts.push(format!("recipient={recipient}"));
        }
        if let Some(endpoint) = &self.endpoint {
            parts.push(format!("endpoint={endpoint}"));
        }
        if parts.is_empty() {
            f.write_str("unscoped")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Receives failure reports from the dispatch pipeline.
pub trait ObservabilitySink: Send + Sync {
    /// Records a failure with the scope it was caught at. Fire-and-forget;
    /// implementations must not fail.
    fn report(&self, error: &dyn std::error::Error, context: &ReportContext);
}

/// Default sink forwarding every report to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn report(&self, error: &dyn std::error::Error, context: &ReportContext) {
        tracing::error!(%context, %error, "notification dispatch failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_lists_scopes() {
        let context = ReportContext::for_event("Project")
            .with_rule("late-estimate")
            .with_recipient(RecipientId::new("u-1"))
            .with_endpoint("https://push.example/abc");
        assert_eq!(
            context.to_string(),
            "table=Project type=late-estimate recipient=u-1 endpoint=https://push.example/abc"
        );
    }

    #[test]
    fn test_empty_context_displays_unscoped() {
        assert_eq!(ReportContext::default().to_string(), "unscoped");
    }
}
