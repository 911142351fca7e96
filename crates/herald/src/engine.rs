//! The pipeline orchestrator.
//!
//! [`NotificationEngine::on_record_changed`] is the engine's single entry
//! point, invoked once per committed write. For every live rule matching
//! the event's table it resolves the old and new audiences, reduces them to
//! the newly-qualifying recipients, and, when any exist, builds the payload
//! and hands it to the fan-out.
//!
//! Failure handling is structured as per-scope aggregation rather than
//! re-throwing: endpoint failures stay inside the fan-out, rule failures
//! are reported and swallowed at the rule boundary, and the entry point
//! itself never fails. Notification delivery must never affect the
//! triggering write, which has already committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use herald_core::delta;
use herald_core::rule::AudienceRule;
use herald_core::sink::{ObservabilitySink, ReportContext};
use herald_core::store::{PermissionStore, RecordStore};
use herald_core::{
    AudienceResolver, EngineError, PayloadBuilder, RecipientId, RecordSnapshot, RuleCatalog,
};
use herald_push::PushDispatcher;
use tracing::{debug, debug_span, Instrument};

use crate::config::EngineConfig;

// ---------------------------------------------------------------------------
// EngineMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for monitoring the pipeline.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Record-change events processed.
    pub events_processed: AtomicU64,
    /// Rule evaluations started.
    pub rules_evaluated: AtomicU64,
    /// Rule evaluations that failed and were reported.
    pub rules_failed: AtomicU64,
    /// Fan-out invocations (rules with a non-empty delta).
    pub dispatches: AtomicU64,
}

impl EngineMetrics {
    /// Returns record-change events processed.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Returns rule evaluations started.
    #[must_use]
    pub fn rules_evaluated(&self) -> u64 {
        self.rules_evaluated.load(Ordering::Relaxed)
    }

    /// Returns rule evaluations that failed.
    #[must_use]
    pub fn rules_failed(&self) -> u64 {
        self.rules_failed.load(Ordering::Relaxed)
    }

    /// Returns fan-out invocations.
    #[must_use]
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// NotificationEngine
// ---------------------------------------------------------------------------

/// Drives audience resolution, delta detection, and fan-out for record
/// changes.
///
/// Stateless across calls apart from the read-only rule catalog; concurrent
/// invocations share only the catalog and the pooled store connections, so
/// events may be processed in any order.
pub struct NotificationEngine {
    catalog: Arc<RuleCatalog>,
    resolver: AudienceResolver,
    payloads: PayloadBuilder,
    dispatcher: PushDispatcher,
    sink: Arc<dyn ObservabilitySink>,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
}

impl NotificationEngine {
    /// Creates an engine over the given catalog and collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<RuleCatalog>,
        records: Arc<dyn RecordStore>,
        permissions: Arc<dyn PermissionStore>,
        dispatcher: PushDispatcher,
        sink: Arc<dyn ObservabilitySink>,
        config: EngineConfig,
    ) -> Self {
        let resolver =
            AudienceResolver::new(Arc::clone(&records), permissions, config.lookup_deadline);
        let payloads = PayloadBuilder::new(records, Arc::clone(&catalog), config.lookup_deadline);
        Self {
            catalog,
            resolver,
            payloads,
            dispatcher,
            sink,
            config,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    /// Processes one committed write.
    ///
    /// Never fails and never panics the caller's task on bad input: every
    /// failure is reported to the observability sink at the scope it was
    /// caught, and the acting user observes nothing.
    pub async fn on_record_changed(
        &self,
        table: &str,
        actor: &RecipientId,
        old: &RecordSnapshot,
        new: &RecordSnapshot,
    ) {
        self.metrics.events_processed.fetch_add(1, Ordering::Relaxed);

        let span = debug_span!("record_changed", table, %actor);
        async {
            let rules: Vec<&AudienceRule> = self.catalog.live_rules_for(table).collect();
            if rules.is_empty() {
                return;
            }

            stream::iter(rules)
                .for_each_concurrent(self.config.rule_concurrency.max(1), |rule| async move {
                    self.metrics.rules_evaluated.fetch_add(1, Ordering::Relaxed);
                    if let Err(error) = self.process_rule(rule, old, new).await {
                        // Rule boundary: a defective or failing rule never
                        // suppresses its siblings.
                        self.metrics.rules_failed.fetch_add(1, Ordering::Relaxed);
                        self.sink.report(
                            &error,
                            &ReportContext::for_event(table)
                                .with_rule(rule.notification_type.clone()),
                        );
                    }
                })
                .await;
        }
        .instrument(span)
        .await;
    }

    /// Returns the engine metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    async fn process_rule(
        &self,
        rule: &AudienceRule,
        old: &RecordSnapshot,
        new: &RecordSnapshot,
    ) -> Result<(), EngineError> {
        // The two resolutions are independent of each other.
        let (new_audience, old_audience) = tokio::try_join!(
            self.resolver.resolve(rule, new),
            self.resolver.resolve(rule, old),
        )?;

        let newly = delta::newly_qualified(&old_audience, &new_audience);
        if newly.is_empty() {
            debug!(rule = %rule.notification_type, "no newly qualifying recipients");
            return Ok(());
        }

        let payload = self.payloads.build(rule, new).await?;
        self.metrics.dispatches.fetch_add(1, Ordering::Relaxed);
        let report = self.dispatcher.dispatch(&newly, &payload).await;
        debug!(
            rule = %rule.notification_type,
            recipients = newly.len(),
            delivered = report.delivered(),
            failed = report.failed(),
            "notification dispatched"
        );
        Ok(())
    }
}
