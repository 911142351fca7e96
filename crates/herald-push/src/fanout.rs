//! The dispatch fan-out.
//!
//! Delivers one serialized payload to every push endpoint of every
//! newly-qualifying recipient. Each delivery is isolated: a failure on one
//! endpoint never prevents the remaining endpoints of the same recipient or
//! of other recipients from being attempted, and never propagates to the
//! caller as a fatal error. The aggregate [`DispatchReport`] records
//! per-endpoint outcomes for tests and observability; it carries no
//! control-flow significance.
//!
//! Per-recipient and per-endpoint work runs concurrently under the bounds
//! configured in [`DispatchConfig`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use herald_core::sink::{ObservabilitySink, ReportContext};
use herald_core::store::with_deadline;
use herald_core::{NotificationPayload, RecipientId};
use tracing::{debug, warn};

use crate::config::{DispatchConfig, PushCredentials};
use crate::endpoint::{PushEndpoint, SubscriptionStore};
use crate::error::PushError;
use crate::transport::PushTransport;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one delivery attempt, recorded for observability only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The endpoint accepted the payload.
    Delivered,
    /// Transient failure; a later event may deliver successfully.
    TransientFailure(String),
    /// The push service rejected the endpoint; its cleanup belongs to the
    /// subscription store's owner.
    PermanentFailure(String),
}

impl DispatchOutcome {
    /// Returns `true` when the endpoint accepted the payload.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// One delivery attempt against one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    /// The recipient the endpoint belongs to.
    pub recipient: RecipientId,
    /// The endpoint's delivery address.
    pub endpoint: String,
    /// What happened.
    pub outcome: DispatchOutcome,
}

/// Aggregate of every delivery attempt in one dispatch call.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    outcomes: Vec<EndpointOutcome>,
}

impl DispatchReport {
    /// Returns every per-endpoint outcome.
    #[must_use]
    pub fn outcomes(&self) -> &[EndpointOutcome] {
        &self.outcomes
    }

    /// Returns the number of successful deliveries.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| entry.outcome.is_delivered())
            .count()
    }

    /// Returns the number of failed attempts.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

// ---------------------------------------------------------------------------
// DispatchMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for monitoring the fan-out.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Recipients whose endpoints were looked up.
    pub recipients_processed: AtomicU64,
    /// Delivery attempts started.
    pub endpoints_attempted: AtomicU64,
    /// Successful deliveries.
    pub delivered: AtomicU64,
    /// Endpoints rejected by the push service.
    pub protocol_failures: AtomicU64,
    /// Transient delivery failures, timeouts included.
    pub transient_failures: AtomicU64,
    /// Failed endpoint-subscription lookups.
    pub lookup_failures: AtomicU64,
}

impl DispatchMetrics {
    /// Returns recipients whose endpoints were looked up.
    #[must_use]
    pub fn recipients_processed(&self) -> u64 {
        self.recipients_processed.load(Ordering::Relaxed)
    }

    /// Returns delivery attempts started.
    #[must_use]
    pub fn endpoints_attempted(&self) -> u64 {
        self.endpoints_attempted.load(Ordering::Relaxed)
    }

    /// Returns successful deliveries.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Returns endpoints rejected by the push service.
    #[must_use]
    pub fn protocol_failures(&self) -> u64 {
        self.protocol_failures.load(Ordering::Relaxed)
    }

    /// Returns transient delivery failures.
    #[must_use]
    pub fn transient_failures(&self) -> u64 {
        self.transient_failures.load(Ordering::Relaxed)
    }

    /// Returns failed endpoint-subscription lookups.
    #[must_use]
    pub fn lookup_failures(&self) -> u64 {
        self.lookup_failures.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// PushDispatcher
// ---------------------------------------------------------------------------

/// Fans one payload out to every endpoint of every recipient.
pub struct PushDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn PushTransport>,
    credentials: PushCredentials,
    config: DispatchConfig,
    sink: Arc<dyn ObservabilitySink>,
    metrics: Arc<DispatchMetrics>,
}

impl PushDispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn PushTransport>,
        credentials: PushCredentials,
        config: DispatchConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            subscriptions,
            transport,
            credentials,
            config,
            sink,
            metrics: Arc::new(DispatchMetrics::default()),
        }
    }

    /// Delivers `payload` to every endpoint registered by `recipients`.
    ///
    /// Never fails: every failure is scoped to its endpoint or recipient,
    /// reported to the observability sink, and recorded in the returned
    /// report.
    pub async fn dispatch(
        &self,
        recipients: &HashSet<RecipientId>,
        payload: &NotificationPayload,
    ) -> DispatchReport {
        let body = match payload.to_json() {
            Ok(body) => body,
            Err(error) => {
                self.sink.report(
                    &error,
                    &ReportContext::default().with_rule(payload.kind.clone()),
                );
                return DispatchReport::default();
            }
        };

        let per_recipient: Vec<Vec<EndpointOutcome>> = stream::iter(recipients.iter())
            .map(|recipient| self.deliver_to_recipient(recipient, &payload.kind, &body))
            .buffer_unordered(self.config.max_concurrent_recipients.max(1))
            .collect()
            .await;

        DispatchReport {
            outcomes: per_recipient.into_iter().flatten().collect(),
        }
    }

    /// Returns the dispatcher metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    async fn deliver_to_recipient(
        &self,
        recipient: &RecipientId,
        kind: &str,
        body: &[u8],
    ) -> Vec<EndpointOutcome> {
        self.metrics
            .recipients_processed
            .fetch_add(1, Ordering::Relaxed);

        let lookup = with_deadline(
            self.config.lookup_deadline,
            self.subscriptions.endpoints_for(recipient),
        )
        .await;
        let endpoints = match lookup {
            Ok(endpoints) => endpoints,
            Err(error) => {
                // Recipient boundary: a failed lookup must not stop the
                // remaining recipients.
                self.metrics.lookup_failures.fetch_add(1, Ordering::Relaxed);
                self.sink.report(
                    &error,
                    &ReportContext::default()
                        .with_rule(kind)
                        .with_recipient(recipient.clone()),
                );
                return Vec::new();
            }
        };
        if endpoints.is_empty() {
            debug!(%recipient, "no push endpoints registered");
            return Vec::new();
        }

        stream::iter(endpoints)
            .map(|endpoint| self.deliver_to_endpoint(recipient, kind, endpoint, body))
            .buffer_unordered(self.config.max_concurrent_deliveries.max(1))
            .collect()
            .await
    }

    #[allow(clippy::cast_possible_truncation)] // deadlines are far below u64 millis
    async fn deliver_to_endpoint(
        &self,
        recipient: &RecipientId,
        kind: &str,
        endpoint: PushEndpoint,
        body: &[u8],
    ) -> EndpointOutcome {
        self.metrics
            .endpoints_attempted
            .fetch_add(1, Ordering::Relaxed);

        let attempt = tokio::time::timeout(
            self.config.delivery_deadline,
            self.transport.deliver(&self.credentials, &endpoint, body),
        )
        .await;

        let outcome = match attempt {
            Ok(Ok(())) => {
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Delivered
            }
            Ok(Err(error)) if error.is_protocol() => {
                self.metrics
                    .protocol_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.sink
                    .report(&error, &self.context(kind, recipient, &endpoint.url));
                DispatchOutcome::PermanentFailure(error.to_string())
            }
            Ok(Err(error)) => {
                self.metrics
                    .transient_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(%recipient, endpoint = %endpoint.url, %error, "push delivery failed");
                self.sink
                    .report(&error, &self.context(kind, recipient, &endpoint.url));
                DispatchOutcome::TransientFailure(error.to_string())
            }
            Err(_) => {
                let error = PushError::Timeout(self.config.delivery_deadline.as_millis() as u64);
                self.metrics
                    .transient_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(%recipient, endpoint = %endpoint.url, %error, "push delivery timed out");
                self.sink
                    .report(&error, &self.context(kind, recipient, &endpoint.url));
                DispatchOutcome::TransientFailure(error.to_string())
            }
        };

        EndpointOutcome {
            recipient: recipient.clone(),
            endpoint: endpoint.url,
            outcome,
        }
    }

    fn context(&self, kind: &str, recipient: &RecipientId, endpoint: &str) -> ReportContext {
        ReportContext::default()
            .with_rule(kind)
            .with_recipient(recipient.clone())
            .with_endpoint(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use herald_core::testing::CapturingSink;
    use herald_core::RecordId;

    use super::*;
    use crate::testing::{FailureMode, InMemorySubscriptionStore, MockTransport};

    fn payload() -> NotificationPayload {
        NotificationPayload {
            kind: "late-estimate".into(),
            id: RecordId::new("p-1"),
            label: "12 Harbour Rd > Project 4821 Late Estimate".into(),
        }
    }

    fn credentials() -> PushCredentials {
        PushCredentials::new("mailto:ops@example.com", "pub", "priv")
    }

    fn recipients(ids: &[&str]) -> HashSet<RecipientId> {
        ids.iter().copied().map(RecipientId::from).collect()
    }

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionStore>,
        transport: Arc<MockTransport>,
        sink: Arc<CapturingSink>,
        dispatcher: PushDispatcher,
    }

    fn fixture(config: DispatchConfig) -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        let transport = Arc::new(MockTransport::new());
        let sink = Arc::new(CapturingSink::new());
        let dispatcher = PushDispatcher::new(
            Arc::clone(&subscriptions) as Arc<dyn SubscriptionStore>,
            Arc::clone(&transport) as Arc<dyn PushTransport>,
            credentials(),
            config,
            Arc::clone(&sink) as Arc<dyn ObservabilitySink>,
        );
        Fixture {
            subscriptions,
            transport,
            sink,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_delivers_to_every_endpoint_of_every_recipient() {
        let f = fixture(DispatchConfig::default());
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/1a", "a", "k"));
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/1b", "a", "k"));
        f.subscriptions
            .register("u-2", PushEndpoint::new("https://push/2a", "a", "k"));

        let report = f.dispatcher.dispatch(&recipients(&["u-1", "u-2"]), &payload()).await;

        assert_eq!(report.delivered(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(f.dispatcher.metrics().recipients_processed(), 2);
        assert_eq!(f.dispatcher.metrics().endpoints_attempted(), 3);
        assert_eq!(f.dispatcher.metrics().delivered(), 3);
        assert!(f.sink.is_empty());
    }

    #[tokio::test]
    async fn test_payload_round_trips_through_the_transport_unchanged() {
        let f = fixture(DispatchConfig::default());
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/1a", "a", "k"));

        let payload = payload();
        f.dispatcher.dispatch(&recipients(&["u-1"]), &payload).await;

        let deliveries = f.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        let decoded: NotificationPayload = serde_json::from_slice(&deliveries[0].1).unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_one_failing_endpoint_does_not_stop_its_siblings() {
        let f = fixture(DispatchConfig {
            // Serialize deliveries so the failure lands mid-batch.
            max_concurrent_deliveries: 1,
            ..DispatchConfig::default()
        });
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/1", "a", "k"));
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/2", "a", "k"));
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/3", "a", "k"));
        f.transport
            .fail_endpoint("https://push/2", FailureMode::Transport);

        let report = f.dispatcher.dispatch(&recipients(&["u-1"]), &payload()).await;

        assert_eq!(report.outcomes().len(), 3);
        assert_eq!(report.delivered(), 2);
        let delivered = f.transport.delivered_urls();
        assert!(delivered.contains(&"https://push/1".to_owned()));
        assert!(delivered.contains(&"https://push/3".to_owned()));
        assert_eq!(f.dispatcher.metrics().transient_failures(), 1);
    }

    #[tokio::test]
    async fn test_expired_endpoint_is_permanent_and_reported() {
        let f = fixture(DispatchConfig::default());
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/gone", "a", "k"));
        f.transport
            .fail_endpoint("https://push/gone", FailureMode::Protocol(410));

        let report = f.dispatcher.dispatch(&recipients(&["u-1"]), &payload()).await;

        assert_eq!(report.delivered(), 0);
        assert!(matches!(
            report.outcomes()[0].outcome,
            DispatchOutcome::PermanentFailure(_)
        ));
        assert_eq!(f.dispatcher.metrics().protocol_failures(), 1);

        // Reported once, not retried.
        assert_eq!(f.transport.attempts("https://push/gone"), 1);
        let (error, context) = &f.sink.reports()[0];
        assert!(error.contains("410"));
        assert!(context.contains("https://push/gone"));
    }

    #[tokio::test]
    async fn test_recipient_lookup_failure_does_not_stop_other_recipients() {
        let f = fixture(DispatchConfig::default());
        f.subscriptions.fail_for("u-broken");
        f.subscriptions
            .register("u-2", PushEndpoint::new("https://push/2a", "a", "k"));

        let report = f
            .dispatcher
            .dispatch(&recipients(&["u-broken", "u-2"]), &payload())
            .await;

        assert_eq!(report.delivered(), 1);
        assert_eq!(f.dispatcher.metrics().lookup_failures(), 1);
        assert_eq!(f.sink.len(), 1);
        assert!(f.sink.reports()[0].1.contains("u-broken"));
    }

    #[tokio::test]
    async fn test_stalled_delivery_degrades_to_timeout() {
        let f = fixture(DispatchConfig {
            delivery_deadline: Duration::from_millis(10),
            ..DispatchConfig::default()
        });
        f.subscriptions
            .register("u-1", PushEndpoint::new("https://push/slow", "a", "k"));
        f.transport
            .fail_endpoint("https://push/slow", FailureMode::Stall);

        let report = f.dispatcher.dispatch(&recipients(&["u-1"]), &payload()).await;

        assert!(matches!(
            &report.outcomes()[0].outcome,
            DispatchOutcome::TransientFailure(detail) if detail.contains("timed out")
        ));
        assert_eq!(f.dispatcher.metrics().transient_failures(), 1);
    }

    #[tokio::test]
    async fn test_no_recipients_is_a_noop() {
        let f = fixture(DispatchConfig::default());
        let report = f.dispatcher.dispatch(&recipients(&[]), &payload()).await;
        assert!(report.outcomes().is_empty());
        assert_eq!(f.dispatcher.metrics().endpoints_attempted(), 0);
    }
}
