//! Mock transport and in-memory subscription store for tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use herald_core::store::StoreError;
use herald_core::RecipientId;
use parking_lot::{Mutex, RwLock};

use crate::config::PushCredentials;
use crate::endpoint::{PushEndpoint, SubscriptionStore};
use crate::error::PushError;
use crate::transport::PushTransport;

/// In-memory subscription store with per-recipient failure injection.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    endpoints: RwLock<HashMap<RecipientId, Vec<PushEndpoint>>>,
    failing: RwLock<HashSet<RecipientId>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for a recipient.
    pub fn register(&self, recipient: impl Into<RecipientId>, endpoint: PushEndpoint) {
        self.endpoints
            .write()
            .entry(recipient.into())
            .or_default()
            .push(endpoint);
    }

    /// Makes every lookup for `recipient` fail.
    pub fn fail_for(&self, recipient: impl Into<RecipientId>) {
        self.failing.write().insert(recipient.into());
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn endpoints_for(
        &self,
        recipient: &RecipientId,
    ) -> Result<Vec<PushEndpoint>, StoreError> {
        if self.failing.read().contains(recipient) {
            return Err(StoreError::Unavailable(format!(
                "subscription lookup failed for {recipient}"
            )));
        }
        Ok(self
            .endpoints
            .read()
            .get(recipient)
            .cloned()
            .unwrap_or_default())
    }
}

/// How a scripted endpoint failure presents itself.
#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    /// The push service rejects the endpoint with the given status.
    Protocol(u16),
    /// The delivery fails transiently.
    Transport,
    /// The delivery never completes (exercises deadline handling).
    Stall,
}

/// Scriptable transport recording every delivery attempt.
#[derive(Debug, Default)]
pub struct MockTransport {
    attempts: Mutex<Vec<String>>,
    deliveries: Mutex<Vec<(String, Vec<u8>)>>,
    failures: Mutex<HashMap<String, FailureMode>>,
}

impl MockTransport {
    /// Creates a transport that accepts every delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a failure for one endpoint address.
    pub fn fail_endpoint(&self, url: impl Into<String>, mode: FailureMode) {
        self.failures.lock().insert(url.into(), mode);
    }

    /// Returns every successful `(url, body)` delivery.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(String, Vec<u8>)> {
        self.deliveries.lock().clone()
    }

    /// Returns the addresses that accepted a delivery.
    #[must_use]
    pub fn delivered_urls(&self) -> Vec<String> {
        self.deliveries.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Returns how many attempts were made against one address.
    #[must_use]
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|attempted| attempted.as_str() == url)
            .count()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn deliver(
        &self,
        _credentials: &PushCredentials,
        endpoint: &PushEndpoint,
        body: &[u8],
    ) -> Result<(), PushError> {
        self.attempts.lock().push(endpoint.url.clone());

        let mode = self.failures.lock().get(&endpoint.url).copied();
        match mode {
            Some(FailureMode::Protocol(status)) => Err(PushError::Protocol {
                status,
                detail: "subscription expired".into(),
            }),
            Some(FailureMode::Transport) => {
                Err(PushError::Transport("connection reset".into()))
            }
            Some(FailureMode::Stall) => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            }
            None => {
                self.deliveries
                    .lock()
                    .push((endpoint.url.clone(), body.to_vec()));
                Ok(())
            }
        }
    }
}
