//! Registered push endpoints and the subscription store.

use std::fmt;

use async_trait::async_trait;
use herald_core::store::StoreError;
use herald_core::RecipientId;

/// A registered browser-push destination owned by one recipient.
///
/// Carries the delivery address plus the two endpoint secrets the push
/// protocol requires. `Debug` output redacts the secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct PushEndpoint {
    /// Delivery address of the endpoint.
    pub url: String,
    /// Endpoint authentication secret.
    pub auth: String,
    /// Endpoint encryption key.
    pub p256dh: String,
}

impl PushEndpoint {
    /// Creates an endpoint from its address and secrets.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        auth: impl Into<String>,
        p256dh: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            auth: auth.into(),
            p256dh: p256dh.into(),
        }
    }
}

impl fmt::Debug for PushEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushEndpoint")
            .field("url", &self.url)
            .field("auth", &"<redacted>")
            .field("p256dh", &"<redacted>")
            .finish()
    }
}

/// Read access to the push-subscription store.
///
/// Endpoints are fetched fresh on every dispatch: they can be added or
/// revoked at any time and their lifecycle is fully owned by the external
/// store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Lists the endpoints currently registered by `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve the query.
    async fn endpoints_for(&self, recipient: &RecipientId)
        -> Result<Vec<PushEndpoint>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let endpoint = PushEndpoint::new("https://push.example/abc", "secret-auth", "secret-key");
        let debug = format!("{endpoint:?}");
        assert!(debug.contains("https://push.example/abc"));
        assert!(!debug.contains("secret-auth"));
        assert!(!debug.contains("secret-key"));
    }
}
