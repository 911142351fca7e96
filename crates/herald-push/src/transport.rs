//! The outbound delivery capability.
//!
//! The engine treats push delivery as a capability: deliver a serialized
//! payload to one endpoint and report success or failure. Implementations
//! wrap an actual web-push client; tests use
//! [`crate::testing::MockTransport`]. Retry policy, if any, belongs to the
//! implementation, never to the dispatcher.

use async_trait::async_trait;

use crate::config::PushCredentials;
use crate::endpoint::PushEndpoint;
use crate::error::PushError;

/// Delivers serialized payloads to push endpoints.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Delivers `body` to `endpoint`, authenticating with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Protocol`] when the push service rejects the
    /// endpoint, or [`PushError::Transport`] on a transient failure.
    async fn deliver(
        &self,
        credentials: &PushCredentials,
        endpoint: &PushEndpoint,
        body: &[u8],
    ) -> Result<(), PushError>;
}
