//! Push failure taxonomy.
//!
//! A delivery fails in one of two ways: the push service rejects the
//! endpoint itself (a protocol error: the subscription is expired or
//! unsubscribed), or the attempt fails transiently (network, service,
//! deadline). The distinction matters downstream: protocol failures are
//! permanent for that endpoint and its cleanup belongs to the subscription
//! store's owner, while transient failures may succeed on a later event.
//! Neither is retried within a dispatch call.

use thiserror::Error;

/// A failed delivery attempt against one push endpoint.
#[derive(Debug, Error)]
pub enum PushError {
    /// The push service rejected the endpoint (expired, unsubscribed, or
    /// otherwise invalid).
    #[error("push protocol error ({status}): {detail}")]
    Protocol {
        /// Status code returned by the push service.
        status: u16,
        /// Service-provided detail.
        detail: String,
    },

    /// Transient network or service failure.
    #[error("push transport error: {0}")]
    Transport(String),

    /// The delivery attempt did not complete within its deadline.
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),
}

impl PushError {
    /// Returns `true` when the push service rejected the endpoint itself.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        let gone = PushError::Protocol {
            status: 410,
            detail: "subscription expired".into(),
        };
        assert!(gone.is_protocol());
        assert!(gone.to_string().contains("410"));

        assert!(!PushError::Transport("connection reset".into()).is_protocol());
        assert!(!PushError::Timeout(5000).is_protocol());
    }
}
