//! Transport credentials and fan-out tuning.

use std::fmt;
use std::time::Duration;

/// VAPID-style credentials identifying this application server to push
/// services.
///
/// Passed explicitly to the dispatcher at construction so that multiple
/// configurations (e.g. test and production) can coexist in one process.
/// `Debug` output redacts the private key.
#[derive(Clone)]
pub struct PushCredentials {
    /// Contact URI for the application server (typically `mailto:`).
    pub subject: String,
    /// Application server public key.
    pub public_key: String,
    /// Application server private key.
    pub private_key: String,
}

impl PushCredentials {
    /// Creates a credentials set.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        public_key: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCredentials")
            .field("subject", &self.subject)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Tuning for the dispatch fan-out.
///
/// Endpoint fan-out per event is typically single digits to low tens, so
/// the defaults bound concurrency well below anything that could saturate
/// the transport's rate limits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum recipients processed concurrently.
    pub max_concurrent_recipients: usize,
    /// Maximum deliveries in flight per recipient.
    pub max_concurrent_deliveries: usize,
    /// Deadline for a single delivery attempt.
    pub delivery_deadline: Duration,
    /// Deadline for one endpoint-subscription lookup.
    pub lookup_deadline: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_recipients: 8,
            max_concurrent_deliveries: 4,
            delivery_deadline: Duration::from_secs(10),
            lookup_deadline: Duration::from_secs(5),
        }
    }
}
