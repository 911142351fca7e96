//! Engine configuration.

use std::time::Duration;

/// Tuning for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum rules evaluated concurrently per event. Rules are
    /// independent; the bound exists to avoid flooding the permission store
    /// with simultaneous role queries.
    pub rule_concurrency: usize,
    /// Deadline for each record-store or permission-store lookup performed
    /// during audience resolution and payload construction.
    pub lookup_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_concurrency: 4,
            lookup_deadline: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.rule_concurrency, 4);
        assert_eq!(config.lookup_deadline, Duration::from_secs(5));
    }
}
