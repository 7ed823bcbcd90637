//! Shared breakers keyed by vendor command.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{BreakerConfig, BreakerSnapshot, CircuitBreaker};

/// Process-wide set of breakers.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the breaker for `key`, creating it on first use.
    ///
    /// A different `config` than the one the existing breaker was built
    /// with replaces it, discarding its state.
    pub fn get_or_create(&self, key: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        match self.breakers.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().config() != config {
                    tracing::info!(breaker = key, "Breaker config changed, replacing breaker");
                    entry.insert(Arc::new(CircuitBreaker::new(key, config.clone())));
                }
                Arc::clone(entry.get())
            },
            Entry::Vacant(entry) => {
                tracing::debug!(breaker = key, "Creating breaker");
                let breaker = Arc::new(CircuitBreaker::new(key, config.clone()));
                entry.insert(Arc::clone(&breaker));
                breaker
            },
        }
    }

    /// Snapshot of every breaker, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// True if no breaker was created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_breaker() {
        let registry = BreakerRegistry::new();
        let config = BreakerConfig::default();
        let a = registry.get_or_create("zkrj:check_text", &config);
        let b = registry.get_or_create("zkrj:check_text", &config);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_changed_config_replaces() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("zkrj:check_text", &BreakerConfig::default());
        let tighter = BreakerConfig {
            timeout_ms: 200,
            ..Default::default()
        };
        let b = registry.get_or_create("zkrj:check_text", &tighter);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().timeout_ms, 200);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let registry = BreakerRegistry::new();
        registry.get_or_create("shumei:check_text", &BreakerConfig::default());
        registry.get_or_create("zkrj:check_text", &BreakerConfig::default());
        let keys: Vec<_> = registry.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["shumei:check_text", "zkrj:check_text"]);
    }
}
