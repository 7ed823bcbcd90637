//! Path to rule lookup.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{Config, RuleHandle};

/// Rules by id plus exact-path bindings.
///
/// Stands in for the gateway's selector evaluation: a request path maps to
/// at most one rule id, and the id to a shared [`RuleHandle`].
#[derive(Debug, Default)]
pub struct RuleCache {
    rules: DashMap<String, Arc<RuleHandle>>,
    routes: DashMap<String, String>,
}

impl RuleCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache populated from the `[[rule]]` and `[[route]]` tables.
    pub fn from_config(config: &Config) -> Self {
        let cache = Self::new();
        for rule in &config.rules {
            cache.upsert(rule.clone());
        }
        for route in &config.routes {
            cache.bind(&route.path, &route.rule);
        }
        cache
    }

    /// Insert or replace a rule.
    pub fn upsert(&self, rule: RuleHandle) {
        tracing::debug!(rule = %rule.id, "Rule cached");
        self.rules.insert(rule.id.clone(), Arc::new(rule));
    }

    /// Remove a rule. Routes pointing at it resolve to nothing afterwards.
    pub fn remove(&self, id: &str) -> Option<Arc<RuleHandle>> {
        self.rules.remove(id).map(|(_, rule)| rule)
    }

    /// Bind a request path to a rule id.
    pub fn bind(&self, path: &str, rule_id: &str) {
        self.routes.insert(path.to_string(), rule_id.to_string());
    }

    /// Rule for a request path.
    pub fn resolve(&self, path: &str) -> Option<Arc<RuleHandle>> {
        let id = self.routes.get(path)?.value().clone();
        self.get(&id)
    }

    /// Rule by id.
    pub fn get(&self, id: &str) -> Option<Arc<RuleHandle>> {
        self.rules.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Number of cached rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rule is cached.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
