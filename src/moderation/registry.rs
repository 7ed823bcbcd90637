//! Vendor name to checker lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::vendors::{ShumeiChecker, ZkrjChecker};
use super::VendorChecker;
use crate::error::{GuardError, Result};

/// Vendor used when a rule names none.
pub const DEFAULT_VENDOR: &str = "zkrj";

/// Registered checkers, keyed by lower-cased vendor name.
#[derive(Clone)]
pub struct CheckerRegistry {
    checkers: HashMap<String, Arc<dyn VendorChecker>>,
    default_vendor: String,
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("vendors", &self.vendors())
            .field("default_vendor", &self.default_vendor)
            .finish()
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckerRegistry {
    /// Empty registry with the default vendor name.
    pub fn new() -> Self {
        Self {
            checkers: HashMap::new(),
            default_vendor: DEFAULT_VENDOR.to_string(),
        }
    }

    /// Registry with the built-in HTTP vendors sharing one client.
    pub fn with_http_vendors(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ZkrjChecker::new(client.clone())));
        registry.register(Arc::new(ShumeiChecker::new(client)));
        registry
    }

    /// Add or replace a checker under its vendor name.
    pub fn register(&mut self, checker: Arc<dyn VendorChecker>) {
        let name = checker.vendor().to_ascii_lowercase();
        tracing::debug!(vendor = %name, "Registered vendor checker");
        self.checkers.insert(name, checker);
    }

    /// Look up a checker. An empty name selects the default vendor.
    pub fn get(&self, vendor: &str) -> Result<Arc<dyn VendorChecker>> {
        let name = if vendor.trim().is_empty() {
            self.default_vendor.clone()
        } else {
            vendor.trim().to_ascii_lowercase()
        };

        self.checkers
            .get(&name)
            .cloned()
            .ok_or_else(|| GuardError::UnsupportedVendor {
                vendor: name,
                available: self.vendors().join(", "),
            })
    }

    /// Registered vendor names, sorted.
    pub fn vendors(&self) -> Vec<String> {
        let mut names: Vec<_> = self.checkers.keys().cloned().collect();
        names.sort();
        names
    }
}
