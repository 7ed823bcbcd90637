//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (override the file)
//! - CLI arguments (for `serve`)
//!
//! ```toml
//! [proxy]
//! upstream = "https://api.openai.com"
//! port = 8080
//!
//! [[route]]
//! path = "/v1/chat/completions"
//! rule = "chat"
//!
//! [[rule]]
//! id = "chat"
//!
//! [rule.content_security]
//! vendor = "zkrj"
//! url = "https://moderation.example.com/check"
//! failure_policy = "fail_closed"
//!
//! [rule.sensitive_words]
//! source = "default"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::error::{GuardError, Result};
use crate::matcher::MatchMode;

/// Annotated starting point printed by `contentguard config`.
pub const EXAMPLE: &str = r#"# ContentGuard configuration

[proxy]
upstream = "https://api.openai.com"
host = "127.0.0.1"
port = 8080
timeout_secs = 60
max_body_size = 10485760
# api_key = "sk-..."   # injected when the client sends no Authorization

[words]
dir = "./words"        # <dir>/<source>.txt, one keyword per line

[[route]]
path = "/v1/chat/completions"
rule = "chat"

[[rule]]
id = "chat"

[rule.content_security]
vendor = "zkrj"
url = "https://moderation.example.com/check"
access_key = ""
access_token = ""
batch_size = 10
window_size = 200
failure_policy = "fail_closed"   # or "fail_open"; required
tail_check = false

[rule.content_security.breaker]
request_volume_threshold = 30
error_threshold_percentage = 70
sleep_window_ms = 15000
rolling_window_ms = 10000
timeout_ms = 1800
max_concurrent = 200

[rule.sensitive_words]
source = "default"
version = "1"
match_mode = "first_per_position"
"#;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Sensitive-word list location
    #[serde(default)]
    pub words: WordsConfig,

    /// Path to rule bindings
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteConfig>,

    /// Rule handles
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleHandle>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        config.log_rules();
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override fields from `CONTENTGUARD_*` environment variables
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(upstream) = std::env::var("CONTENTGUARD_UPSTREAM") {
            self.proxy.upstream = upstream;
        }
        if let Ok(port) = std::env::var("CONTENTGUARD_PORT") {
            if let Ok(port) = port.parse() {
                self.proxy.port = port;
            }
        }
        if let Ok(host) = std::env::var("CONTENTGUARD_HOST") {
            self.proxy.host = host;
        }
        if let Ok(dir) = std::env::var("CONTENTGUARD_WORDS_DIR") {
            self.words.dir = PathBuf::from(dir);
        }
        self
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(GuardError::Config(format!("duplicate rule id '{}'", rule.id)));
            }
            rule.validate()?;
        }
        for route in &self.routes {
            if !seen.contains(route.rule.as_str()) {
                return Err(GuardError::Config(format!(
                    "route '{}' references unknown rule '{}'",
                    route.path, route.rule
                )));
            }
        }
        Ok(())
    }

    /// Log the failure policy of every rule.
    pub fn log_rules(&self) {
        for rule in &self.rules {
            match &rule.content_security {
                Some(cs) => tracing::info!(
                    rule = %rule.id,
                    vendor = %cs.vendor,
                    failure_policy = ?cs.failure_policy,
                    batch_size = cs.batch_size,
                    window_size = cs.window_size,
                    "Loaded content-security rule"
                ),
                None => tracing::info!(rule = %rule.id, "Loaded rule without content security"),
            }
        }
    }

    /// Find the rule handle by id
    pub fn rule(&self, id: &str) -> Option<&RuleHandle> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// Proxy server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream API URL (e.g., https://api.openai.com)
    pub upstream: String,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Enable verbose logging
    pub verbose: bool,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Key injected as `Authorization: Bearer` when the client sends none
    pub api_key: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream: "https://api.openai.com".to_string(),
            port: 8080,
            host: "127.0.0.1".to_string(),
            timeout_secs: 60,
            verbose: false,
            max_body_size: 10 * 1024 * 1024, // 10 MB
            api_key: None,
        }
    }
}

impl ProxyConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Sensitive-word files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordsConfig {
    /// Directory holding `<source>.txt` word lists
    pub dir: PathBuf,
}

impl Default for WordsConfig {
    fn default() -> Self {
        Self {
            dir: dirs::config_dir()
                .map_or_else(|| PathBuf::from("words"), |p| p.join("contentguard").join("words")),
        }
    }
}

/// Exact request path bound to a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Request path, matched exactly
    pub path: String,
    /// Rule id
    pub rule: String,
}

/// What to do when the moderation vendor cannot give a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat the check as passed and keep streaming.
    FailOpen,
    /// Block with the "checker unavailable" envelope.
    #[default]
    FailClosed,
}

/// Everything the pipeline needs to know about a matched rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHandle {
    /// Rule id
    pub id: String,

    /// Vendor moderation settings; absent means no vendor checks
    #[serde(default)]
    pub content_security: Option<ContentSecurityHandle>,

    /// Local word screening; absent means no local screening
    #[serde(default)]
    pub sensitive_words: Option<SensitiveWordsHandle>,
}

impl RuleHandle {
    fn validate(&self) -> Result<()> {
        if let Some(cs) = &self.content_security {
            cs.validate()
                .map_err(|e| GuardError::Config(format!("rule '{}': {e}", self.id)))?;
        }
        if let Some(words) = &self.sensitive_words {
            if words.source.is_empty() {
                return Err(GuardError::Config(format!(
                    "rule '{}': sensitive_words.source is empty",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Vendor moderation settings of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSecurityHandle {
    /// Checker name, case-insensitive
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Vendor endpoint
    pub url: String,

    /// Vendor access key
    #[serde(default)]
    pub access_key: String,

    /// Vendor access token
    #[serde(default)]
    pub access_token: String,

    /// Vendor application id
    #[serde(default)]
    pub app_id: String,

    /// Vendor event id
    #[serde(default)]
    pub event_id: String,

    /// Vendor-specific content type label
    #[serde(default, alias = "type")]
    pub kind: String,

    /// Frames per streaming batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Characters kept in the sliding window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Required: there is no silent default in config files
    pub failure_policy: FailurePolicy,

    /// Check leftover content once more at stream end
    #[serde(default)]
    pub tail_check: bool,

    /// Breaker around vendor calls
    #[serde(default)]
    pub breaker: BreakerConfig,
}

fn default_vendor() -> String {
    "zkrj".to_string()
}

const fn default_batch_size() -> usize {
    10
}

const fn default_window_size() -> usize {
    200
}

impl ContentSecurityHandle {
    /// Handle with default sizing and the default (fail-closed) policy.
    pub fn new(vendor: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            url: url.into(),
            access_key: String::new(),
            access_token: String::new(),
            app_id: String::new(),
            event_id: String::new(),
            kind: String::new(),
            batch_size: default_batch_size(),
            window_size: default_window_size(),
            failure_policy: FailurePolicy::default(),
            tail_check: false,
            breaker: BreakerConfig::default(),
        }
    }

    /// Validate sizing and breaker settings.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GuardError::Config("batch_size must be at least 1".to_string()));
        }
        if self.window_size == 0 {
            return Err(GuardError::Config("window_size must be at least 1".to_string()));
        }
        self.breaker.validate()
    }
}

/// Local word screening settings of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveWordsHandle {
    /// Word list name
    pub source: String,

    /// Bump to force a rebuild
    #[serde(default = "default_words_version")]
    pub version: String,

    /// Match reporting mode
    #[serde(default)]
    pub match_mode: MatchMode,
}

fn default_words_version() -> String {
    "1".to_string()
}
