//! ContentGuard error types.
//!
//! # Classification
//!
//! - **Bypass**: `NotConfigured` means no rule is bound to the request. The
//!   pipeline steps aside; callers must not turn it into an error response.
//! - **Vendor failures**: `VendorUnreachable`, `Timeout` and
//!   `MalformedVendorResponse` are collapsed into a `Verdict::Error` by the
//!   moderation gate and resolved through the rule's failure policy.
//! - **Local screening**: `PatternBuild` disables sensitive-word screening
//!   for the affected request only.
//! - **Infrastructure**: `Config`, `Server`, `Upstream`, `Io` surface to the
//!   operator.

use thiserror::Error;

/// ContentGuard errors.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// No rule handle is bound for the request.
    #[error("No rule configured for {0}")]
    NotConfigured(String),

    /// No checker registered under the vendor name.
    #[error("Unsupported vendor: {vendor} (available: {available})")]
    UnsupportedVendor {
        /// Requested vendor.
        vendor: String,
        /// Comma-separated registered vendors.
        available: String,
    },

    /// Moderation vendor could not be reached.
    #[error("Vendor unreachable: {0}")]
    VendorUnreachable(String),

    /// An external call exceeded its deadline.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Vendor replied with a payload we cannot interpret.
    #[error("Malformed vendor response from {vendor}: {message}")]
    MalformedVendorResponse {
        /// Vendor name.
        vendor: String,
        /// What was wrong with the payload.
        message: String,
    },

    /// Sensitive-word automaton could not be built.
    #[error("Pattern build failed for source '{source_key}': {message}")]
    PatternBuild {
        /// Word source key.
        source_key: String,
        /// Underlying failure.
        message: String,
    },

    /// Upstream service error.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// The request or its stream was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ContentGuard operations
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Short machine-readable code used in `Verdict::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Config(_) => "config",
            GuardError::NotConfigured(_) => "not_configured",
            GuardError::UnsupportedVendor { .. } => "unsupported_vendor",
            GuardError::VendorUnreachable(_) => "vendor_unreachable",
            GuardError::Timeout(_) => "timeout",
            GuardError::MalformedVendorResponse { .. } => "malformed_response",
            GuardError::PatternBuild { .. } => "pattern_build",
            GuardError::Upstream(_) => "upstream",
            GuardError::Server(_) => "server",
            GuardError::Cancelled(_) => "cancelled",
            GuardError::Json(_) => "json",
            GuardError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(err: reqwest::Error) -> Self {
        GuardError::VendorUnreachable(err.to_string())
    }
}

impl From<toml::de::Error> for GuardError {
    fn from(err: toml::de::Error) -> Self {
        GuardError::Config(err.to_string())
    }
}
