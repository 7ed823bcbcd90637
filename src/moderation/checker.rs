//! Vendor checker seam.

use async_trait::async_trait;
use serde::Serialize;

use super::Verdict;
use crate::config::ContentSecurityHandle;
use crate::error::Result;

/// Which side of the exchange is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    /// Outbound request text.
    Prompt,
    /// Model response text.
    Content,
}

/// One moderation call.
#[derive(Debug, Clone, Copy)]
pub struct CheckRequest<'a> {
    /// Text to judge.
    pub text: &'a str,
    /// Request or response side.
    pub phase: CheckPhase,
    /// Vendor endpoint and credentials.
    pub handle: &'a ContentSecurityHandle,
}

/// An external moderation capability.
///
/// Implementations return `Pass` or `Block`; anything that prevents a
/// decision is an `Err`, which the breaker counts as a failure.
#[async_trait]
pub trait VendorChecker: Send + Sync {
    /// Registry name, lower case.
    fn vendor(&self) -> &str;

    /// Judge `req.text`.
    async fn check_text(&self, req: &CheckRequest<'_>) -> Result<Verdict>;
}
