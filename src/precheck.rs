//! Request-side screening.
//!
//! Runs before the request is forwarded: local sensitive words first, then
//! vendor prompt moderation. Either can reject the request outright.

use axum::http::StatusCode;

use crate::config::{FailurePolicy, RuleHandle};
use crate::matcher::{MatcherCache, WordSource};
use crate::moderation::{BlockEnvelope, CheckPhase, ModerationGate, Verdict};
use crate::stream::sse;

/// Result of screening a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheckOutcome {
    /// Forward the request.
    Allow,
    /// Answer the client directly.
    Reject {
        /// HTTP status to send.
        status: StatusCode,
        /// JSON body to send.
        envelope: BlockEnvelope,
    },
}

impl PreCheckOutcome {
    /// True for [`PreCheckOutcome::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, PreCheckOutcome::Allow)
    }
}

/// Screen a request body against `rule`.
///
/// A word list that fails to load disables local screening for this
/// request only; the failure is logged.
pub async fn precheck(
    rule: &RuleHandle,
    body: &[u8],
    gate: Option<&ModerationGate>,
    matchers: &MatcherCache,
    words: &dyn WordSource,
) -> PreCheckOutcome {
    let prompt = sse::extract_prompt(body);
    if prompt.trim().is_empty() {
        return PreCheckOutcome::Allow;
    }

    if let Some(handle) = &rule.sensitive_words {
        match matchers
            .get_or_build(&handle.source, &handle.version, handle.match_mode, words)
            .await
        {
            Ok(matcher) => {
                let hits = matcher.search(&prompt);
                if !hits.is_empty() {
                    tracing::info!(rule = %rule.id, hits = hits.len(), "Request hit sensitive words");
                    return PreCheckOutcome::Reject {
                        status: StatusCode::BAD_REQUEST,
                        envelope: BlockEnvelope::sensitive_words(&hits),
                    };
                }
            },
            Err(e) => {
                tracing::warn!(
                    rule = %rule.id,
                    source = %handle.source,
                    error = %e,
                    "Sensitive-word screening skipped"
                );
            },
        }
    }

    let Some(gate) = gate else {
        return PreCheckOutcome::Allow;
    };

    match gate.check(&prompt, CheckPhase::Prompt).await {
        Verdict::Pass => PreCheckOutcome::Allow,
        Verdict::Block { reason, vendor } => {
            tracing::info!(rule = %rule.id, vendor = %vendor, reason = %reason, "Prompt blocked");
            PreCheckOutcome::Reject {
                status: StatusCode::BAD_REQUEST,
                envelope: BlockEnvelope::prompt_violation(&reason),
            }
        },
        Verdict::Error { code, .. } => match gate.handle().failure_policy {
            FailurePolicy::FailOpen => {
                tracing::warn!(rule = %rule.id, code = %code, "Prompt check unavailable, failing open");
                PreCheckOutcome::Allow
            },
            FailurePolicy::FailClosed => {
                tracing::warn!(rule = %rule.id, code = %code, "Prompt check unavailable, failing closed");
                PreCheckOutcome::Reject {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    envelope: BlockEnvelope::unavailable(&code),
                }
            },
        },
    }
}
