//! Moderation gate: decides, per batch, whether to forward or block.

use std::sync::Arc;

use bytes::Bytes;

use super::{BlockEnvelope, CheckPhase, CheckRequest, CheckerRegistry, Verdict, VendorChecker};
use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::config::{ContentSecurityHandle, FailurePolicy, RuleHandle};
use crate::error::Result;
use crate::stream::{sse, Batch, RequestState};

/// Vendor checker behind a circuit breaker, plus the rule's policy.
pub struct ModerationGate {
    handle: ContentSecurityHandle,
    checker: Arc<dyn VendorChecker>,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ModerationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationGate")
            .field("vendor", &self.checker.vendor())
            .field("breaker", &self.breaker.name())
            .field("failure_policy", &self.handle.failure_policy)
            .finish()
    }
}

impl ModerationGate {
    /// Assemble a gate from its parts.
    pub fn new(
        handle: ContentSecurityHandle,
        checker: Arc<dyn VendorChecker>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            handle,
            checker,
            breaker,
        }
    }

    /// Gate for a rule, or `None` if the rule has no content security.
    ///
    /// Breakers are keyed `<vendor>:<rule id>`.
    pub fn for_rule(
        rule: &RuleHandle,
        checkers: &CheckerRegistry,
        breakers: &BreakerRegistry,
    ) -> Result<Option<Self>> {
        let Some(handle) = &rule.content_security else {
            return Ok(None);
        };
        let checker = checkers.get(&handle.vendor)?;
        let key = format!("{}:{}", checker.vendor(), rule.id);
        let breaker = breakers.get_or_create(&key, &handle.breaker);
        Ok(Some(Self::new(handle.clone(), checker, breaker)))
    }

    /// Rule settings.
    pub fn handle(&self) -> &ContentSecurityHandle {
        &self.handle
    }

    /// Run one vendor check through the breaker.
    ///
    /// Never fails: breaker and vendor failures become [`Verdict::Error`].
    pub async fn check(&self, text: &str, phase: CheckPhase) -> Verdict {
        let request = CheckRequest {
            text,
            phase,
            handle: &self.handle,
        };

        self.breaker
            .call_or_else(self.checker.check_text(&request), |err| {
                tracing::warn!(
                    vendor = %self.checker.vendor(),
                    code = err.code(),
                    error = %err,
                    "Moderation check failed"
                );
                Verdict::Error {
                    message: err.to_string(),
                    code: err.code().to_string(),
                }
            })
            .await
    }

    /// Process one full batch for `state`.
    ///
    /// Returns the bytes to forward: the batch's own raw frames, or the
    /// block payload once the request is blocked.
    pub async fn on_batch(&self, state: &mut RequestState, batch: Batch) -> Vec<Bytes> {
        state.processed_batches += 1;
        if let Some(payload) = state.block_payload() {
            return vec![payload.clone()];
        }

        let text = sse::extract_batch(&batch);
        let due = state.window.add_content(&text);
        tracing::debug!(
            request_id = %state.id(),
            batch = state.processed_batches,
            frames = batch.len(),
            window_chars = state.window.len_chars(),
            check_due = due,
            "Processing batch"
        );

        if due {
            self.run_check(state, batch).await
        } else {
            batch.into_raw()
        }
    }

    /// Process the final partial batch, if any.
    ///
    /// With `tail_check` enabled, content not covered by an earlier check
    /// is checked once more even if the window is not full.
    pub async fn on_finish(&self, state: &mut RequestState, batch: Option<Batch>) -> Vec<Bytes> {
        if let Some(payload) = state.block_payload() {
            return if batch.is_some() {
                vec![payload.clone()]
            } else {
                Vec::new()
            };
        }

        let batch = match batch {
            Some(batch) => {
                state.processed_batches += 1;
                let text = sse::extract_batch(&batch);
                if state.window.add_content(&text) {
                    return self.run_check(state, batch).await;
                }
                batch
            },
            None => Batch::default(),
        };

        if self.handle.tail_check && state.window.has_unchecked() {
            tracing::debug!(request_id = %state.id(), "Running tail check");
            return self.run_check(state, batch).await;
        }
        batch.into_raw()
    }

    async fn run_check(&self, state: &mut RequestState, batch: Batch) -> Vec<Bytes> {
        state.checks += 1;
        let verdict = self.check(state.window.text(), CheckPhase::Content).await;
        state.window.mark_checked();

        match verdict {
            Verdict::Pass => {
                state.window.complete_first_check();
                batch.into_raw()
            },
            Verdict::Block { reason, vendor } => {
                tracing::info!(
                    request_id = %state.id(),
                    vendor = %vendor,
                    reason = %reason,
                    "Response blocked"
                );
                let payload = BlockEnvelope::response_violation(&reason).to_bytes();
                state.block(payload.clone());
                vec![payload]
            },
            Verdict::Error { message, code } => match self.handle.failure_policy {
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        request_id = %state.id(),
                        code = %code,
                        "Checker unavailable, failing open"
                    );
                    state.window.complete_first_check();
                    batch.into_raw()
                },
                FailurePolicy::FailClosed => {
                    tracing::warn!(
                        request_id = %state.id(),
                        code = %code,
                        error = %message,
                        "Checker unavailable, failing closed"
                    );
                    let payload = BlockEnvelope::unavailable(&code).to_bytes();
                    state.block(payload.clone());
                    vec![payload]
                },
            },
        }
    }
}
