//! Response interceptor: upstream byte stream in, moderated byte stream out.
//!
//! The pipeline is pulled by the consumer. The next upstream chunk is not
//! polled until every batch completed by the current chunk (and any check
//! it triggered) has resolved.
//!
//! ```text
//!   upstream chunk
//!        │
//!        ▼
//!   FrameReassembler ──frames──▶ BatchAccumulator ──batch──▶ ModerationGate
//!                                                                │
//!                          raw frame bytes / block payload ◀─────┘
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use super::{ActiveRequests, BatchAccumulator, FrameReassembler, RequestState};
use crate::error::GuardError;
use crate::moderation::ModerationGate;

struct Pipeline<S> {
    upstream: S,
    reassembler: FrameReassembler,
    batcher: BatchAccumulator,
    gate: Arc<ModerationGate>,
    request: RequestState,
    out: VecDeque<Bytes>,
    done: bool,
    on_block: Option<Box<dyn FnOnce() + Send>>,
}

impl<S> Pipeline<S> {
    fn blocked(&mut self) -> bool {
        let blocked = self.request.is_blocked();
        if blocked {
            if let Some(hook) = self.on_block.take() {
                hook();
            }
        }
        blocked
    }

    async fn on_chunk(&mut self, chunk: &[u8]) {
        for frame in self.reassembler.feed(chunk) {
            let Some(batch) = self.batcher.push(frame) else {
                continue;
            };
            let emitted = self.gate.on_batch(&mut self.request, batch).await;
            self.out.extend(emitted);
            if self.blocked() {
                // Remaining frames are discarded; the payload ends the stream.
                self.done = true;
                return;
            }
        }
    }

    async fn on_end(&mut self) {
        self.done = true;
        let flush = self.reassembler.finish();

        if let Some(frame) = flush.frame {
            if let Some(batch) = self.batcher.push(frame) {
                let emitted = self.gate.on_batch(&mut self.request, batch).await;
                self.out.extend(emitted);
                if self.blocked() {
                    return;
                }
            }
        }

        let last = self.batcher.finish();
        let emitted = self.gate.on_finish(&mut self.request, last).await;
        self.out.extend(emitted);

        if !self.blocked() && !flush.trailing.is_empty() {
            self.out.push_back(flush.trailing);
        }

        tracing::info!(
            request_id = %self.request.id(),
            batches = self.request.processed_batches,
            checks = self.request.checks,
            blocked = self.request.is_blocked(),
            "Stream finished"
        );
    }
}

/// Attach the moderation pipeline to an upstream body.
///
/// A fresh [`RequestState`] is registered in `active` and released when the
/// returned stream finishes, errors, is cut short by a block, or is dropped
/// by the consumer.
pub fn intercept<S, E>(
    gate: Arc<ModerationGate>,
    active: &Arc<ActiveRequests>,
    rule_id: &str,
    upstream: S,
) -> impl Stream<Item = Result<Bytes, GuardError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    intercept_with(gate, active, rule_id, upstream, || {})
}

/// Like [`intercept`], calling `on_block` once if the response is blocked.
pub fn intercept_with<S, E, F>(
    gate: Arc<ModerationGate>,
    active: &Arc<ActiveRequests>,
    rule_id: &str,
    upstream: S,
    on_block: F,
) -> impl Stream<Item = Result<Bytes, GuardError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let handle = gate.handle();
    let request = RequestState::new(active, rule_id, handle.window_size);
    tracing::debug!(
        request_id = %request.id(),
        rule = rule_id,
        batch_size = handle.batch_size,
        window_size = handle.window_size,
        "Attached response interceptor"
    );

    let pipeline = Pipeline {
        upstream,
        reassembler: FrameReassembler::new(),
        batcher: BatchAccumulator::new(handle.batch_size),
        gate: Arc::clone(&gate),
        request,
        out: VecDeque::new(),
        done: false,
        on_block: Some(Box::new(on_block)),
    };

    stream::unfold(pipeline, |mut p| async move {
        loop {
            if let Some(bytes) = p.out.pop_front() {
                return Some((Ok(bytes), p));
            }
            if p.done {
                return None;
            }

            match p.upstream.next().await {
                Some(Ok(chunk)) => p.on_chunk(&chunk).await,
                Some(Err(e)) => {
                    tracing::warn!(request_id = %p.request.id(), error = %e, "Upstream stream failed");
                    p.done = true;
                    return Some((Err(GuardError::Upstream(e.to_string())), p));
                },
                None => p.on_end().await,
            }
        }
    })
}
