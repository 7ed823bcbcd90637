//! Per-request pipeline state and the in-flight registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use super::ContentWindow;

/// Unique id of one intercepted response. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the registry knows about a live request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Rule that attached the interceptor.
    pub rule_id: String,
    /// When the interceptor attached.
    pub started: Instant,
}

/// Snapshot for `/stats`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActiveRequestStats {
    /// Requests currently streaming.
    pub in_flight: usize,
    /// Requests finished, by any path.
    pub finished: u64,
    /// Finished requests that were blocked.
    pub blocked: u64,
}

/// Registry of in-flight intercepted requests.
#[derive(Debug, Default)]
pub struct ActiveRequests {
    entries: DashMap<RequestId, RequestInfo>,
    finished: AtomicU64,
    blocked: AtomicU64,
}

impl ActiveRequests {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request; the returned guard unregisters it on drop.
    pub fn register(self: &Arc<Self>, rule_id: &str) -> RequestGuard {
        let id = RequestId::new();
        self.entries.insert(
            id,
            RequestInfo {
                rule_id: rule_id.to_string(),
                started: Instant::now(),
            },
        );
        RequestGuard {
            id,
            registry: Arc::clone(self),
            blocked: false,
        }
    }

    /// True if `id` is still registered.
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Info about a live request.
    pub fn get(&self, id: RequestId) -> Option<RequestInfo> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no request is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters snapshot.
    pub fn stats(&self) -> ActiveRequestStats {
        ActiveRequestStats {
            in_flight: self.entries.len(),
            finished: self.finished.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
        }
    }
}

/// Removes its request from [`ActiveRequests`] exactly once, on drop.
#[derive(Debug)]
pub struct RequestGuard {
    id: RequestId,
    registry: Arc<ActiveRequests>,
    blocked: bool,
}

impl RequestGuard {
    /// Id of the guarded request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    fn mark_blocked(&mut self) {
        self.blocked = true;
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if let Some((_, info)) = self.registry.entries.remove(&self.id) {
            self.registry.finished.fetch_add(1, Ordering::Relaxed);
            if self.blocked {
                self.registry.blocked.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(
                request_id = %self.id,
                rule = %info.rule_id,
                elapsed_ms = info.started.elapsed().as_millis() as u64,
                "Request state released"
            );
        }
    }
}

/// Everything the pipeline tracks for one response.
#[derive(Debug)]
pub struct RequestState {
    /// Sliding window of response text.
    pub window: ContentWindow,
    /// Batches seen so far.
    pub processed_batches: u64,
    /// Vendor checks issued so far.
    pub checks: u64,
    block_payload: Option<Bytes>,
    guard: RequestGuard,
}

impl RequestState {
    /// Register a new request under `rule_id`.
    pub fn new(active: &Arc<ActiveRequests>, rule_id: &str, window_size: usize) -> Self {
        Self {
            window: ContentWindow::new(window_size),
            processed_batches: 0,
            checks: 0,
            block_payload: None,
            guard: active.register(rule_id),
        }
    }

    /// Request id.
    pub fn id(&self) -> RequestId {
        self.guard.id()
    }

    /// True once a block decision was made. Sticky.
    pub fn is_blocked(&self) -> bool {
        self.block_payload.is_some()
    }

    /// The payload that replaces the rest of the stream.
    pub fn block_payload(&self) -> Option<&Bytes> {
        self.block_payload.as_ref()
    }

    /// Record the block decision. Later calls keep the first payload.
    pub fn block(&mut self, payload: Bytes) {
        if self.block_payload.is_none() {
            self.guard.mark_blocked();
            self.block_payload = Some(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_unregisters_on_drop() {
        let active = Arc::new(ActiveRequests::new());
        let state = RequestState::new(&active, "chat", 50);
        let id = state.id();
        assert!(active.contains(id));
        assert_eq!(active.get(id).unwrap().rule_id, "chat");

        drop(state);
        assert!(!active.contains(id));
        assert!(active.is_empty());
        assert_eq!(active.stats().finished, 1);
        assert_eq!(active.stats().blocked, 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let active = Arc::new(ActiveRequests::new());
        let a = RequestState::new(&active, "chat", 10);
        let b = RequestState::new(&active, "chat", 10);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().to_string().len(), 36);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_block_is_sticky_and_counted() {
        let active = Arc::new(ActiveRequests::new());
        let mut state = RequestState::new(&active, "chat", 10);
        state.block(Bytes::from_static(b"first"));
        state.block(Bytes::from_static(b"second"));
        assert!(state.is_blocked());
        assert_eq!(state.block_payload().unwrap(), &Bytes::from_static(b"first"));

        drop(state);
        assert_eq!(active.stats().blocked, 1);
    }

    #[test]
    fn test_cleanup_across_threads() {
        let active = Arc::new(ActiveRequests::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                std::thread::spawn(move || {
                    let state = RequestState::new(&active, "chat", 10);
                    assert!(active.contains(state.id()));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(active.is_empty());
        assert_eq!(active.stats().finished, 8);
    }
}
