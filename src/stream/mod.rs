//! Streaming interception pipeline.
//!
//! Upstream response bytes arrive split at arbitrary points. The pipeline
//! rebuilds lines ([`FrameReassembler`]), groups them ([`BatchAccumulator`]),
//! extracts delta text ([`sse`]) into a bounded [`ContentWindow`] and lets
//! the [`ModerationGate`](crate::moderation::ModerationGate) decide whether
//! each batch is forwarded or replaced by a block payload.
//!
//! Per-request state lives in a [`RequestState`] registered in
//! [`ActiveRequests`] for exactly as long as the output stream exists.

mod batch;
mod interceptor;
mod reassembler;
pub mod sse;
mod state;
mod window;

pub use batch::{Batch, BatchAccumulator};
pub use interceptor::{intercept, intercept_with};
pub use reassembler::{Flush, Frame, FrameReassembler};
pub use state::{ActiveRequestStats, ActiveRequests, RequestGuard, RequestId, RequestInfo, RequestState};
pub use window::ContentWindow;
