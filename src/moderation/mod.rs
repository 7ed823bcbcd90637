//! External moderation: vendor checkers, verdicts and the streaming gate.
//!
//! A [`ModerationGate`] owns one rule's vendor checker and the shared
//! [`CircuitBreaker`](crate::breaker::CircuitBreaker) in front of it. The
//! gate turns every vendor outcome into a [`Verdict`] and applies the rule's
//! [`FailurePolicy`](crate::config::FailurePolicy) to errors.
//!
//! ```text
//!   unblocked --Pass--> unblocked
//!   unblocked --Block / Error+fail_closed--> blocked (terminal)
//!   unblocked --Error+fail_open--> unblocked
//! ```

mod checker;
mod gate;
mod registry;
mod verdict;
pub mod vendors;

pub use checker::{CheckPhase, CheckRequest, VendorChecker};
pub use gate::ModerationGate;
pub use registry::{CheckerRegistry, DEFAULT_VENDOR};
pub use verdict::{
    BlockEnvelope, Verdict, CODE_CHECKER_UNAVAILABLE, CODE_PROMPT_VIOLATION,
    CODE_RESPONSE_VIOLATION, CODE_SENSITIVE_WORD,
};
