//! # ContentGuard - Content-Policy Enforcement for LLM Gateways
//!
//! Inspects requests to and streamed responses from an OpenAI-compatible
//! upstream, runs text through external moderation vendors and a local
//! sensitive-word automaton, and blocks traffic that violates policy.
//!
//! ## Features
//!
//! - **Streaming interception**: SSE bodies split at arbitrary byte
//!   boundaries are reassembled, batched and checked over a sliding window
//! - **Circuit breaking**: bounded concurrency, per-call deadline and
//!   closed/open/half-open states in front of every vendor
//! - **Sensitive words**: Aho-Corasick matching, built once per word list
//! - **Failure policy**: every rule declares fail-open or fail-closed
//!
//! ## Pipeline
//!
//! ```text
//!   bytes ─▶ FrameReassembler ─▶ BatchAccumulator ─▶ ContentWindow
//!                                                        │
//!            forward raw bytes ◀── ModerationGate ◀──────┘
//!            or block payload        (CircuitBreaker + VendorChecker)
//! ```
//!
//! ### Response Codes
//!
//! | Code | Meaning                              | HTTP (request side) |
//! |------|--------------------------------------|---------------------|
//! | 1400 | Prompt rejected by vendor            | 400                 |
//! | 1401 | Response rejected by vendor          | in-stream           |
//! | 1402 | Prompt hit a sensitive word          | 400                 |
//! | 1503 | Checker unavailable, fail-closed     | 503                 |
//!
//! ## Quick Start
//!
//! ### Sensitive-Word Matching
//!
//! ```
//! use contentguard::{MatchMode, PatternMatcher};
//!
//! let matcher = PatternMatcher::from_words(["he", "she", "hers"], MatchMode::AllPerPosition);
//! assert_eq!(matcher.search("ushers"), vec!["she", "he", "hers"]);
//! ```
//!
//! ### Guarding a Vendor Call
//!
//! ```rust,ignore
//! use contentguard::{BreakerConfig, CircuitBreaker};
//!
//! let breaker = CircuitBreaker::new("zkrj:chat", BreakerConfig::default());
//! let verdict = breaker
//!     .call_or_else(checker.check_text(&request), |err| fallback(err))
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`stream`]: Reassembly, batching, windowing and the interceptor
//! - [`moderation`]: Vendor checkers, verdicts and the moderation gate
//! - [`breaker`]: Circuit breaker and its registry
//! - [`matcher`]: Aho-Corasick automaton and word-list cache
//! - [`precheck`]: Request-side screening
//! - [`proxy`]: HTTP gateway (Axum-based)
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod breaker;
pub mod config;
pub mod error;
pub mod matcher;
pub mod moderation;
pub mod precheck;
pub mod proxy;
pub mod stream;

// Re-exports for convenience
pub use breaker::{BreakerConfig, BreakerError, BreakerRegistry, BreakerState, CircuitBreaker};
pub use config::{Config, ContentSecurityHandle, FailurePolicy, RuleHandle, SensitiveWordsHandle};
pub use error::{GuardError, Result};
pub use matcher::{MatchMode, MatcherCache, PatternMatcher, WordSource};
pub use moderation::{BlockEnvelope, CheckerRegistry, ModerationGate, Verdict, VendorChecker};
pub use precheck::{precheck, PreCheckOutcome};
pub use proxy::{GatewayServer, GatewayState};
pub use stream::{intercept, ActiveRequests, RequestState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
