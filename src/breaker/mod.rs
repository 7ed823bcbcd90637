//! Circuit breaker for calls to external moderation vendors.
//!
//! Wraps any future with a concurrency cap, a deadline and an error-rate
//! breaker. A breaker is shared by every request that talks to the same
//! vendor; [`BreakerRegistry`] hands them out by key.
//!
//! ```text
//!   Closed --(error rate >= threshold, volume reached)--> Open
//!   Open   --(sleep window elapsed, next caller)--------> HalfOpen
//!   HalfOpen --(trial ok)--> Closed
//!   HalfOpen --(trial failed)--> Open
//! ```

mod config;
mod registry;
mod state;

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;

pub use config::BreakerConfig;
pub use registry::BreakerRegistry;
pub use state::BreakerState;

use state::{Admission, Machine};

/// Why a guarded call did not produce a value.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The breaker is open; the call was not attempted.
    #[error("circuit open")]
    Open,
    /// No concurrency permit was free.
    #[error("rejected: concurrency limit reached")]
    Rejected,
    /// The call ran past its deadline and was dropped.
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// The call itself failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Short code carried into `Verdict::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            BreakerError::Open => "circuit_open",
            BreakerError::Rejected => "rejected",
            BreakerError::Timeout(_) => "timeout",
            BreakerError::Inner(_) => "vendor_error",
        }
    }
}

/// Point-in-time view for `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Current position.
    pub state: BreakerState,
    /// Calls counted in the current window.
    pub requests: u64,
    /// Failures counted in the current window.
    pub errors: u64,
    /// Free concurrency permits.
    pub available_permits: usize,
}

/// Async call guard with closed/open/half-open states.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    machine: Mutex<Machine>,
    permits: Semaphore,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent.min(Semaphore::MAX_PERMITS));
        Self {
            name: name.into(),
            config,
            machine: Mutex::new(Machine::new(Instant::now())),
            permits,
        }
    }

    /// Registry key of this breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the breaker was built with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current position.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Counters and state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let machine = self.lock();
        BreakerSnapshot {
            state: machine.state,
            requests: machine.counts.requests,
            errors: machine.counts.errors,
            available_permits: self.permits.available_permits(),
        }
    }

    // The mutex is never held across an await point.
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Option<Ticket<'_>> {
        let admission = self.lock().admit(Instant::now(), &self.config)?;
        if admission == Admission::Trial {
            tracing::info!(breaker = %self.name, "Circuit half-open, sending trial call");
        }
        Some(Ticket {
            breaker: self,
            admission,
            settled: false,
        })
    }

    /// Run `fut` under the breaker.
    ///
    /// Timeouts and rejected permits count as failures. An `Open` result
    /// means `fut` was never polled.
    pub async fn call<T, E, F>(&self, fut: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let Some(ticket) = self.admit() else {
            tracing::debug!(breaker = %self.name, "Circuit open, short-circuiting call");
            return Err(BreakerError::Open);
        };

        let Ok(_permit) = self.permits.try_acquire() else {
            tracing::warn!(
                breaker = %self.name,
                max_concurrent = self.config.max_concurrent,
                "Concurrency limit reached, rejecting call"
            );
            ticket.settle(false);
            return Err(BreakerError::Rejected);
        };

        match tokio::time::timeout(self.config.timeout(), fut).await {
            Ok(Ok(value)) => {
                ticket.settle(true);
                Ok(value)
            },
            Ok(Err(err)) => {
                ticket.settle(false);
                Err(BreakerError::Inner(err))
            },
            Err(_) => {
                tracing::warn!(
                    breaker = %self.name,
                    timeout_ms = self.config.timeout_ms,
                    "Guarded call timed out"
                );
                ticket.settle(false);
                Err(BreakerError::Timeout(self.config.timeout_ms))
            },
        }
    }

    /// Run `fut` under the breaker, mapping any failure through `fallback`.
    pub async fn call_or_else<T, E, F, G>(&self, fut: F, fallback: G) -> T
    where
        F: Future<Output = Result<T, E>>,
        G: FnOnce(BreakerError<E>) -> T,
    {
        match self.call(fut).await {
            Ok(value) => value,
            Err(err) => fallback(err),
        }
    }
}

/// One admitted call. Dropping it unsettled (the caller was cancelled) frees
/// a half-open trial slot without counting an outcome.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Ticket<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        let changed = self.breaker.lock().record(
            self.admission,
            success,
            Instant::now(),
            &self.breaker.config,
        );
        match changed {
            Some(BreakerState::Open) => {
                tracing::warn!(breaker = %self.breaker.name, "Circuit opened");
            },
            Some(BreakerState::Closed) => {
                tracing::info!(breaker = %self.breaker.name, "Circuit closed");
            },
            _ => {},
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.lock().abandon_trial();
        }
    }
}
