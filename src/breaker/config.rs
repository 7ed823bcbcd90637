//! Circuit breaker settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{GuardError, Result};

/// Tunables for one [`CircuitBreaker`](super::CircuitBreaker).
///
/// Durations are milliseconds in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// When false the breaker never opens; timeout and concurrency limits
    /// still apply.
    pub enabled: bool,

    /// Minimum calls in the rolling window before the error rate is judged.
    pub request_volume_threshold: u64,

    /// Error rate (0-100) at or above which the breaker opens.
    pub error_threshold_percentage: u64,

    /// How long the breaker stays open before allowing a trial call.
    pub sleep_window_ms: u64,

    /// Length of the rolling statistics window.
    pub rolling_window_ms: u64,

    /// Per-call deadline.
    pub timeout_ms: u64,

    /// Calls allowed in flight at once. At most `Semaphore::MAX_PERMITS`.
    pub max_concurrent: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_volume_threshold: 30,
            error_threshold_percentage: 70,
            sleep_window_ms: 15_000,
            rolling_window_ms: 10_000,
            timeout_ms: 1_800,
            max_concurrent: 200,
        }
    }
}

impl BreakerConfig {
    /// Sleep window as a `Duration`.
    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    /// Rolling window as a `Duration`.
    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }

    /// Call deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject settings that would make the breaker meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.error_threshold_percentage > 100 {
            return Err(GuardError::Config(format!(
                "breaker.error_threshold_percentage must be 0-100, got {}",
                self.error_threshold_percentage
            )));
        }
        if self.max_concurrent == 0 || self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(GuardError::Config(format!(
                "breaker.max_concurrent must be 1-{}, got {}",
                Semaphore::MAX_PERMITS,
                self.max_concurrent
            )));
        }
        if self.timeout_ms == 0 || self.rolling_window_ms == 0 {
            return Err(GuardError::Config(
                "breaker.timeout_ms and breaker.rolling_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
