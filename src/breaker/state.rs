//! Breaker state machine and rolling counters.

use serde::Serialize;
use tokio::time::Instant;

use super::BreakerConfig;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow and outcomes are counted.
    Closed,
    /// Calls are refused until the sleep window elapses.
    Open,
    /// One trial call decides whether to close again.
    HalfOpen,
}

/// Outcome counts for the current rolling window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RollingCounts {
    pub requests: u64,
    pub errors: u64,
    pub window_start: Instant,
}

impl RollingCounts {
    fn new(now: Instant) -> Self {
        Self {
            requests: 0,
            errors: 0,
            window_start: now,
        }
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Normal,
    Trial,
}

/// Mutable breaker core, guarded by the breaker's mutex.
#[derive(Debug)]
pub(crate) struct Machine {
    pub state: BreakerState,
    pub counts: RollingCounts,
    pub opened_at: Option<Instant>,
    pub trial_in_flight: bool,
}

impl Machine {
    pub fn new(now: Instant) -> Self {
        Self {
            state: BreakerState::Closed,
            counts: RollingCounts::new(now),
            opened_at: None,
            trial_in_flight: false,
        }
    }

    fn roll(&mut self, now: Instant, config: &BreakerConfig) {
        if now.duration_since(self.counts.window_start) >= config.rolling_window() {
            self.counts = RollingCounts::new(now);
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    /// Decide whether a call may run. `None` means refuse.
    pub fn admit(&mut self, now: Instant, config: &BreakerConfig) -> Option<Admission> {
        match self.state {
            BreakerState::Closed => {
                self.roll(now, config);
                Some(Admission::Normal)
            },
            BreakerState::Open => {
                let slept = self
                    .opened_at
                    .map_or(true, |at| now.duration_since(at) >= config.sleep_window());
                if slept {
                    self.state = BreakerState::HalfOpen;
                    self.trial_in_flight = true;
                    Some(Admission::Trial)
                } else {
                    None
                }
            },
            BreakerState::HalfOpen => {
                if self.trial_in_flight {
                    None
                } else {
                    self.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            },
        }
    }

    /// Record a finished call. Returns the new state when it changed.
    pub fn record(
        &mut self,
        admission: Admission,
        success: bool,
        now: Instant,
        config: &BreakerConfig,
    ) -> Option<BreakerState> {
        match admission {
            Admission::Trial => {
                self.trial_in_flight = false;
                if success {
                    self.state = BreakerState::Closed;
                    self.opened_at = None;
                    self.counts = RollingCounts::new(now);
                } else {
                    self.open(now);
                }
                Some(self.state)
            },
            Admission::Normal => {
                // A call admitted while closed may finish after a trip.
                if self.state != BreakerState::Closed {
                    return None;
                }
                self.roll(now, config);
                self.counts.requests += 1;
                if !success {
                    self.counts.errors += 1;
                }
                if config.enabled && self.should_trip(config) {
                    self.open(now);
                    return Some(BreakerState::Open);
                }
                None
            },
        }
    }

    /// A trial call was dropped before finishing.
    pub fn abandon_trial(&mut self) {
        self.trial_in_flight = false;
    }

    fn should_trip(&self, config: &BreakerConfig) -> bool {
        let RollingCounts {
            requests, errors, ..
        } = self.counts;
        requests > 0
            && requests >= config.request_volume_threshold
            && errors * 100 / requests >= config.error_threshold_percentage
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            request_volume_threshold: 4,
            error_threshold_percentage: 50,
            sleep_window_ms: 1_000,
            rolling_window_ms: 10_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_trips_at_threshold() {
        let config = config();
        let now = Instant::now();
        let mut m = Machine::new(now);

        for success in [true, false, true] {
            let a = m.admit(now, &config).unwrap();
            assert_eq!(m.record(a, success, now, &config), None);
        }
        let a = m.admit(now, &config).unwrap();
        assert_eq!(m.record(a, false, now, &config), Some(BreakerState::Open));
        assert!(m.admit(now, &config).is_none());
    }

    #[test]
    fn test_below_volume_never_trips() {
        let config = config();
        let now = Instant::now();
        let mut m = Machine::new(now);

        for _ in 0..3 {
            let a = m.admit(now, &config).unwrap();
            m.record(a, false, now, &config);
        }
        assert_eq!(m.state, BreakerState::Closed);
    }

    #[test]
    fn test_rolling_window_resets_counts() {
        let config = config();
        let start = Instant::now();
        let mut m = Machine::new(start);

        for _ in 0..3 {
            let a = m.admit(start, &config).unwrap();
            m.record(a, false, start, &config);
        }
        let later = start + Duration::from_millis(10_000);
        let a = m.admit(later, &config).unwrap();
        m.record(a, false, later, &config);
        assert_eq!(m.counts.requests, 1);
        assert_eq!(m.state, BreakerState::Closed);
    }

    #[test]
    fn test_half_open_allows_single_trial() {
        let config = config();
        let now = Instant::now();
        let mut m = Machine::new(now);
        m.open(now);

        let later = now + Duration::from_millis(1_000);
        assert_eq!(m.admit(later, &config), Some(Admission::Trial));
        assert_eq!(m.admit(later, &config), None);

        m.abandon_trial();
        assert_eq!(m.admit(later, &config), Some(Admission::Trial));
        assert_eq!(
            m.record(Admission::Trial, true, later, &config),
            Some(BreakerState::Closed)
        );
        assert_eq!(m.counts.requests, 0);
    }

    #[test]
    fn test_disabled_never_trips() {
        let config = BreakerConfig {
            enabled: false,
            ..config()
        };
        let now = Instant::now();
        let mut m = Machine::new(now);
        for _ in 0..10 {
            let a = m.admit(now, &config).unwrap();
            m.record(a, false, now, &config);
        }
        assert_eq!(m.state, BreakerState::Closed);
    }
}
