//! Circuit breaker behaviour as seen through the moderation gate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contentguard::breaker::{BreakerConfig, BreakerRegistry, BreakerState};
use contentguard::config::{ContentSecurityHandle, FailurePolicy, RuleHandle};
use contentguard::moderation::{
    CheckPhase, CheckRequest, CheckerRegistry, ModerationGate, Verdict, VendorChecker,
};
use contentguard::{GuardError, Result};

/// Fails while `down` is set, passes otherwise.
struct FlakyChecker {
    down: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FlakyChecker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            down: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VendorChecker for FlakyChecker {
    fn vendor(&self) -> &str {
        "flaky"
    }

    async fn check_text(&self, _req: &CheckRequest<'_>) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            Err(GuardError::VendorUnreachable("connection refused".into()))
        } else {
            Ok(Verdict::Pass)
        }
    }
}

fn breaker_config() -> BreakerConfig {
    BreakerConfig {
        request_volume_threshold: 10,
        error_threshold_percentage: 50,
        sleep_window_ms: 5_000,
        rolling_window_ms: 60_000,
        timeout_ms: 1_000,
        max_concurrent: 8,
        enabled: true,
    }
}

fn rule(id: &str, policy: FailurePolicy) -> RuleHandle {
    RuleHandle {
        id: id.into(),
        content_security: Some(ContentSecurityHandle {
            failure_policy: policy,
            breaker: breaker_config(),
            ..ContentSecurityHandle::new("flaky", "http://unused")
        }),
        sensitive_words: None,
    }
}

fn registry(checker: Arc<FlakyChecker>) -> CheckerRegistry {
    let mut registry = CheckerRegistry::new();
    registry.register(checker);
    registry
}

fn error_code(verdict: &Verdict) -> Option<&str> {
    match verdict {
        Verdict::Error { code, .. } => Some(code.as_str()),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_short_circuits_then_recovers() {
    let checker = FlakyChecker::new();
    let checkers = registry(Arc::clone(&checker));
    let breakers = BreakerRegistry::new();
    let gate = ModerationGate::for_rule(&rule("chat", FailurePolicy::FailClosed), &checkers, &breakers)
        .unwrap()
        .unwrap();

    // 4 passes, then 6 failures: 60% of 10 calls.
    for _ in 0..4 {
        assert!(gate.check("hello", CheckPhase::Content).await.is_pass());
    }
    checker.down.store(true, Ordering::SeqCst);
    for _ in 0..6 {
        let verdict = gate.check("hello", CheckPhase::Content).await;
        assert_eq!(error_code(&verdict), Some("vendor_error"));
    }

    let snapshot = breakers.snapshot();
    assert_eq!(snapshot[0].0, "flaky:chat");
    assert_eq!(snapshot[0].1.state, BreakerState::Open);

    // 11th call: fallback, checker untouched.
    let verdict = gate.check("hello", CheckPhase::Content).await;
    assert_eq!(error_code(&verdict), Some("circuit_open"));
    assert_eq!(checker.calls.load(Ordering::SeqCst), 10);

    // After the sleep window a trial reaches the checker again.
    checker.down.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_millis(5_000)).await;
    assert!(gate.check("hello", CheckPhase::Content).await.is_pass());
    assert_eq!(checker.calls.load(Ordering::SeqCst), 11);
    assert_eq!(breakers.snapshot()[0].1.state, BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_slow_vendor_times_out() {
    let checker = Arc::new(FlakyChecker {
        down: AtomicBool::new(false),
        delay: Some(Duration::from_secs(5)),
        calls: AtomicUsize::new(0),
    });
    let checkers = registry(checker);
    let breakers = BreakerRegistry::new();
    let gate = ModerationGate::for_rule(&rule("chat", FailurePolicy::FailOpen), &checkers, &breakers)
        .unwrap()
        .unwrap();

    let verdict = gate.check("hello", CheckPhase::Prompt).await;
    assert_eq!(error_code(&verdict), Some("timeout"));
    assert_eq!(breakers.snapshot()[0].1.errors, 1);
}

#[tokio::test]
async fn test_breakers_are_per_vendor_and_rule() {
    let checker = FlakyChecker::new();
    let checkers = registry(checker);
    let breakers = BreakerRegistry::new();

    let chat = rule("chat", FailurePolicy::FailClosed);
    let images = rule("images", FailurePolicy::FailClosed);
    ModerationGate::for_rule(&chat, &checkers, &breakers).unwrap();
    ModerationGate::for_rule(&chat, &checkers, &breakers).unwrap();
    ModerationGate::for_rule(&images, &checkers, &breakers).unwrap();

    let names: Vec<_> = breakers.snapshot().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["flaky:chat", "flaky:images"]);
}

#[tokio::test]
async fn test_unknown_vendor_is_reported() {
    let checkers = registry(FlakyChecker::new());
    let breakers = BreakerRegistry::new();
    let mut rule = rule("chat", FailurePolicy::FailClosed);
    if let Some(cs) = rule.content_security.as_mut() {
        cs.vendor = "nobody".into();
    }

    let err = ModerationGate::for_rule(&rule, &checkers, &breakers).unwrap_err();
    assert!(matches!(err, GuardError::UnsupportedVendor { .. }));
    assert!(breakers.is_empty());
}
