//! Gateway server: rule lookup, pre-check, forwarding and response checks.
//!
//! ```text
//! Client App        ContentGuard                    Upstream
//!     |                  |                              |
//!     |-- request ------>| rule? --no--> forward ------>|
//!     |                  |  yes                          |
//!     |                  | precheck (words, prompt)      |
//!     |<-- 400/503 ------|  rejected                     |
//!     |                  |-- forward ------------------->|
//!     |                  |<-- SSE or JSON ---------------|
//!     |<-- moderated ----| intercept / buffered check    |
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{self, Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::rules::RuleCache;
use super::stats::{ProxyStats, StatsSummary};
use crate::breaker::BreakerRegistry;
use crate::config::{Config, FailurePolicy, RuleHandle};
use crate::error::{GuardError, Result};
use crate::matcher::{FileWordSource, MatcherCache, WordSource};
use crate::moderation::{BlockEnvelope, CheckPhase, CheckerRegistry, ModerationGate, Verdict};
use crate::precheck::{precheck, PreCheckOutcome};
use crate::stream::{intercept_with, sse, ActiveRequests};

/// Headers never copied between client and upstream.
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
];

/// Error code for a response body the gateway cannot decode.
const UNSUPPORTED_ENCODING: &str = "unsupported_encoding";

/// Shared gateway state
pub struct GatewayState {
    config: Config,
    client: Client,
    rules: RuleCache,
    matchers: MatcherCache,
    words: Arc<dyn WordSource>,
    breakers: BreakerRegistry,
    checkers: CheckerRegistry,
    active: Arc<ActiveRequests>,
    stats: Arc<ProxyStats>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("upstream", &self.config.proxy.upstream)
            .field("rules", &self.rules.len())
            .field("checkers", &self.checkers)
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    /// State with the built-in HTTP vendors and file word lists.
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.proxy.timeout_secs))
            .build()
            .map_err(|e| GuardError::Server(format!("Failed to create HTTP client: {e}")))?;

        let checkers = CheckerRegistry::with_http_vendors(client.clone());
        let words: Arc<dyn WordSource> = Arc::new(FileWordSource::new(config.words.dir.clone()));
        let rules = RuleCache::from_config(&config);

        Ok(Self {
            config,
            client,
            rules,
            matchers: MatcherCache::new(),
            words,
            breakers: BreakerRegistry::new(),
            checkers,
            active: Arc::new(ActiveRequests::new()),
            stats: Arc::new(ProxyStats::new()),
        })
    }

    /// Replace the vendor checkers.
    #[must_use]
    pub fn with_checkers(mut self, checkers: CheckerRegistry) -> Self {
        self.checkers = checkers;
        self
    }

    /// Replace the word-list source.
    #[must_use]
    pub fn with_word_source(mut self, words: Arc<dyn WordSource>) -> Self {
        self.words = words;
        self
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rule lookup.
    pub fn rules(&self) -> &RuleCache {
        &self.rules
    }

    /// Breakers created so far.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// In-flight intercepted streams.
    pub fn active(&self) -> &Arc<ActiveRequests> {
        &self.active
    }

    /// Request counters.
    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }
}

/// ContentGuard gateway server
#[derive(Debug)]
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a server from configuration
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::from_state(GatewayState::new(config)?))
    }

    /// Create a server around prepared state
    pub fn from_state(state: GatewayState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Get the router for the gateway
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/stats/reset", post(reset_stats_handler))
            .fallback(forward_handler)
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let addr = self.state.config.proxy.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GuardError::Server(format!("Failed to bind {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| GuardError::Server(e.to_string()))?;
        tracing::info!("ContentGuard listening on {local}");
        tracing::info!("Upstream: {}", self.state.config.proxy.upstream);
        tracing::info!(
            "Rules: {}, vendors: {}",
            self.state.rules.len(),
            self.state.checkers.vendors().join(", ")
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| GuardError::Server(e.to_string()))
    }

    /// Get statistics
    pub fn stats(&self) -> StatsSummary {
        self.state.stats.summary()
    }
}

// === Handlers ===

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "contentguard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stats_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let breakers: serde_json::Map<_, _> = state
        .breakers
        .snapshot()
        .into_iter()
        .map(|(name, snapshot)| (name, json!(snapshot)))
        .collect();

    Json(json!({
        "requests": state.stats.summary(),
        "streams": state.active.stats(),
        "breakers": breakers,
    }))
}

async fn reset_stats_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    state.stats.reset();
    Json(json!({"status": "reset"}))
}

/// Every other path: screen, forward, check the response.
async fn forward_handler(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let body = match body::to_bytes(body, state.config.proxy.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            state.stats.record_error();
            return proxy_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Failed to read request body: {e}"),
            );
        },
    };

    let Some(rule) = state.rules.resolve(parts.uri.path()) else {
        state.stats.record_bypassed();
        let response = match send_upstream(&state, &parts, body, false).await {
            Ok(upstream) => passthrough(upstream),
            Err(e) => upstream_failure(&state, &e),
        };
        state.stats.record_request(start.elapsed());
        return response;
    };

    let gate = match ModerationGate::for_rule(&rule, &state.checkers, &state.breakers) {
        Ok(gate) => gate.map(Arc::new),
        Err(e) => match unusable_gate(&rule, &e) {
            Some(response) => {
                state.stats.record_error();
                return response;
            },
            None => None,
        },
    };

    let outcome = precheck(
        &rule,
        &body,
        gate.as_deref(),
        &state.matchers,
        state.words.as_ref(),
    )
    .await;
    if let PreCheckOutcome::Reject { status, envelope } = outcome {
        state.stats.record_blocked();
        state.stats.record_request(start.elapsed());
        return (status, Json(envelope)).into_response();
    }

    let upstream = match send_upstream(&state, &parts, body, gate.is_some()).await {
        Ok(upstream) => upstream,
        Err(e) => return upstream_failure(&state, &e),
    };

    let response = match gate {
        Some(gate) if upstream.status().is_success() => {
            moderate_response(&state, &rule, gate, upstream).await
        },
        _ => passthrough(upstream),
    };
    state.stats.record_request(start.elapsed());
    response
}

/// A rule whose checker cannot be built falls back to its failure policy.
fn unusable_gate(rule: &RuleHandle, err: &GuardError) -> Option<Response> {
    let policy = rule
        .content_security
        .as_ref()
        .map(|cs| cs.failure_policy)
        .unwrap_or_default();
    tracing::error!(rule = %rule.id, error = %err, ?policy, "Moderation gate unavailable");

    match policy {
        FailurePolicy::FailOpen => None,
        FailurePolicy::FailClosed => Some(
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(BlockEnvelope::unavailable(err.code())),
            )
                .into_response(),
        ),
    }
}

/// Forward the request. A moderated request asks for an unencoded body,
/// since the checks read response text.
async fn send_upstream(
    state: &GatewayState,
    parts: &Parts,
    body: Bytes,
    moderated: bool,
) -> std::result::Result<reqwest::Response, reqwest::Error> {
    let path = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
    let url = format!("{}{}", state.config.proxy.upstream.trim_end_matches('/'), path);

    let mut headers = forwardable(&parts.headers);
    if !headers.contains_key(header::AUTHORIZATION) {
        if let Some(ref api_key) = state.config.proxy.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(header::AUTHORIZATION, value);
            }
        }
    }
    if moderated {
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }

    tracing::debug!(method = %parts.method, url = %url, "Forwarding request");
    state
        .client
        .request(parts.method.clone(), url)
        .headers(headers)
        .body(body)
        .send()
        .await
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}

/// The `Content-Encoding` of a body that is not plain text.
fn body_encoding(response: &reqwest::Response) -> Option<String> {
    let encoding = response
        .headers()
        .get(header::CONTENT_ENCODING)?
        .to_str()
        .unwrap_or("unknown")
        .trim()
        .to_ascii_lowercase();
    (!encoding.is_empty() && encoding != "identity").then_some(encoding)
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("event-stream"))
}

fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"))
}

async fn moderate_response(
    state: &GatewayState,
    rule: &RuleHandle,
    gate: Arc<ModerationGate>,
    upstream: reqwest::Response,
) -> Response {
    if let Some(encoding) = body_encoding(&upstream) {
        return match gate.handle().failure_policy {
            FailurePolicy::FailOpen => {
                tracing::warn!(rule = %rule.id, encoding = %encoding, "Encoded response not checked, failing open");
                passthrough(upstream)
            },
            FailurePolicy::FailClosed => {
                tracing::warn!(rule = %rule.id, encoding = %encoding, "Encoded response not checked, failing closed");
                state.stats.record_blocked();
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(BlockEnvelope::unavailable(UNSUPPORTED_ENCODING)),
                )
                    .into_response()
            },
        };
    }

    if is_event_stream(&upstream) {
        state.stats.record_streaming_request();
        let status = upstream.status();
        let headers = forwardable(upstream.headers());
        let stats = Arc::clone(&state.stats);
        let stream = intercept_with(
            gate,
            &state.active,
            &rule.id,
            Box::pin(upstream.bytes_stream()),
            move || stats.record_blocked(),
        );

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return response;
    }

    if !is_json(&upstream) {
        return passthrough(upstream);
    }

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            state.stats.record_error();
            return proxy_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to read upstream response: {e}"),
            );
        },
    };

    let content = sse::extract_message_content(&bytes).unwrap_or_default();
    if !content.trim().is_empty() {
        match gate.check(&content, CheckPhase::Content).await {
            Verdict::Pass => {},
            Verdict::Block { reason, vendor } => {
                tracing::info!(rule = %rule.id, vendor = %vendor, reason = %reason, "Response blocked");
                state.stats.record_blocked();
                return (status, Json(BlockEnvelope::response_violation(&reason))).into_response();
            },
            Verdict::Error { code, .. } => match gate.handle().failure_policy {
                FailurePolicy::FailOpen => {
                    tracing::warn!(rule = %rule.id, code = %code, "Response check unavailable, failing open");
                },
                FailurePolicy::FailClosed => {
                    tracing::warn!(rule = %rule.id, code = %code, "Response check unavailable, failing closed");
                    state.stats.record_blocked();
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(BlockEnvelope::unavailable(&code)),
                    )
                        .into_response();
                },
            },
        }
    }

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn passthrough(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn upstream_failure(state: &GatewayState, err: &reqwest::Error) -> Response {
    state.stats.record_error();
    tracing::warn!(error = %err, "Upstream request failed");
    proxy_error(
        StatusCode::BAD_GATEWAY,
        format!("Failed to connect to upstream: {err}"),
    )
}

fn proxy_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "message": message,
                "type": "proxy_error"
            }
        })),
    )
        .into_response()
}
