//! ZKRJ text moderation API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{GuardError, Result};
use crate::moderation::{CheckPhase, CheckRequest, Verdict, VendorChecker};

const VENDOR: &str = "zkrj";

/// Categories that mean "blocked".
const BLOCKING_CATEGORIES: [&str; 2] = ["违规", "疑似"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SafetyCheckRequest<'a> {
    access_key: &'a str,
    access_token: &'a str,
    app_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

/// HTTP checker for ZKRJ.
#[derive(Debug, Clone)]
pub struct ZkrjChecker {
    client: reqwest::Client,
}

impl ZkrjChecker {
    /// Checker using a shared client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Turn a ZKRJ response body into a verdict.
///
/// `code` must be `"200"`; the category field depends on the phase.
pub fn interpret(body: &Value, phase: CheckPhase) -> Result<Verdict> {
    let code_ok = match body.get("code") {
        Some(Value::String(code)) => code == "200",
        Some(Value::Number(code)) => code.as_u64() == Some(200),
        _ => return Err(malformed("missing code")),
    };
    if !code_ok {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or_default();
        return Err(malformed(&format!("unexpected code {}: {msg}", body["code"])));
    }

    let data = body.get("data").ok_or_else(|| malformed("missing data"))?;
    let field = match phase {
        CheckPhase::Prompt => "promptCategory",
        CheckPhase::Content => "contentCategory",
    };
    let category = data.get(field).and_then(Value::as_str).unwrap_or_default();

    if BLOCKING_CATEGORIES.contains(&category) {
        Ok(Verdict::block(category, VENDOR))
    } else {
        Ok(Verdict::Pass)
    }
}

fn malformed(message: &str) -> GuardError {
    GuardError::MalformedVendorResponse {
        vendor: VENDOR.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl VendorChecker for ZkrjChecker {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn check_text(&self, req: &CheckRequest<'_>) -> Result<Verdict> {
        let handle = req.handle;
        let (prompt, content) = match req.phase {
            CheckPhase::Prompt => (Some(req.text), None),
            CheckPhase::Content => (None, Some(req.text)),
        };
        let payload = SafetyCheckRequest {
            access_key: &handle.access_key,
            access_token: &handle.access_token,
            app_id: &handle.app_id,
            prompt,
            content,
        };

        tracing::debug!(url = %handle.url, phase = ?req.phase, chars = req.text.chars().count(), "Calling ZKRJ");
        let body: Value = self
            .client
            .post(&handle.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        interpret(&body, req.phase)
    }
}
