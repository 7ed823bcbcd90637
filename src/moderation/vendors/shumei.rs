//! Shumei text risk API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{GuardError, Result};
use crate::moderation::{CheckRequest, Verdict, VendorChecker};

const VENDOR: &str = "shumei";
const CODE_SUCCESS: u64 = 1100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextCheckRequest<'a> {
    access_key: &'a str,
    app_id: &'a str,
    event_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    data: TextCheckData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextCheckData<'a> {
    text: &'a str,
    token_id: &'a str,
}

/// HTTP checker for Shumei.
#[derive(Debug, Clone)]
pub struct ShumeiChecker {
    client: reqwest::Client,
}

impl ShumeiChecker {
    /// Checker using a shared client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// `code == 1100` is success; `riskLevel == "PASS"` passes, any other
/// level blocks.
pub fn interpret(body: &Value) -> Result<Verdict> {
    let code = body
        .get("code")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing code"))?;
    if code != CODE_SUCCESS {
        let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(malformed(&format!("unexpected code {code}: {message}")));
    }

    let level = body
        .get("riskLevel")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing riskLevel"))?;
    if level == "PASS" {
        return Ok(Verdict::Pass);
    }

    let reason = body
        .get("riskDescription")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .unwrap_or(level);
    Ok(Verdict::block(reason, VENDOR))
}

fn malformed(message: &str) -> GuardError {
    GuardError::MalformedVendorResponse {
        vendor: VENDOR.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl VendorChecker for ShumeiChecker {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn check_text(&self, req: &CheckRequest<'_>) -> Result<Verdict> {
        let handle = req.handle;
        let payload = TextCheckRequest {
            access_key: &handle.access_key,
            app_id: &handle.app_id,
            event_id: &handle.event_id,
            kind: &handle.kind,
            data: TextCheckData {
                text: req.text,
                token_id: &handle.app_id,
            },
        };

        tracing::debug!(url = %handle.url, phase = ?req.phase, "Calling Shumei");
        let body: Value = self
            .client
            .post(&handle.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        interpret(&body)
    }
}
