//! Check outcomes and client-facing block envelopes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Prompt rejected by the moderation vendor.
pub const CODE_PROMPT_VIOLATION: i32 = 1400;
/// Response rejected by the moderation vendor.
pub const CODE_RESPONSE_VIOLATION: i32 = 1401;
/// Prompt contains a configured sensitive word.
pub const CODE_SENSITIVE_WORD: i32 = 1402;
/// Moderation vendor unavailable under a fail-closed policy.
pub const CODE_CHECKER_UNAVAILABLE: i32 = 1503;

/// Outcome of one moderation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Content is acceptable.
    Pass,
    /// Content violates policy.
    Block {
        /// Vendor-supplied category or description.
        reason: String,
        /// Vendor that made the call.
        vendor: String,
    },
    /// No decision could be made.
    Error {
        /// Human-readable cause.
        message: String,
        /// Machine-readable cause (`circuit_open`, `timeout`, ...).
        code: String,
    },
}

impl Verdict {
    /// Shorthand for a block verdict.
    pub fn block(reason: impl Into<String>, vendor: impl Into<String>) -> Self {
        Verdict::Block {
            reason: reason.into(),
            vendor: vendor.into(),
        }
    }

    /// True for [`Verdict::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// JSON body sent to the client when traffic is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnvelope {
    /// 14xx for policy blocks, 15xx for checker failures.
    pub code: i32,
    /// Short summary.
    pub msg: String,
    /// Category, matched words or failure cause.
    pub detail: String,
}

impl BlockEnvelope {
    /// Prompt blocked by the vendor.
    pub fn prompt_violation(reason: &str) -> Self {
        Self {
            code: CODE_PROMPT_VIOLATION,
            msg: "内容不符合规范".to_string(),
            detail: format!("检测结果：{reason}"),
        }
    }

    /// Streamed or buffered response blocked by the vendor.
    pub fn response_violation(reason: &str) -> Self {
        Self {
            code: CODE_RESPONSE_VIOLATION,
            msg: "返回内容违规".to_string(),
            detail: format!("检测结果：{reason}"),
        }
    }

    /// Prompt hit the local sensitive-word list.
    pub fn sensitive_words(hits: &[String]) -> Self {
        Self {
            code: CODE_SENSITIVE_WORD,
            msg: "请求包含敏感词".to_string(),
            detail: format!("[{}]", hits.join(", ")),
        }
    }

    /// Checker failed and the rule is fail-closed.
    pub fn unavailable(cause: &str) -> Self {
        Self {
            code: CODE_CHECKER_UNAVAILABLE,
            msg: "内容安全检测服务不可用".to_string(),
            detail: cause.to_string(),
        }
    }

    /// Serialized JSON body.
    pub fn to_bytes(&self) -> Bytes {
        // Three string/int fields cannot fail to serialize.
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = BlockEnvelope::response_violation("违规");
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_bytes()).unwrap();
        assert_eq!(value["code"], 1401);
        assert_eq!(value["msg"], "返回内容违规");
        assert_eq!(value["detail"], "检测结果：违规");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_codes_separate_blocks_from_outages() {
        assert_eq!(BlockEnvelope::prompt_violation("疑似").code, 1400);
        assert_eq!(BlockEnvelope::sensitive_words(&["bad".into()]).code, 1402);
        assert_eq!(BlockEnvelope::unavailable("circuit_open").code, 1503);
    }

    #[test]
    fn test_sensitive_word_detail_lists_hits() {
        let hits = vec!["worse".to_string(), "worse".to_string()];
        assert_eq!(BlockEnvelope::sensitive_words(&hits).detail, "[worse, worse]");
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::block("违规", "zkrj")).unwrap();
        assert_eq!(json["verdict"], "block");
        assert_eq!(json["vendor"], "zkrj");
        assert!(Verdict::Pass.is_pass());
    }
}
