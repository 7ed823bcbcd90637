//! Text extraction from OpenAI-compatible payloads.

use serde_json::Value;

use super::Batch;

/// SSE `data:` field prefix.
pub const DATA_PREFIX: &str = "data:";

/// Stream termination marker.
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental text carried by one SSE line, if any.
///
/// Returns `None` for comments, non-`data` fields, `[DONE]`, chunks without
/// `choices[0].delta.content`, and malformed JSON (logged and skipped).
pub fn extract_delta(line: &str) -> Option<String> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_MARKER {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(chunk) => chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        Err(e) => {
            tracing::warn!(error = %e, line = payload, "Skipping malformed stream frame");
            None
        },
    }
}

/// Concatenated delta text of every frame in the batch.
pub fn extract_batch(batch: &Batch) -> String {
    batch
        .frames()
        .iter()
        .filter_map(|frame| extract_delta(&frame.text))
        .collect()
}

/// `choices[0].message.content` of a non-streaming completion.
pub fn extract_message_content(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// User-visible prompt text of a chat request.
///
/// Joins every `messages[].content` string (or text part) with newlines.
/// Bodies that are not chat requests are screened as-is.
pub fn extract_prompt(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return String::from_utf8_lossy(body).into_owned();
    };

    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        if let Some(prompt) = value.get("prompt").and_then(Value::as_str) {
            return prompt.to_string();
        }
        return String::from_utf8_lossy(body).into_owned();
    };

    let mut parts = Vec::new();
    for message in messages {
        match message.get("content") {
            Some(Value::String(text)) => parts.push(text.as_str()),
            Some(Value::Array(items)) => parts.extend(
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str)),
            ),
            _ => {},
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::stream::Frame;

    fn chunk(content: &str) -> String {
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]}).to_string()
    }

    #[test]
    fn test_extract_delta() {
        assert_eq!(extract_delta(&format!("data: {}", chunk("Hi"))), Some("Hi".into()));
        assert_eq!(extract_delta(&format!("  data:{}  ", chunk("x"))), Some("x".into()));
    }

    #[test]
    fn test_ignored_lines() {
        assert_eq!(extract_delta("data: [DONE]"), None);
        assert_eq!(extract_delta(": keepalive"), None);
        assert_eq!(extract_delta("event: message"), None);
        assert_eq!(extract_delta(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(extract_delta(r#"data: {"choices":[]}"#), None);
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        assert_eq!(extract_delta("data: {not json"), None);
    }

    #[test]
    fn test_extract_batch_concatenates() {
        let frames = ["Hel", "lo", "!"]
            .iter()
            .map(|c| {
                let text = format!("data: {}", chunk(c));
                Frame {
                    raw: Bytes::from(format!("{text}\n\n")),
                    text,
                }
            })
            .chain(std::iter::once(Frame {
                text: "data: [DONE]".into(),
                raw: Bytes::from_static(b"data: [DONE]\n\n"),
            }))
            .collect();
        assert_eq!(extract_batch(&Batch::new(frames)), "Hello!");
    }

    #[test]
    fn test_extract_message_content() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"done"}}]}"#;
        assert_eq!(extract_message_content(body), Some("done".into()));
        assert_eq!(extract_message_content(b"oops"), None);
    }

    #[test]
    fn test_extract_prompt() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": [{"type": "text", "text": "hello"}]}
            ]
        })
        .to_string();
        assert_eq!(extract_prompt(body.as_bytes()), "be nice\nhello");
        assert_eq!(extract_prompt(br#"{"prompt":"complete me"}"#), "complete me");
        assert_eq!(extract_prompt(b"plain text"), "plain text");
    }
}
