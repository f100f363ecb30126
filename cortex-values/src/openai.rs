//! OpenAI-compatible request/response DTOs (spec.md §4.6, §6).
//!
//! Shapes follow the upstream OpenAI schema closely enough for existing
//! clients to work unmodified; CORTEX only adds the `X-Cortex-Warnings`
//! header out of band; it never changes the JSON body shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_of: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    /// Anything else the caller sent that this struct doesn't model
    /// explicitly is preserved here and forwarded verbatim — the gateway
    /// proxies bytes, it does not re-encode a narrowed request.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Parameters the V1 engine path dropped (spec.md §4.6 step 3). Detecting
/// their presence is a pure function over the parsed request so the
/// warning text can be unit-tested without a running backend.
pub fn v1_removed_parameter_warnings(req: &ChatCompletionRequest) -> Vec<String> {
    let mut warnings = Vec::new();
    if req.best_of.is_some() {
        warnings.push("`best_of` is not supported on the V1 engine path and was ignored".into());
    }
    if let Some(bias) = &req.logit_bias {
        if !bias.is_empty() {
            warnings.push(
                "`logit_bias` has reduced support on the V1 engine path and may be ignored".into(),
            );
        }
    }
    warnings
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: Value,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Fallback estimate when the upstream response omits a `usage` object
    /// (spec.md §4.6 step 6): roughly 4 characters per token.
    pub fn estimate(prompt_chars: usize, completion_chars: usize) -> Self {
        let prompt_tokens = (prompt_chars as u64).div_ceil(4).max(if prompt_chars > 0 { 1 } else { 0 });
        let completion_tokens =
            (completion_chars as u64).div_ceil(4).max(if completion_chars > 0 { 1 } else { 0 });
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub served_name: String,
    pub engine_kind: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConstraints {
    pub served_name: String,
    pub context_length: Option<u32>,
    pub supports_streaming: bool,
    pub default_max_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(best_of: Option<u32>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "m1".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: Value::String("hi".into()),
                name: None,
            }],
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            best_of,
            logit_bias: None,
            stop: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn flags_best_of_as_a_v1_removed_parameter() {
        let warnings = v1_removed_parameter_warnings(&sample_request(Some(3)));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn no_warnings_for_a_plain_request() {
        assert!(v1_removed_parameter_warnings(&sample_request(None)).is_empty());
    }

    #[test]
    fn token_estimate_uses_four_chars_per_token() {
        let usage = TokenUsage::estimate(40, 20);
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn unmodeled_fields_round_trip_through_extra() {
        let raw = serde_json::json!({
            "model": "m1",
            "messages": [{"role": "user", "content": "hi"}],
            "seed": 42
        });
        let req: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.extra.get("seed").and_then(Value::as_i64), Some(42));
    }
}
