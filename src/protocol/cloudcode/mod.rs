//! Google Cloud Code (`v1internal`) upstream.
//!
//! Requests wrap a Gemini `generateContent` body in `{model, project, request}`;
//! responses (and every stream chunk) come back as `{response: {...}}`.

pub mod encoder;
pub mod response_decoder;
pub mod stream;

use serde::Deserialize;

/// Canonical path of the Cloud Code internal API.
pub const CLOUDCODE_PATH: &str = "/v1internal";

/// One `generateContent` response (or stream chunk) after unwrapping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeResponse {
    #[serde(default)]
    pub candidates: Vec<CloudCodeCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<CloudCodeUsage>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeCandidate {
    #[serde(default)]
    pub content: Option<CloudCodeContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudCodeContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<CloudCodePart>,
}

/// A Gemini part; exactly one payload field is normally set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: Option<bool>,
    #[serde(default)]
    pub thought_signature: Option<String>,
    #[serde(default)]
    pub function_call: Option<CloudCodeFunctionCall>,
}

impl CloudCodePart {
    #[must_use]
    pub fn is_thought(&self) -> bool {
        self.thought == Some(true)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudCodeFunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeUsage {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub candidates_token_count: Option<u64>,
    #[serde(default)]
    pub thoughts_token_count: Option<u64>,
}

impl CloudCodeUsage {
    /// Visible plus thinking tokens.
    #[must_use]
    pub fn completion_tokens(&self) -> u64 {
        self.candidates_token_count
            .unwrap_or(0)
            .saturating_add(self.thoughts_token_count.unwrap_or(0))
    }
}

/// Parse a body that may or may not carry the `{response: ...}` envelope.
///
/// # Errors
///
/// Returns the JSON error for malformed input.
pub fn parse_cloudcode_response(data: &[u8]) -> Result<CloudCodeResponse, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_slice(data)?;
    let inner = match value.get_mut("response") {
        Some(inner) if inner.is_object() => inner.take(),
        _ => value,
    };
    serde_json::from_value(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_optional() {
        let wrapped = br#"{"response":{"candidates":[{"content":{"parts":[{"text":"a"}]}}],"modelVersion":"gemini-2.5-pro"}}"#;
        let bare = br#"{"candidates":[{"content":{"parts":[{"text":"a"}]}}],"modelVersion":"gemini-2.5-pro"}"#;
        for body in [&wrapped[..], &bare[..]] {
            let parsed = parse_cloudcode_response(body).unwrap();
            assert_eq!(parsed.model_version.as_deref(), Some("gemini-2.5-pro"));
            assert_eq!(
                parsed.candidates[0].content.as_ref().unwrap().parts[0].text.as_deref(),
                Some("a")
            );
        }
    }

    #[test]
    fn test_completion_tokens_include_thoughts() {
        let usage = CloudCodeUsage {
            prompt_token_count: Some(3),
            candidates_token_count: Some(5),
            thoughts_token_count: Some(7),
        };
        assert_eq!(usage.completion_tokens(), 12);
    }

    #[test]
    fn test_completion_tokens_saturate() {
        let usage = CloudCodeUsage {
            prompt_token_count: None,
            candidates_token_count: Some(u64::MAX),
            thoughts_token_count: Some(1),
        };
        assert_eq!(usage.completion_tokens(), u64::MAX);
    }
}
