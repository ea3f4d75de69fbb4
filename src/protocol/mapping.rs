use super::canonical::CanonicalRole;

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn canonical_role_to_anthropic(role: CanonicalRole) -> &'static str {
    match role {
        // system is lifted to the top-level field; tool results ride in user turns
        CanonicalRole::System | CanonicalRole::User | CanonicalRole::Tool => "user",
        CanonicalRole::Assistant => "assistant",
    }
}

#[must_use]
pub fn canonical_role_to_cloudcode(role: CanonicalRole) -> &'static str {
    match role {
        CanonicalRole::System | CanonicalRole::User | CanonicalRole::Tool => "user",
        CanonicalRole::Assistant => "model",
    }
}

#[must_use]
pub fn canonical_role_to_responses(role: CanonicalRole) -> &'static str {
    match role {
        CanonicalRole::System => "developer",
        CanonicalRole::User | CanonicalRole::Tool => "user",
        CanonicalRole::Assistant => "assistant",
    }
}

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

/// Map an upstream stop reason onto the canonical `finish_reason`.
///
/// `end_turn`/`stop_sequence` → `stop`, `max_tokens` → `length`,
/// `tool_use` → `tool_calls`; any other value passes through unchanged.
#[must_use]
pub fn map_finish_reason(reason: Option<&str>) -> Option<String> {
    reason.map(|reason| {
        match reason {
            "end_turn" | "stop_sequence" => "stop",
            "max_tokens" => "length",
            "tool_use" => "tool_calls",
            other => other,
        }
        .to_string()
    })
}

/// Normalize a Cloud Code `finishReason` onto the Anthropic-style stop vocabulary
/// consumed by [`map_finish_reason`].
#[must_use]
pub fn cloudcode_finish_to_stop_reason(reason: &str, has_tool_calls: bool) -> String {
    match reason {
        "STOP" | "FINISH_REASON_UNSPECIFIED" if has_tool_calls => "tool_use".to_string(),
        "STOP" | "FINISH_REASON_UNSPECIFIED" => "end_turn".to_string(),
        "MAX_TOKENS" => "max_tokens".to_string(),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => "content_filter".to_string(),
        "MALFORMED_FUNCTION_CALL" => "tool_use".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// Normalize a Responses API terminal status onto the stop vocabulary.
///
/// `incomplete_reason` is `incomplete_details.reason` when present.
#[must_use]
pub fn responses_status_to_stop_reason(
    status: Option<&str>,
    incomplete_reason: Option<&str>,
    has_tool_calls: bool,
) -> String {
    match (status, incomplete_reason) {
        (Some("incomplete"), Some("max_output_tokens")) => "max_tokens".to_string(),
        (Some("incomplete"), Some("content_filter")) => "content_filter".to_string(),
        (Some("failed"), _) => "error".to_string(),
        _ if has_tool_calls => "tool_use".to_string(),
        _ => "end_turn".to_string(),
    }
}
