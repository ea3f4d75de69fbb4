/// Error type shared by every transcoding stage.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code and error-type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 404 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl TranscodeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranscodeError::InvalidRequest(_) | TranscodeError::SchemaConflict(_) => {
                ErrorCategory::InvalidRequest
            }
            TranscodeError::Auth(_) => ErrorCategory::Authentication,
            TranscodeError::Config(_)
            | TranscodeError::Transport(_)
            | TranscodeError::Translation(_)
            | TranscodeError::Internal(_) => ErrorCategory::ServerError,
            TranscodeError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Render the error as an OpenAI-style error object.
    #[must_use]
    pub fn to_openai_payload(&self) -> serde_json::Value {
        let cat = self.category();
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": openai_error_type(cat),
                "code": openai_error_code(cat),
                "param": null,
            }
        })
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Permission => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::Permission => "permission_denied",
        ErrorCategory::RateLimit => "rate_limit_exceeded",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

impl From<serde_json::Error> for TranscodeError {
    fn from(err: serde_json::Error) -> Self {
        TranscodeError::Translation(err.to_string())
    }
}
