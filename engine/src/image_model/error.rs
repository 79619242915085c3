use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors returned by an image generation provider
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Rate limit exceeded ({status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Provider unavailable ({status}): {message}")]
    Transient { status: u16, message: String },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected by content policy: {message}")]
    ContentPolicy { message: String },

    #[error("Invalid credentials ({status}): {message}")]
    InvalidCredentials { status: u16, message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Invalid request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No image returned: {0}")]
    NoImage(String),
}

const CONTENT_POLICY_CODES: &[&str] = &[
    "moderation_blocked",
    "content_policy_violation",
    "content_filter",
    "safety",
];

impl GenerationError {
    /// Transient errors are worth another attempt, everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    pub fn from_status(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = code.map(str::to_ascii_lowercase);

        match (status, code.as_deref()) {
            (_, Some(code)) if CONTENT_POLICY_CODES.contains(&code) => {
                Self::ContentPolicy { message }
            }
            (_, Some("insufficient_quota")) => Self::QuotaExceeded { message },
            (_, Some("invalid_api_key")) | (401 | 403, _) => {
                Self::InvalidCredentials { status, message }
            }
            (400, _) if message.contains("API key not valid") => {
                Self::InvalidCredentials { status, message }
            }
            (429, _) => Self::RateLimited { status, message },
            (408 | 500..=599, _) => Self::Transient { status, message },
            _ => Self::InvalidRequest { status, message },
        }
    }

    /// Classifies a non-success response from either provider. Both wrap their errors in an
    /// `{"error": {...}}` envelope.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope { error }) => {
                let code = error
                    .code
                    .as_ref()
                    .and_then(|c| c.as_str())
                    .or(error.status.as_deref())
                    .or(error.error_type.as_deref());
                let message = if error.message.is_empty() {
                    body.to_string()
                } else {
                    error.message.clone()
                };
                Self::from_status(status, code, message)
            }
            Err(_) => Self::from_status(status, None, body),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_moderation() {
        let body = r#"{"error":{"message":"Your request was rejected by the safety system.","type":"image_generation_user_error","param":null,"code":"moderation_blocked"}}"#;
        let err = GenerationError::from_response_body(400, body);
        assert!(matches!(err, GenerationError::ContentPolicy { ref message } if message.starts_with("Your request")));
        assert!(!err.is_transient());
    }

    #[test]
    fn openai_quota_is_permanent() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        let err = GenerationError::from_response_body(429, body);
        assert!(matches!(err, GenerationError::QuotaExceeded { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn gemini_rate_limit() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = GenerationError::from_response_body(429, body);
        assert!(matches!(err, GenerationError::RateLimited { status: 429, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn gemini_bad_key() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let err = GenerationError::from_response_body(400, body);
        assert!(matches!(err, GenerationError::InvalidCredentials { status: 400, .. }));
    }

    #[test]
    fn unauthorized_and_server_errors() {
        assert!(matches!(
            GenerationError::from_status(401, None, "nope"),
            GenerationError::InvalidCredentials { .. }
        ));
        assert!(GenerationError::from_status(503, None, "overloaded").is_transient());
        assert!(GenerationError::from_status(529, None, "overloaded").is_transient());
        assert!(!GenerationError::from_status(404, None, "missing").is_transient());
    }

    #[test]
    fn non_json_bodies_keep_the_raw_text() {
        let err = GenerationError::from_response_body(502, "<html>Bad Gateway</html>");
        assert!(matches!(err, GenerationError::Transient { ref message, .. } if message == "<html>Bad Gateway</html>"));
    }
}
