use thiserror::Error;

/// Errors raised while running a chat turn against the completion API
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    /// The request never produced a response (connect failure, DNS, TLS, ...)
    #[error("network error: {message}")]
    Network { message: String },

    /// The API answered with a non-success status
    #[error("API request failed: {status} {message}")]
    Status { status: u16, message: String },

    /// The response body broke off while streaming
    #[error("stream read error: {message}")]
    StreamRead { message: String },

    /// The outgoing request could not be built
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ChatError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_stream_read(&self) -> bool {
        matches!(self, Self::StreamRead { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Pulls a human readable message out of an OpenAI-style error body.
///
/// Accepts `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": "..."}`; anything else falls back to the status text.
pub fn extract_api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|json| match json.get("error") {
        Some(serde_json::Value::Object(obj)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
        Some(serde_json::Value::String(message)) => Some(message.clone()),
        _ => json
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
    });

    message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string()
    })
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn nested_error_object_message_is_used() {
        let body = r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#;
        assert_eq!(
            extract_api_error_message(StatusCode::UNAUTHORIZED, body),
            "Authentication Fails"
        );
    }

    #[test]
    fn plain_string_error_is_used() {
        let body = r#"{"error":"model not found"}"#;
        assert_eq!(
            extract_api_error_message(StatusCode::NOT_FOUND, body),
            "model not found"
        );
    }

    #[test]
    fn non_json_body_falls_back_to_reason_phrase() {
        assert_eq!(
            extract_api_error_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "Bad Gateway"
        );
    }

    #[test]
    fn display_includes_status_and_message() {
        let err = ChatError::status(429, "Too Many Requests");
        assert_eq!(err.to_string(), "API request failed: 429 Too Many Requests");
        assert_eq!(err.status_code(), Some(429));
        assert!(!err.is_unauthorized());
    }
}
