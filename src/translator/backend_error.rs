//! Backend error normalization into the canonical error envelope

use crate::models::anthropic;
use crate::models::openai::{ErrorDetail, ErrorResponse};
use crate::utils::error::AppResult;

/// Error type used when an OpenAI-compatible backend returns a non-JSON error
pub const OPENAI_BACKEND_ERROR: &str = "OpenAIBackendError";
/// Error type used when an Anthropic backend returns an unrecognized error
pub const ANTHROPIC_BACKEND_ERROR: &str = "AnthropicBackendError";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Whether a content-type denotes JSON. Media type parameters are ignored.
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

/// Build a synthesized envelope
pub fn envelope(error_type: &str, message: impl Into<String>, status: &str) -> ErrorResponse {
    ErrorResponse {
        response_type: Some("error".to_string()),
        error: ErrorDetail {
            error_type: error_type.to_string(),
            message: message.into(),
            param: None,
            code: Some(status.to_string()),
        },
    }
}

/// Wrap a raw (non-JSON) error body from an OpenAI-compatible backend
pub fn openai_backend_error(status: &str, body: &[u8]) -> ErrorResponse {
    envelope(OPENAI_BACKEND_ERROR, String::from_utf8_lossy(body), status)
}

/// Map an Anthropic error body. JSON Anthropic errors keep their own error
/// type; anything else is wrapped verbatim.
pub fn anthropic_backend_error(status: &str, content_type: Option<&str>, body: &[u8]) -> ErrorResponse {
    if content_type.is_some_and(is_json_content_type) {
        if let Ok(parsed) = serde_json::from_slice::<anthropic::ErrorResponse>(body) {
            return envelope(&parsed.error.error_type, parsed.error.message, status);
        }
    }
    envelope(ANTHROPIC_BACKEND_ERROR, String::from_utf8_lossy(body), status)
}

/// Serialize an envelope for a body mutation
pub fn encode(envelope: &ErrorResponse) -> AppResult<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/jsonl"));
    }

    #[test]
    fn test_openai_backend_error_envelope() {
        let envelope = openai_backend_error("503", b"Service Unavailable");
        assert_eq!(
            String::from_utf8(encode(&envelope).unwrap()).unwrap(),
            r#"{"type":"error","error":{"type":"OpenAIBackendError","message":"Service Unavailable","code":"503"}}"#
        );
    }

    #[test]
    fn test_anthropic_error_keeps_type() {
        let body = br#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let envelope = anthropic_backend_error("529", Some("application/json"), body);

        assert_eq!(envelope.error.error_type, "overloaded_error");
        assert_eq!(envelope.error.message, "Overloaded");
        assert_eq!(envelope.error.code.as_deref(), Some("529"));
    }

    #[test]
    fn test_anthropic_unrecognized_error_is_wrapped() {
        let envelope = anthropic_backend_error("502", Some("text/html"), b"<html>bad gateway</html>");
        assert_eq!(envelope.error.error_type, ANTHROPIC_BACKEND_ERROR);
        assert_eq!(envelope.error.message, "<html>bad gateway</html>");

        let envelope = anthropic_backend_error("500", Some("application/json"), b"{\"oops\":true}");
        assert_eq!(envelope.error.error_type, ANTHROPIC_BACKEND_ERROR);
        assert_eq!(envelope.error.message, "{\"oops\":true}");
    }
}
