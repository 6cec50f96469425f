//! Chat completions to an OpenAI-compatible backend
//!
//! The request body is forwarded as-is except for an optional model
//! override, so fields the gateway does not model survive untouched.
//! Responses are never mutated; they are only scanned for usage.

use super::backend_error::{self, is_json_content_type};
use super::mutation::{CONTENT_TYPE_HEADER, STATUS_HEADER};
use super::reassembler::{BodyReassembler, SseReassembler};
use super::{
    header, path_mutation, read_body, CanonicalRequest, Endpoint, HeaderMutation, Headers, LLMTokenUsage,
    PhaseMutations, ResponseBodyOutput, TargetPath, Translator,
};
use crate::models::openai::{ChatCompletionResponse, Usage};
use crate::utils::error::{helpers, AppResult, ErrorContext};
use crate::utils::json_patch::set_top_level_field;
use crate::utils::logging::body_preview;
use serde_json::{Map, Value};
use std::io::Read;
use tracing::debug;

/// OpenAI chat completions translator (also used for Azure OpenAI)
#[derive(Debug)]
pub struct OpenAIToOpenAIChatCompletion {
    model_name_override: Option<String>,
    path: TargetPath,
    stream: bool,
    sse: SseReassembler,
    body: BodyReassembler,
    buffering_done: bool,
}

impl OpenAIToOpenAIChatCompletion {
    pub fn new(path: TargetPath, model_name_override: Option<String>) -> Self {
        Self {
            model_name_override,
            path,
            stream: false,
            sse: SseReassembler::new(),
            body: BodyReassembler::new(),
            buffering_done: false,
        }
    }

    fn reset_response_state(&mut self) {
        self.sse.clear();
        self.body.clear();
        self.buffering_done = false;
    }

    /// Scan complete `data:` lines for the first chunk carrying usage
    fn extract_usage_from_buffer(&mut self) -> LLMTokenUsage {
        while let Some(payload) = self.sse.next_data_line() {
            // only objects count; arrays would otherwise satisfy a derived struct
            let mut chunk = match serde_json::from_slice::<Map<String, Value>>(&payload) {
                Ok(chunk) => chunk,
                Err(_) => {
                    debug!("skipping non-object stream line: {}", body_preview(&payload, 64));
                    continue;
                }
            };
            let usage = match chunk.remove("usage") {
                Some(usage @ Value::Object(_)) => usage,
                _ => continue,
            };
            match serde_json::from_value::<Usage>(usage) {
                Ok(usage) => {
                    self.buffering_done = true;
                    self.sse.clear();
                    return LLMTokenUsage::from(&usage);
                }
                Err(e) => debug!("skipping malformed usage object: {}", e),
            }
        }
        LLMTokenUsage::default()
    }
}

/// Shared request phase of the same-protocol translators
pub(crate) fn passthrough_request(
    original: &[u8],
    model: &str,
    endpoint: Endpoint,
    path: &TargetPath,
    model_name_override: Option<&str>,
    on_retry: bool,
) -> AppResult<PhaseMutations> {
    let target_model = model_name_override.unwrap_or(model);
    let headers = path_mutation(path.resolve(endpoint, target_model));

    if let Some(model_override) = model_name_override {
        let patched = set_top_level_field(original, "model", model_override)?;
        debug!(model = %model_override, "overriding request model");
        return Ok(PhaseMutations::with_body(Some(headers), patched));
    }

    if on_retry {
        // the proxy has already consumed the body once
        return Ok(PhaseMutations::with_body(Some(headers), original.to_vec()));
    }

    Ok(PhaseMutations {
        header_mutation: Some(headers),
        body_mutation: None,
    })
}

/// Shared error phase of the same-protocol translators. JSON errors (or
/// errors without a content-type) are already in the canonical shape.
pub(crate) fn passthrough_error(headers: &Headers, body: &mut dyn Read) -> AppResult<PhaseMutations> {
    let content_type = header(headers, CONTENT_TYPE_HEADER);
    if content_type.map_or(true, is_json_content_type) {
        return Ok(PhaseMutations::none());
    }

    let status = header(headers, STATUS_HEADER).unwrap_or_default();
    let raw = read_body(body)?;
    let envelope = backend_error::openai_backend_error(status, &raw);
    debug!(status = %status, "wrapping non-JSON backend error");
    Ok(PhaseMutations::with_body(None, backend_error::encode(&envelope)?))
}

impl Translator for OpenAIToOpenAIChatCompletion {
    fn request_body(
        &mut self,
        original: &[u8],
        request: &CanonicalRequest,
        on_retry: bool,
    ) -> AppResult<PhaseMutations> {
        let CanonicalRequest::ChatCompletion(chat) = request else {
            return Err(helpers::unsupported_conversion(format!(
                "chat completion translator cannot handle {} requests",
                request.endpoint()
            )));
        };

        self.stream = chat.is_streaming();
        if on_retry {
            self.reset_response_state();
        }

        passthrough_request(
            original,
            &chat.model,
            Endpoint::ChatCompletions,
            &self.path,
            self.model_name_override.as_deref(),
            on_retry,
        )
    }

    fn response_headers(&mut self, _headers: &Headers) -> AppResult<Option<HeaderMutation>> {
        Ok(None)
    }

    fn response_body(
        &mut self,
        _headers: &Headers,
        body: &mut dyn Read,
        end_of_stream: bool,
    ) -> AppResult<ResponseBodyOutput> {
        let fragment = read_body(body)?;

        if self.stream {
            if self.buffering_done {
                return Ok(ResponseBodyOutput::default());
            }
            self.sse.push(&fragment);
            return Ok(ResponseBodyOutput::usage_only(self.extract_usage_from_buffer()));
        }

        self.body.push(&fragment);
        if !end_of_stream {
            return Ok(ResponseBodyOutput::default());
        }

        let document = self.body.take();
        let response: ChatCompletionResponse =
            serde_json::from_slice(&document).invalid_response_context("failed to parse chat completion response")?;
        let usage = response.usage.as_ref().map(LLMTokenUsage::from).unwrap_or_default();
        Ok(ResponseBodyOutput::usage_only(usage))
    }

    fn response_error(&mut self, headers: &Headers, body: &mut dyn Read) -> AppResult<PhaseMutations> {
        passthrough_error(headers, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::mutation::{CONTENT_LENGTH_HEADER, PATH_HEADER};

    const STREAM_BODY: &str = "data: {\"id\":\"1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"id\":\"1\",\"object\":\"chat.completion.chunk\",\"choices\":[],\"usage\":{\"prompt_tokens\":13,\"completion_tokens\":12,\"total_tokens\":25}}\n\n\
data: [DONE]\n\n";

    fn translator(model_override: Option<&str>) -> OpenAIToOpenAIChatCompletion {
        OpenAIToOpenAIChatCompletion::new(
            TargetPath::Versioned { version: "v1".to_string() },
            model_override.map(str::to_string),
        )
    }

    fn request(body: &str) -> CanonicalRequest {
        CanonicalRequest::parse(Endpoint::ChatCompletions, body.as_bytes()).unwrap()
    }

    #[test]
    fn test_request_without_override_only_sets_path() {
        let body = r#"{"model":"gpt-4o","messages":[]}"#;
        let mut t = translator(None);
        let mutations = t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let headers = mutations.header_mutation.unwrap();
        assert_eq!(headers.get(PATH_HEADER), Some(&b"/v1/chat/completions"[..]));
        assert_eq!(headers.get(CONTENT_LENGTH_HEADER), None);
        assert!(mutations.body_mutation.is_none());
    }

    #[test]
    fn test_retry_resends_original_bytes() {
        let body = r#"{"model":"gpt-4o", "messages":[], "x-extra":true}"#;
        let mut t = translator(None);
        let mutations = t.request_body(body.as_bytes(), &request(body), true).unwrap();

        assert_eq!(mutations.body_mutation.unwrap().body, body.as_bytes());
        let headers = mutations.header_mutation.unwrap();
        assert_eq!(headers.get(CONTENT_LENGTH_HEADER), Some(body.len().to_string().as_bytes()));
    }

    #[test]
    fn test_override_patches_model_only() {
        let body = r#"{"model":"gpt-4o", "messages":[], "x-extra":true}"#;
        let mut t = translator(Some("gpt-4o-mini"));
        let mutations = t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let patched = mutations.body_mutation.unwrap().body;
        assert_eq!(patched, br#"{"model":"gpt-4o-mini", "messages":[], "x-extra":true}"#.to_vec());
        let headers = mutations.header_mutation.unwrap();
        assert_eq!(headers.get(CONTENT_LENGTH_HEADER), Some(patched.len().to_string().as_bytes()));
    }

    #[test]
    fn test_stream_usage_one_byte_at_a_time() {
        let body = r#"{"model":"gpt-4o","messages":[],"stream":true}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let mut total = LLMTokenUsage::default();
        let bytes = STREAM_BODY.as_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            let out = t
                .response_body(&Headers::new(), &mut std::slice::from_ref(byte), i == bytes.len() - 1)
                .unwrap();
            assert!(out.body_mutation.is_none());
            total += out.token_usage;
        }

        assert_eq!(total, LLMTokenUsage::new(13, 12, 25));
        assert!(t.sse.is_empty());
    }

    #[test]
    fn test_usage_is_reported_once() {
        let body = r#"{"model":"gpt-4o","messages":[],"stream":true}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let first = b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":13,\"completion_tokens\":12,\"total_tokens\":25}}\n";
        let out = t.response_body(&Headers::new(), &mut &first[..], false).unwrap();
        assert_eq!(out.token_usage, LLMTokenUsage::new(13, 12, 25));
        assert!(t.sse.is_empty());

        let second = b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":99,\"completion_tokens\":99,\"total_tokens\":198}}\n";
        let out = t.response_body(&Headers::new(), &mut &second[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        assert!(out.body_mutation.is_none());
        assert!(t.sse.is_empty());
    }

    #[test]
    fn test_array_payload_is_not_usage() {
        let body = r#"{"model":"gpt-4o","messages":[],"stream":true}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let array = b"data: [{\"prompt_tokens\":7,\"total_tokens\":7}]\n";
        let out = t.response_body(&Headers::new(), &mut &array[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        assert!(!t.buffering_done);

        let nested = b"data: {\"usage\":[1,2,3]}\n";
        let out = t.response_body(&Headers::new(), &mut &nested[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        assert!(!t.buffering_done);

        let usage = b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":5,\"total_tokens\":9}}\n";
        let out = t.response_body(&Headers::new(), &mut &usage[..], false).unwrap();
        assert_eq!(out.token_usage, LLMTokenUsage::new(4, 5, 9));
    }

    #[test]
    fn test_invalid_line_is_consumed() {
        let body = r#"{"model":"gpt-4o","messages":[],"stream":true}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let out = t.response_body(&Headers::new(), &mut &b"data: invalid\n"[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        assert!(!t.buffering_done);
        assert!(t.sse.is_empty());

        let out = t.response_body(&Headers::new(), &mut &b"data: {}\n\ndata: "[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        assert!(!t.sse.is_empty());
    }

    #[test]
    fn test_non_streaming_usage_waits_for_end_of_stream() {
        let body = r#"{"model":"gpt-4o","messages":[]}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        let response = br#"{"id":"c","object":"chat.completion","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#;
        let (head, tail) = response.split_at(20);

        let out = t.response_body(&Headers::new(), &mut &head[..], false).unwrap();
        assert!(out.token_usage.is_zero());
        let out = t.response_body(&Headers::new(), &mut &tail[..], true).unwrap();
        assert_eq!(out.token_usage, LLMTokenUsage::new(3, 4, 7));
    }

    #[test]
    fn test_invalid_response_is_an_error() {
        let body = r#"{"model":"gpt-4o","messages":[]}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();

        assert!(t.response_body(&Headers::new(), &mut &b"<html>"[..], true).is_err());
    }

    #[test]
    fn test_retry_resets_stream_state() {
        let body = r#"{"model":"gpt-4o","messages":[],"stream":true}"#;
        let mut t = translator(None);
        t.request_body(body.as_bytes(), &request(body), false).unwrap();
        t.response_body(&Headers::new(), &mut STREAM_BODY.as_bytes(), true).unwrap();
        assert!(t.buffering_done);

        t.request_body(body.as_bytes(), &request(body), true).unwrap();
        assert!(!t.buffering_done);
        let out = t.response_body(&Headers::new(), &mut STREAM_BODY.as_bytes(), true).unwrap();
        assert_eq!(out.token_usage.output_tokens, 12);
    }

    #[test]
    fn test_error_passthrough_and_wrapping() {
        let mut t = translator(None);
        let mut headers = Headers::new();
        headers.insert(":status".to_string(), "400".to_string());
        headers.insert("content-type".to_string(), "application/json; charset=utf-8".to_string());
        let out = t.response_error(&headers, &mut &b"{\"error\":{}}"[..]).unwrap();
        assert!(out.is_empty());

        headers.insert(":status".to_string(), "503".to_string());
        headers.insert("content-type".to_string(), "text/plain".to_string());
        let out = t.response_error(&headers, &mut &b"Service Unavailable"[..]).unwrap();
        assert_eq!(
            out.body_mutation.unwrap().body,
            br#"{"type":"error","error":{"type":"OpenAIBackendError","message":"Service Unavailable","code":"503"}}"#.to_vec()
        );
    }
}
