//! Chat completions to an Anthropic Messages backend
//!
//! Unlike the same-protocol translators this one re-encodes everything: the
//! request is converted to a Messages request, buffered responses to a chat
//! completion, and each SSE frame of a streamed response to
//! `chat.completion.chunk` events.

use super::backend_error;
use super::mutation::{CONTENT_LENGTH_HEADER, CONTENT_TYPE_HEADER, STATUS_HEADER};
use super::reassembler::{BodyReassembler, SseEvent, SseReassembler};
use super::{
    header, path_mutation, read_body, CanonicalRequest, Endpoint, HeaderMutation, Headers,
    LLMTokenUsage, PhaseMutations, ResponseBodyOutput, TargetPath, Translator,
};
use crate::models::anthropic::{self, ContentBlock, ContentDelta, MessagesRequest, MessagesResponse, StreamEvent};
use crate::models::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, ChunkChoice, ContentPart,
    Delta, ErrorDetail, ErrorResponse, FunctionCall, MessageContent, ToolCall, Usage,
};
use crate::utils::error::{helpers, AppResult, ErrorContext};
use crate::utils::logging::create_anthropic_request_log_summary;
use chrono::Utc;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// Messages API path
pub const MESSAGES_PATH: &str = "/v1/messages";
/// Header carrying the Messages API version
pub const ANTHROPIC_VERSION_HEADER: &str = "anthropic-version";
/// Used when the client does not bound the completion; the Messages API requires it
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const RATE_LIMIT_KINDS: [&str; 2] = ["requests", "tokens"];
const RATE_LIMIT_FIELDS: [&str; 3] = ["limit", "remaining", "reset"];

/// Progress of one streamed response
#[derive(Debug, Default)]
struct StreamState {
    id: String,
    model: String,
    created: i64,
    input_tokens: u32,
    /// Anthropic content block index to OpenAI tool call index
    tool_indices: HashMap<u32, u32>,
}

/// Anthropic Messages translator
#[derive(Debug)]
pub struct OpenAIToAnthropicChatCompletion {
    model_name_override: Option<String>,
    api_version: String,
    path: TargetPath,
    stream: bool,
    include_usage: bool,
    sse: SseReassembler,
    body: BodyReassembler,
    state: StreamState,
}

impl OpenAIToAnthropicChatCompletion {
    pub fn new(api_version: impl Into<String>, model_name_override: Option<String>) -> Self {
        Self {
            model_name_override,
            api_version: api_version.into(),
            path: TargetPath::Fixed(MESSAGES_PATH.to_string()),
            stream: false,
            include_usage: false,
            sse: SseReassembler::new(),
            body: BodyReassembler::new(),
            state: StreamState::default(),
        }
    }

    fn reset_response_state(&mut self) {
        self.sse.clear();
        self.body.clear();
        self.state = StreamState::default();
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.state.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.state.created,
            model: self.state.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            ..Default::default()
        }
    }

    /// Convert one SSE frame, appending canonical events to `out`. Returns the
    /// usage carried by the frame, if any.
    fn convert_event(&mut self, event: SseEvent, out: &mut Vec<u8>) -> AppResult<Option<LLMTokenUsage>> {
        if event.data.is_empty() {
            return Ok(None);
        }
        let parsed: StreamEvent = match serde_json::from_slice(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(event = ?event.event, "skipping unrecognized stream event: {}", e);
                return Ok(None);
            }
        };

        match parsed {
            StreamEvent::MessageStart { message } => {
                self.state.id = message.id;
                self.state.model = message.model;
                self.state.created = Utc::now().timestamp();
                self.state.input_tokens = message.usage.input_tokens;

                let delta = Delta {
                    role: Some("assistant".to_string()),
                    content: Some(String::new()),
                    tool_calls: None,
                };
                write_chunk(out, &self.chunk(delta, None))?;
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, .. },
            } => {
                let tool_index = self.state.tool_indices.len() as u32;
                self.state.tool_indices.insert(index, tool_index);

                let call = ToolCall {
                    index: Some(tool_index),
                    id: Some(id),
                    tool_type: Some("function".to_string()),
                    function: FunctionCall {
                        name: Some(name),
                        arguments: Some(String::new()),
                    },
                };
                write_chunk(out, &self.chunk(tool_call_delta(call), None))?;
            }
            StreamEvent::ContentBlockStart { .. } => {}
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => {
                    let delta = Delta {
                        content: Some(text),
                        ..Default::default()
                    };
                    write_chunk(out, &self.chunk(delta, None))?;
                }
                ContentDelta::InputJsonDelta { partial_json } => {
                    let Some(&tool_index) = self.state.tool_indices.get(&index) else {
                        warn!(index, "input_json_delta for unknown content block");
                        return Ok(None);
                    };
                    let call = ToolCall {
                        index: Some(tool_index),
                        function: FunctionCall {
                            name: None,
                            arguments: Some(partial_json),
                        },
                        ..Default::default()
                    };
                    write_chunk(out, &self.chunk(tool_call_delta(call), None))?;
                }
                ContentDelta::Unknown => {}
            },
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => {}
            StreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = map_stop_reason(delta.stop_reason.as_deref());
                write_chunk(out, &self.chunk(Delta::default(), Some(finish_reason)))?;

                let input_tokens = if usage.input_tokens > 0 {
                    usage.input_tokens
                } else {
                    self.state.input_tokens
                };
                let token_usage = LLMTokenUsage::new(
                    input_tokens,
                    usage.output_tokens,
                    input_tokens.saturating_add(usage.output_tokens),
                );

                if self.include_usage {
                    let mut usage_chunk = self.chunk(Delta::default(), None);
                    usage_chunk.choices.clear();
                    usage_chunk.usage = Some(Usage {
                        prompt_tokens: token_usage.input_tokens,
                        completion_tokens: token_usage.output_tokens,
                        total_tokens: token_usage.total_tokens,
                        ..Default::default()
                    });
                    write_chunk(out, &usage_chunk)?;
                }
                return Ok(Some(token_usage));
            }
            StreamEvent::MessageStop => {
                out.extend_from_slice(b"data: [DONE]\n\n");
            }
            StreamEvent::Error { error } => {
                warn!(error_type = %error.error_type, "backend reported an error mid-stream");
                let payload = ErrorResponse {
                    response_type: None,
                    error: ErrorDetail {
                        error_type: error.error_type,
                        message: error.message,
                        param: None,
                        code: None,
                    },
                };
                out.extend_from_slice(b"data: ");
                serde_json::to_writer(&mut *out, &payload)?;
                out.extend_from_slice(b"\n\n");
            }
        }
        Ok(None)
    }
}

fn tool_call_delta(call: ToolCall) -> Delta {
    Delta {
        tool_calls: Some(vec![call]),
        ..Default::default()
    }
}

fn write_chunk(out: &mut Vec<u8>, chunk: &ChatCompletionChunk) -> AppResult<()> {
    out.extend_from_slice(b"data: ");
    serde_json::to_writer(&mut *out, chunk)?;
    out.extend_from_slice(b"\n\n");
    Ok(())
}

/// Map Anthropic stop_reason to OpenAI finish_reason
pub fn map_stop_reason(stop_reason: Option<&str>) -> String {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") | None => "stop",
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        Some("refusal") => "content_filter",
        Some(other) => {
            warn!("Unknown stop_reason: {}", other);
            "stop"
        }
    }
    .to_string()
}

/// Safe parsing of tool arguments; empty or malformed arguments become `{}`
fn safe_parse_tool_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }

    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!("Failed to parse tool arguments: {}, using empty object", e);
        serde_json::json!({})
    })
}

fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn image_source(url: &str) -> AppResult<anthropic::ImageSource> {
    if let Some(data_url) = url.strip_prefix("data:") {
        let (meta, data) = data_url
            .split_once(',')
            .ok_or_else(|| helpers::invalid_request("malformed image data URL"))?;
        let media_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| helpers::invalid_request("image data URL must be base64 encoded"))?;
        return Ok(anthropic::ImageSource {
            source_type: "base64".to_string(),
            media_type: Some(media_type.to_string()),
            data: Some(data.to_string()),
            url: None,
        });
    }

    Ok(anthropic::ImageSource {
        source_type: "url".to_string(),
        media_type: None,
        data: None,
        url: Some(url.to_string()),
    })
}

fn convert_parts(content: &MessageContent) -> AppResult<Vec<ContentBlock>> {
    match content {
        MessageContent::Text(text) => Ok(vec![ContentBlock::Text { text: text.clone() }]),
        MessageContent::Parts(parts) => {
            let mut blocks = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text { text } => blocks.push(ContentBlock::Text { text: text.clone() }),
                    ContentPart::ImageUrl { image_url } => blocks.push(ContentBlock::Image {
                        source: image_source(&image_url.url)?,
                    }),
                    ContentPart::Unknown => warn!("Skipping unsupported content part"),
                }
            }
            Ok(blocks)
        }
    }
}

/// Append blocks, merging with the previous message when the role repeats
fn push_blocks(messages: &mut Vec<anthropic::Message>, role: &str, blocks: Vec<ContentBlock>) {
    if blocks.is_empty() {
        return;
    }
    if let Some(last) = messages.last_mut().filter(|m| m.role == role) {
        if let anthropic::MessageContent::Blocks(existing) = &mut last.content {
            existing.extend(blocks);
            return;
        }
    }
    messages.push(anthropic::Message {
        role: role.to_string(),
        content: anthropic::MessageContent::Blocks(blocks),
    });
}

fn convert_tool_choice(choice: &serde_json::Value) -> AppResult<serde_json::Value> {
    match choice {
        serde_json::Value::String(mode) => match mode.as_str() {
            "auto" => Ok(serde_json::json!({"type": "auto"})),
            "required" => Ok(serde_json::json!({"type": "any"})),
            "none" => Ok(serde_json::json!({"type": "none"})),
            other => Err(helpers::invalid_request(format!("unsupported tool_choice: {}", other))),
        },
        serde_json::Value::Object(selector) => selector
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(|n| n.as_str())
            .map(|name| serde_json::json!({"type": "tool", "name": name}))
            .ok_or_else(|| helpers::invalid_request("tool_choice object must name a function")),
        _ => Err(helpers::invalid_request("unsupported tool_choice")),
    }
}

/// Convert a chat completion request to a Messages request
pub fn convert_request(request: &ChatCompletionRequest, model: &str) -> AppResult<MessagesRequest> {
    if request.n.is_some_and(|n| n > 1) {
        return Err(helpers::invalid_request("n > 1 is not supported by this backend"));
    }

    let mut system = Vec::new();
    let mut messages = Vec::new();

    for message in &request.messages {
        match message.role.as_str() {
            "system" | "developer" => {
                if let Some(content) = &message.content {
                    system.push(content_text(content));
                }
            }
            "user" => {
                let blocks = match &message.content {
                    Some(content) => convert_parts(content)?,
                    None => Vec::new(),
                };
                push_blocks(&mut messages, "user", blocks);
            }
            "assistant" => {
                let mut blocks = Vec::new();
                if let Some(content) = &message.content {
                    let text = content_text(content);
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text { text });
                    }
                }
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone().unwrap_or_default(),
                        name: call.function.name.clone().unwrap_or_default(),
                        input: safe_parse_tool_arguments(call.function.arguments.as_deref().unwrap_or_default()),
                    });
                }
                push_blocks(&mut messages, "assistant", blocks);
            }
            "tool" => {
                let tool_use_id = message
                    .tool_call_id
                    .clone()
                    .ok_or_else(|| helpers::invalid_request("tool message without tool_call_id"))?;
                let block = ContentBlock::ToolResult {
                    tool_use_id,
                    content: message.content.as_ref().map(content_text).unwrap_or_default(),
                    is_error: None,
                };
                push_blocks(&mut messages, "user", vec![block]);
            }
            other => return Err(helpers::invalid_request(format!("unsupported message role: {}", other))),
        }
    }

    if messages.is_empty() {
        return Err(helpers::invalid_request("at least one non-system message is required"));
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| anthropic::Tool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            })
            .collect()
    });

    let metadata = request.user.as_ref().map(|user| {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), serde_json::json!(user));
        metadata
    });

    Ok(MessagesRequest {
        model: model.to_string(),
        max_tokens: request
            .max_completion_tokens
            .or(request.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: if system.is_empty() { None } else { Some(system.join("\n")) },
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone().map(|s| s.into_vec()),
        stream: request.is_streaming().then_some(true),
        tools,
        tool_choice: request.tool_choice.as_ref().map(convert_tool_choice).transpose()?,
        metadata,
    })
}

/// Convert a Messages response to a chat completion
pub fn convert_response(response: MessagesResponse) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                index: None,
                id: Some(id),
                tool_type: Some("function".to_string()),
                function: FunctionCall {
                    name: Some(name),
                    arguments: Some(input.to_string()),
                },
            }),
            _ => {}
        }
    }

    let usage = LLMTokenUsage::from(&response.usage);
    ChatCompletionResponse {
        id: response.id,
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: response.model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: if text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(MessageContent::Text(text))
                },
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                ..Default::default()
            },
            logprobs: None,
            finish_reason: Some(map_stop_reason(response.stop_reason.as_deref())),
        }],
        usage: Some(Usage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            ..Default::default()
        }),
        system_fingerprint: None,
    }
}

impl Translator for OpenAIToAnthropicChatCompletion {
    fn request_body(
        &mut self,
        _original: &[u8],
        request: &CanonicalRequest,
        on_retry: bool,
    ) -> AppResult<PhaseMutations> {
        let CanonicalRequest::ChatCompletion(chat) = request else {
            return Err(helpers::unsupported_conversion(format!(
                "Anthropic backends do not serve {} requests",
                request.endpoint()
            )));
        };

        self.stream = chat.is_streaming();
        self.include_usage = chat.include_usage();
        if on_retry {
            self.reset_response_state();
        }

        let model = self.model_name_override.as_deref().unwrap_or(&chat.model);
        let converted = convert_request(chat, model)?;
        debug!(request = %create_anthropic_request_log_summary(&converted), "converted request");

        let body = serde_json::to_vec(&converted)?;
        let mut mutations = PhaseMutations::with_body(
            Some(path_mutation(self.path.resolve(Endpoint::ChatCompletions, model))),
            body,
        );
        if let Some(headers) = mutations.header_mutation.as_mut() {
            headers.set(ANTHROPIC_VERSION_HEADER, self.api_version.as_str());
        }
        Ok(mutations)
    }

    fn response_headers(&mut self, headers: &Headers) -> AppResult<Option<HeaderMutation>> {
        let mut mutation = HeaderMutation::new();
        for kind in RATE_LIMIT_KINDS {
            for field in RATE_LIMIT_FIELDS {
                if let Some(value) = header(headers, &format!("anthropic-ratelimit-{}-{}", kind, field)) {
                    mutation.set(format!("x-ratelimit-{}-{}", field, kind), value);
                }
            }
        }
        if self.stream {
            // every fragment is replaced with converted bytes
            mutation.remove(CONTENT_LENGTH_HEADER);
        }
        Ok((!mutation.is_empty()).then_some(mutation))
    }

    fn response_body(
        &mut self,
        _headers: &Headers,
        body: &mut dyn Read,
        end_of_stream: bool,
    ) -> AppResult<ResponseBodyOutput> {
        let fragment = read_body(body)?;

        if self.stream {
            self.sse.push(&fragment);
            let mut out = Vec::new();
            let mut token_usage = LLMTokenUsage::default();
            while let Some(event) = self.sse.next_event() {
                if let Some(usage) = self.convert_event(event, &mut out)? {
                    token_usage += usage;
                }
            }
            return Ok(ResponseBodyOutput::from_mutations(
                PhaseMutations::with_fragment(out),
                token_usage,
            ));
        }

        self.body.push(&fragment);
        if !end_of_stream {
            // hold the fragment back until the whole document is converted
            return Ok(ResponseBodyOutput::from_mutations(
                PhaseMutations::with_fragment(Vec::new()),
                LLMTokenUsage::default(),
            ));
        }

        let document = self.body.take();
        let response: MessagesResponse =
            serde_json::from_slice(&document).invalid_response_context("failed to parse Messages response")?;
        let token_usage = LLMTokenUsage::from(&response.usage);
        let converted = serde_json::to_vec(&convert_response(response))?;
        Ok(ResponseBodyOutput::from_mutations(
            PhaseMutations::with_body(None, converted),
            token_usage,
        ))
    }

    fn response_error(&mut self, headers: &Headers, body: &mut dyn Read) -> AppResult<PhaseMutations> {
        let status = header(headers, STATUS_HEADER).unwrap_or_default();
        let raw = read_body(body)?;
        let envelope = backend_error::anthropic_backend_error(status, header(headers, CONTENT_TYPE_HEADER), &raw);
        debug!(status = %status, error_type = %envelope.error.error_type, "normalized backend error");
        Ok(PhaseMutations::with_body(None, backend_error::encode(&envelope)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::mutation::PATH_HEADER;

    fn chat(body: &str) -> ChatCompletionRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_request_conversion() {
        let request = chat(
            r#"{"model":"claude-sonnet","messages":[
                {"role":"system","content":"Be brief."},
                {"role":"user","content":"Weather?"},
                {"role":"assistant","content":null,"tool_calls":[{"id":"call_1","type":"function","function":{"name":"weather","arguments":"{\"city\":\"Paris\"}"}}]},
                {"role":"tool","tool_call_id":"call_1","content":"sunny"},
                {"role":"tool","tool_call_id":"call_2","content":"warm"}
            ],"stop":"END","user":"u-1","tool_choice":"required",
            "tools":[{"type":"function","function":{"name":"weather","parameters":{"type":"object"}}}]}"#,
        );

        let converted = convert_request(&request, "claude-sonnet").unwrap();
        assert_eq!(converted.system.as_deref(), Some("Be brief."));
        assert_eq!(converted.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(converted.stop_sequences, Some(vec!["END".to_string()]));
        assert_eq!(converted.tool_choice, Some(serde_json::json!({"type": "any"})));
        assert_eq!(converted.messages.len(), 3);
        assert_eq!(converted.messages[2].role, "user");

        match &converted.messages[1].content {
            anthropic::MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolUse { id, input, .. } => {
                    assert_eq!(id, "call_1");
                    assert_eq!(input["city"], "Paris");
                }
                other => panic!("unexpected block: {:?}", other),
            },
            other => panic!("unexpected content: {:?}", other),
        }
        match &converted.messages[2].content {
            anthropic::MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_image_sources() {
        let data = image_source("data:image/png;base64,iVBOR").unwrap();
        assert_eq!(data.source_type, "base64");
        assert_eq!(data.media_type.as_deref(), Some("image/png"));
        assert_eq!(data.data.as_deref(), Some("iVBOR"));

        let url = image_source("https://example.com/cat.png").unwrap();
        assert_eq!(url.source_type, "url");
        assert!(image_source("data:image/png,raw").is_err());
    }

    #[test]
    fn test_request_phase_mutations() {
        let body = r#"{"model":"claude-sonnet","messages":[{"role":"user","content":"hi"}],"max_tokens":16}"#;
        let request = CanonicalRequest::parse(Endpoint::ChatCompletions, body.as_bytes()).unwrap();
        let mut t = OpenAIToAnthropicChatCompletion::new("2023-06-01", Some("claude-3-5-haiku".to_string()));

        let mutations = t.request_body(body.as_bytes(), &request, false).unwrap();
        let headers = mutations.header_mutation.unwrap();
        let sent = mutations.body_mutation.unwrap().body;

        assert_eq!(headers.set_headers[0].key, PATH_HEADER);
        assert_eq!(headers.get(PATH_HEADER), Some(MESSAGES_PATH.as_bytes()));
        assert_eq!(headers.set_headers[1].key, CONTENT_LENGTH_HEADER);
        assert_eq!(headers.get(ANTHROPIC_VERSION_HEADER), Some(&b"2023-06-01"[..]));

        let sent: serde_json::Value = serde_json::from_slice(&sent).unwrap();
        assert_eq!(sent["model"], "claude-3-5-haiku");
        assert_eq!(sent["max_tokens"], 16);
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason(Some("end_turn")), "stop");
        assert_eq!(map_stop_reason(Some("max_tokens")), "length");
        assert_eq!(map_stop_reason(Some("tool_use")), "tool_calls");
        assert_eq!(map_stop_reason(Some("refusal")), "content_filter");
    }

    #[test]
    fn test_rate_limit_headers_are_remapped() {
        let mut t = OpenAIToAnthropicChatCompletion::new("2023-06-01", None);
        t.stream = true;
        let mut headers = Headers::new();
        headers.insert("anthropic-ratelimit-requests-remaining".to_string(), "99".to_string());
        headers.insert("anthropic-ratelimit-tokens-limit".to_string(), "80000".to_string());

        let mutation = t.response_headers(&headers).unwrap().unwrap();
        assert_eq!(mutation.get("x-ratelimit-remaining-requests"), Some(&b"99"[..]));
        assert_eq!(mutation.get("x-ratelimit-limit-tokens"), Some(&b"80000"[..]));
        assert_eq!(mutation.remove_headers, vec![CONTENT_LENGTH_HEADER.to_string()]);

        t.stream = false;
        assert!(t.response_headers(&Headers::new()).unwrap().is_none());
    }

    #[test]
    fn test_tool_use_stream_conversion() {
        let mut t = OpenAIToAnthropicChatCompletion::new("2023-06-01", None);
        let stream = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude\",\"usage\":{\"input_tokens\":5,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"weather\",\"input\":{}}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\"\"}}\n\n",
        );
        t.stream = true;

        let out = t.response_body(&Headers::new(), &mut stream.as_bytes(), false).unwrap();
        let text = String::from_utf8(out.body_mutation.unwrap().body).unwrap();
        let chunks: Vec<ChatCompletionChunk> = text
            .split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|json| serde_json::from_str(json).unwrap())
            .collect();

        let removed = out.header_mutation.unwrap().remove_headers;
        assert_eq!(removed, vec![CONTENT_LENGTH_HEADER.to_string()]);
        assert_eq!(chunks.len(), 3);
        let call = &chunks[1].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, Some(0));
        assert_eq!(call.id.as_deref(), Some("toolu_1"));
        let call = &chunks[2].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.arguments.as_deref(), Some("{\"city\""));
        assert!(out.token_usage.is_zero());
    }

    #[test]
    fn test_error_mapping_always_mutates() {
        let mut t = OpenAIToAnthropicChatCompletion::new("2023-06-01", None);
        let mut headers = Headers::new();
        headers.insert(":status".to_string(), "429".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());

        let body = br#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let out = t.response_error(&headers, &mut &body[..]).unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&out.body_mutation.unwrap().body).unwrap();
        assert_eq!(envelope["error"]["type"], "rate_limit_error");
        assert_eq!(envelope["error"]["code"], "429");
    }
}
