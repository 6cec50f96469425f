//! Logging utilities
//!
//! Truncated summaries of requests for debug logs

use crate::models::anthropic::{self, ContentBlock, MessagesRequest};
use crate::models::openai::{ChatCompletionRequest, ChatMessage, EmbeddingRequest, MessageContent};

/// Set to true to include full request details (tools, system prompts) in debug logs
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Truncate a string with a note about original length
fn truncate_content(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}... ({} chars truncated)", &s[..cut], s.chars().count() - max_len),
        None => s.to_string(),
    }
}

/// Printable prefix of a raw body fragment
pub fn body_preview(body: &[u8], max_len: usize) -> String {
    truncate_content(&String::from_utf8_lossy(body), max_len)
}

fn filter_chat_message(msg: &ChatMessage) -> serde_json::Value {
    let content = match &msg.content {
        Some(MessageContent::Text(t)) => {
            // system prompts tend to be long
            let max_len = if msg.role == "system" || msg.role == "developer" { 100 } else { 200 };
            serde_json::Value::String(truncate_content(t, max_len))
        }
        Some(MessageContent::Parts(parts)) => {
            serde_json::json!(format!("[...{} content parts]", parts.len()))
        }
        None => serde_json::Value::Null,
    };

    let mut obj = serde_json::json!({
        "role": msg.role,
        "content": content,
    });

    if let Some(tool_calls) = &msg.tool_calls {
        obj["tool_calls"] = serde_json::json!(format!("[...{} tool calls]", tool_calls.len()));
    }
    if let Some(tool_call_id) = &msg.tool_call_id {
        obj["tool_call_id"] = serde_json::json!(tool_call_id);
    }

    obj
}

/// Summary of a chat completion request, keeping its shape but truncating content
pub fn create_request_log_summary(request: &ChatCompletionRequest) -> serde_json::Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::to_value(request).unwrap_or(serde_json::json!({"error": "serialize failed"}));
    }

    let messages: Vec<serde_json::Value> = request.messages.iter().map(filter_chat_message).collect();
    let tools = match &request.tools {
        Some(t) if !t.is_empty() => serde_json::json!([format!("...{} tools (details truncated)", t.len())]),
        _ => serde_json::Value::Null,
    };

    serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens.or(request.max_completion_tokens),
        "temperature": request.temperature,
        "stream": request.stream,
        "messages": messages,
        "tools": tools,
    })
}

/// Summary of an embeddings request
pub fn create_embedding_log_summary(request: &EmbeddingRequest) -> serde_json::Value {
    let input = match &request.input {
        serde_json::Value::String(s) => serde_json::Value::String(truncate_content(s, 100)),
        serde_json::Value::Array(items) => serde_json::json!(format!("[...{} inputs]", items.len())),
        other => other.clone(),
    };

    serde_json::json!({
        "model": request.model,
        "encoding_format": request.encoding_format,
        "dimensions": request.dimensions,
        "input": input,
    })
}

fn filter_anthropic_message(msg: &anthropic::Message) -> serde_json::Value {
    let content = match &msg.content {
        anthropic::MessageContent::Text(t) => serde_json::Value::String(truncate_content(t, 200)),
        anthropic::MessageContent::Blocks(blocks) => {
            let mut previews: Vec<serde_json::Value> = blocks
                .iter()
                .take(3)
                .map(|b| match b {
                    ContentBlock::Text { text } => {
                        serde_json::json!({"type": "text", "text": truncate_content(text, 100)})
                    }
                    ContentBlock::Image { .. } => serde_json::json!({"type": "image", "source": "[truncated]"}),
                    ContentBlock::ToolUse { id, name, .. } => {
                        serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": "[truncated]"})
                    }
                    ContentBlock::ToolResult { tool_use_id, content, .. } => {
                        serde_json::json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": truncate_content(content, 50)})
                    }
                    ContentBlock::Unknown => serde_json::json!({"type": "unknown"}),
                })
                .collect();

            if blocks.len() > 3 {
                previews.push(serde_json::json!(format!("...and {} more blocks", blocks.len() - 3)));
            }
            serde_json::Value::Array(previews)
        }
    };

    serde_json::json!({
        "role": msg.role,
        "content": content,
    })
}

/// Summary of a translated Anthropic Messages request
pub fn create_anthropic_request_log_summary(request: &MessagesRequest) -> serde_json::Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::to_value(request).unwrap_or(serde_json::json!({"error": "serialize failed"}));
    }

    let messages: Vec<serde_json::Value> = request.messages.iter().map(filter_anthropic_message).collect();
    let tools = match &request.tools {
        Some(t) if !t.is_empty() => serde_json::json!([format!("...{} tools (details truncated)", t.len())]),
        _ => serde_json::Value::Null,
    };
    let system = request
        .system
        .as_deref()
        .map(|s| serde_json::Value::String(truncate_content(s, 100)))
        .unwrap_or(serde_json::Value::Null);

    serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": request.stream,
        "system": system,
        "messages": messages,
        "tools": tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_content("héllo", 10), "héllo");
        assert_eq!(truncate_content("héllo", 2), "hé... (3 chars truncated)");
        assert_eq!(body_preview(b"data: {}", 4), "data... (4 chars truncated)");
    }

    #[test]
    fn test_chat_summary_truncates_long_messages() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: Some(MessageContent::Text("x".repeat(150))),
                ..Default::default()
            }],
            ..Default::default()
        };

        let summary = create_request_log_summary(&request);
        let content = summary["messages"][0]["content"].as_str().unwrap();
        assert!(content.ends_with("(50 chars truncated)"));
        assert_eq!(summary["tools"], serde_json::Value::Null);
    }

    #[test]
    fn test_embedding_summary() {
        let request: EmbeddingRequest =
            serde_json::from_str(r#"{"model":"e","input":["a","b"],"encoding_format":"base64"}"#).unwrap();
        let summary = create_embedding_log_summary(&request);
        assert_eq!(summary["input"], "[...2 inputs]");
        assert_eq!(summary["encoding_format"], "base64");
    }
}
