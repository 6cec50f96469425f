//! Embeddings to an OpenAI-compatible backend

use super::embedding::EmbeddingPayload;
use super::openai_chat::{passthrough_error, passthrough_request};
use super::reassembler::BodyReassembler;
use super::{
    read_body, CanonicalRequest, Endpoint, HeaderMutation, Headers, LLMTokenUsage, PhaseMutations,
    ResponseBodyOutput, TargetPath, Translator,
};
use crate::models::openai::{Embedding, EmbeddingResponse, EmbeddingVector, EncodingFormat, Usage};
use crate::utils::error::{helpers, AppResult, ErrorContext};
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;
use serde_json::Value;
use std::io::Read;
use tracing::debug;

/// Embedding response with vectors left undecoded
#[derive(Deserialize)]
struct WireEmbeddingResponse<'a> {
    #[serde(borrow, default)]
    error: Option<&'a RawValue>,
    /// `Some(Value::Null)` when the key is present but null
    #[serde(default, deserialize_with = "present")]
    object: Option<Value>,
    #[serde(borrow, default)]
    data: Option<Vec<WireEmbedding<'a>>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Distinguish a present `null` from an absent key
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct WireEmbedding<'a> {
    #[serde(default)]
    object: String,
    #[serde(borrow)]
    embedding: &'a RawValue,
    #[serde(default)]
    index: u32,
}

/// Parse an embeddings response, decoding each vector with the requested
/// format.
///
/// Returns `Ok(None)` when the backend reported an error object instead of
/// embeddings.
pub fn parse_embedding_response(body: &[u8], format: EncodingFormat) -> AppResult<Option<EmbeddingResponse>> {
    let wire: WireEmbeddingResponse<'_> =
        serde_json::from_slice(body).invalid_response_context("failed to parse embeddings response")?;

    if wire.error.is_some() {
        return Ok(None);
    }
    let object = wire
        .object
        .ok_or_else(|| helpers::invalid_response("invalid response structure: missing object"))?;
    let object = object.as_str().unwrap_or_default().to_string();

    let data = wire
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|item| -> AppResult<Embedding> {
            let values = EmbeddingPayload::from_raw(item.embedding, format)?.decode()?;
            Ok(Embedding {
                object: item.object,
                embedding: EmbeddingVector(values),
                index: item.index,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Some(EmbeddingResponse {
        object,
        data,
        model: wire.model.unwrap_or_default(),
        usage: wire.usage.unwrap_or_default(),
    }))
}

/// OpenAI embeddings translator (also used for Azure OpenAI)
#[derive(Debug)]
pub struct OpenAIToOpenAIEmbedding {
    model_name_override: Option<String>,
    path: TargetPath,
    encoding_format: EncodingFormat,
    body: BodyReassembler,
}

impl OpenAIToOpenAIEmbedding {
    pub fn new(path: TargetPath, model_name_override: Option<String>) -> Self {
        Self {
            model_name_override,
            path,
            encoding_format: EncodingFormat::default(),
            body: BodyReassembler::new(),
        }
    }
}

impl Translator for OpenAIToOpenAIEmbedding {
    fn request_body(
        &mut self,
        original: &[u8],
        request: &CanonicalRequest,
        on_retry: bool,
    ) -> AppResult<PhaseMutations> {
        let CanonicalRequest::Embedding(embedding) = request else {
            return Err(helpers::unsupported_conversion(format!(
                "embeddings translator cannot handle {} requests",
                request.endpoint()
            )));
        };

        self.encoding_format = embedding.encoding_format.unwrap_or_default();
        if on_retry {
            self.body.clear();
        }

        passthrough_request(
            original,
            &embedding.model,
            Endpoint::Embeddings,
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
        self.body.push(&fragment);
        if !end_of_stream {
            return Ok(ResponseBodyOutput::default());
        }

        let document = self.body.take();
        let usage = match parse_embedding_response(&document, self.encoding_format)? {
            Some(response) => {
                debug!(vectors = response.data.len(), "decoded embeddings response");
                LLMTokenUsage::new(response.usage.prompt_tokens, 0, response.usage.total_tokens)
            }
            None => {
                debug!("embeddings backend returned an error object");
                LLMTokenUsage::default()
            }
        };
        Ok(ResponseBodyOutput::usage_only(usage))
    }

    fn response_error(&mut self, headers: &Headers, body: &mut dyn Read) -> AppResult<PhaseMutations> {
        passthrough_error(headers, body)
    }
}
