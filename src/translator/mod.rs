//! Translator subsystem
//!
//! A translator converts one exchange between the canonical (OpenAI) schema
//! and a backend's wire format. It is created once per exchange by
//! [`factory::new_translator`] and driven phase by phase: request body,
//! response headers, response body fragments, or response error.

pub mod anthropic_chat;
pub mod backend_error;
pub mod embedding;
pub mod factory;
pub mod mutation;
pub mod openai_chat;
pub mod openai_embeddings;
pub mod reassembler;
pub mod usage;

use crate::models::openai::{ChatCompletionRequest, EmbeddingRequest};
use crate::utils::error::{AppError, AppResult, ErrorContext};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;

pub use mutation::{BodyMutation, HeaderMutation, HeaderValueOption, PhaseMutations};
pub use usage::LLMTokenUsage;

/// Header map as delivered by the proxy, keys lower-cased
pub type Headers = HashMap<String, String>;

/// Canonical endpoint served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ChatCompletions,
    Embeddings,
}

impl Endpoint {
    /// Resolve an endpoint from a request path such as `/v1/chat/completions`.
    /// The query string is ignored.
    pub fn from_path(path: &str, version: &str) -> AppResult<Self> {
        let path = path.split('?').next().unwrap_or_default();
        let suffix = path
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(version))
            .and_then(|p| p.strip_prefix('/'))
            .ok_or_else(|| AppError::UnsupportedEndpoint(path.to_string()))?;

        match suffix.trim_end_matches('/') {
            "chat/completions" => Ok(Endpoint::ChatCompletions),
            "embeddings" => Ok(Endpoint::Embeddings),
            _ => Err(AppError::UnsupportedEndpoint(path.to_string())),
        }
    }

    /// Path segment of the endpoint below the version prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "chat/completions",
            Endpoint::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed client request body
#[derive(Debug, Clone)]
pub enum CanonicalRequest {
    ChatCompletion(ChatCompletionRequest),
    Embedding(EmbeddingRequest),
}

impl CanonicalRequest {
    /// Parse a request body for the given endpoint
    pub fn parse(endpoint: Endpoint, body: &[u8]) -> AppResult<Self> {
        match endpoint {
            Endpoint::ChatCompletions => serde_json::from_slice(body)
                .map(CanonicalRequest::ChatCompletion)
                .invalid_request_context("failed to parse chat completion request"),
            Endpoint::Embeddings => serde_json::from_slice(body)
                .map(CanonicalRequest::Embedding)
                .invalid_request_context("failed to parse embeddings request"),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            CanonicalRequest::ChatCompletion(r) => &r.model,
            CanonicalRequest::Embedding(r) => &r.model,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            CanonicalRequest::ChatCompletion(_) => Endpoint::ChatCompletions,
            CanonicalRequest::Embedding(_) => Endpoint::Embeddings,
        }
    }
}

/// Upstream path layout of a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPath {
    /// `/{version}/{endpoint}`
    Versioned { version: String },
    /// `/openai/deployments/{model}/{endpoint}?api-version={api_version}`
    AzureDeployment { api_version: String },
    /// A single fixed path
    Fixed(String),
}

impl TargetPath {
    pub fn resolve(&self, endpoint: Endpoint, model: &str) -> String {
        match self {
            TargetPath::Versioned { version } => format!("/{}/{}", version, endpoint),
            TargetPath::AzureDeployment { api_version } => format!(
                "/openai/deployments/{}/{}?api-version={}",
                model, endpoint, api_version
            ),
            TargetPath::Fixed(path) => path.clone(),
        }
    }
}

/// Result of a response body phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseBodyOutput {
    pub header_mutation: Option<HeaderMutation>,
    pub body_mutation: Option<BodyMutation>,
    /// Usage found in this fragment; zero when none was found
    pub token_usage: LLMTokenUsage,
}

impl ResponseBodyOutput {
    pub fn usage_only(token_usage: LLMTokenUsage) -> Self {
        Self {
            token_usage,
            ..Default::default()
        }
    }

    pub fn from_mutations(mutations: PhaseMutations, token_usage: LLMTokenUsage) -> Self {
        Self {
            header_mutation: mutations.header_mutation,
            body_mutation: mutations.body_mutation,
            token_usage,
        }
    }
}

/// Per-exchange protocol converter.
///
/// Phases are invoked sequentially by the owner of the exchange. A retry
/// re-invokes [`Translator::request_body`] with `on_retry` set, which discards
/// all response-side state of the previous attempt.
pub trait Translator: Send {
    /// Rewrite the request body and path for the backend
    fn request_body(&mut self, original: &[u8], request: &CanonicalRequest, on_retry: bool)
        -> AppResult<PhaseMutations>;

    /// Rewrite response headers
    fn response_headers(&mut self, headers: &Headers) -> AppResult<Option<HeaderMutation>>;

    /// Process one response body fragment
    fn response_body(&mut self, headers: &Headers, body: &mut dyn Read, end_of_stream: bool)
        -> AppResult<ResponseBodyOutput>;

    /// Normalize a non-2xx response body
    fn response_error(&mut self, headers: &Headers, body: &mut dyn Read) -> AppResult<PhaseMutations>;
}

/// Read a whole body
pub(crate) fn read_body(body: &mut dyn Read) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn header<'a>(headers: &'a Headers, key: &str) -> Option<&'a str> {
    headers.get(key).map(String::as_str)
}

/// Header mutation rewriting `:path`
pub(crate) fn path_mutation(path: String) -> HeaderMutation {
    let mut headers = HeaderMutation::new();
    headers.set(mutation::PATH_HEADER, path);
    headers
}
