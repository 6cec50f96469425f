//! Translator selection

use super::anthropic_chat::OpenAIToAnthropicChatCompletion;
use super::openai_chat::OpenAIToOpenAIChatCompletion;
use super::openai_embeddings::OpenAIToOpenAIEmbedding;
use super::{Endpoint, TargetPath, Translator};
use crate::config::{APISchemaName, BackendConfig};
use crate::utils::error::{helpers, AppResult};
use tracing::debug;

/// Create the translator for an endpoint served by a backend
pub fn new_translator(endpoint: Endpoint, backend: &BackendConfig) -> AppResult<Box<dyn Translator>> {
    let schema = &backend.schema;
    let version = schema
        .version_or_default()
        .ok_or_else(|| helpers::internal_error(format!("{} backend has no schema version", schema.name)))?
        .to_string();
    let model_name_override = backend.model_name_override.clone();

    debug!(endpoint = %endpoint, backend_schema = %schema.name, "creating translator");

    let path = match schema.name {
        APISchemaName::OpenAI => TargetPath::Versioned { version },
        APISchemaName::AzureOpenAI => TargetPath::AzureDeployment { api_version: version },
        APISchemaName::Anthropic => {
            return match endpoint {
                Endpoint::ChatCompletions => Ok(Box::new(OpenAIToAnthropicChatCompletion::new(
                    version,
                    model_name_override,
                ))),
                Endpoint::Embeddings => Err(helpers::unsupported_conversion(format!(
                    "{} is not supported by {} backends",
                    endpoint, schema.name
                ))),
            };
        }
    };

    Ok(match endpoint {
        Endpoint::ChatCompletions => Box::new(OpenAIToOpenAIChatCompletion::new(path, model_name_override)),
        Endpoint::Embeddings => Box::new(OpenAIToOpenAIEmbedding::new(path, model_name_override)),
    })
}
