//! AI gateway external processor
//!
//! Translates OpenAI-compatible LLM traffic passing through an Envoy
//! external-processing filter to the wire format of the selected backend.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod translator;
pub mod utils;

// Re-export common types
pub use config::{AppConfig, Settings};
pub use handlers::{create_router, AppState};
pub use models::{anthropic, openai};
pub use services::{PhaseEvent, PhaseResponse, Processor};
pub use translator::factory::new_translator;
pub use translator::{CanonicalRequest, Endpoint, LLMTokenUsage, Translator};
pub use utils::error::{AppError, AppResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
