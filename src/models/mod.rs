//! Data models module
//!
//! Defines the canonical (OpenAI) schema and the backend schemas translated to

pub mod anthropic;
pub mod openai;
