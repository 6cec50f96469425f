//! Token usage accounting

use crate::models::{anthropic, openai};
use std::ops::{Add, AddAssign};

/// Token counts reported by a backend for one exchange.
///
/// A zero field means either "reported as zero" or "not reported"; the two
/// are not distinguished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LLMTokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl LLMTokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32, total_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for LLMTokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for LLMTokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl From<&openai::Usage> for LLMTokenUsage {
    fn from(usage: &openai::Usage) -> Self {
        Self::new(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
    }
}

impl From<&anthropic::Usage> for LLMTokenUsage {
    fn from(usage: &anthropic::Usage) -> Self {
        Self::new(
            usage.input_tokens,
            usage.output_tokens,
            usage.input_tokens.saturating_add(usage.output_tokens),
        )
    }
}
