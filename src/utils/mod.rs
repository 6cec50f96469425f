//! Utilities module
//!
//! Error handling, JSON patching and logging helpers

pub mod error;
pub mod json_patch;
pub mod logging;
