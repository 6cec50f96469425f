//! Service layer module
//!
//! Contains the per-exchange processor

pub mod processor;

pub use processor::{PhaseEvent, PhaseResponse, Processor, SELECTED_BACKEND_HEADER};
