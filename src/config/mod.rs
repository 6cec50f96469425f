//! Configuration management module
//!
//! Environment settings and the JSON backend configuration

pub mod file;
pub mod settings;

pub use file::{APISchemaName, AppConfig, BackendConfig, VersionedAPISchema};
pub use settings::Settings;
