//! File-based configuration loading
//!
//! Loads the input schema and backend definitions from a JSON file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Default `anthropic-version` sent to Anthropic backends
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host (default: "127.0.0.1" - localhost only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 1064)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1064
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Wire protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum APISchemaName {
    OpenAI,
    AzureOpenAI,
    Anthropic,
}

impl fmt::Display for APISchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            APISchemaName::OpenAI => "OpenAI",
            APISchemaName::AzureOpenAI => "AzureOpenAI",
            APISchemaName::Anthropic => "Anthropic",
        };
        f.write_str(name)
    }
}

/// A protocol family and its version.
///
/// For OpenAI the version is the path prefix (`v1`), for Azure OpenAI the
/// `api-version` query parameter, for Anthropic the `anthropic-version` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedAPISchema {
    pub name: APISchemaName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl VersionedAPISchema {
    /// Version with the per-family default applied. Azure has no default.
    pub fn version_or_default(&self) -> Option<&str> {
        match (&self.version, self.name) {
            (Some(version), _) => Some(version.as_str()),
            (None, APISchemaName::OpenAI) => Some("v1"),
            (None, APISchemaName::Anthropic) => Some(DEFAULT_ANTHROPIC_VERSION),
            (None, APISchemaName::AzureOpenAI) => None,
        }
    }
}

fn default_input_schema() -> VersionedAPISchema {
    VersionedAPISchema {
        name: APISchemaName::OpenAI,
        version: Some("v1".to_string()),
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Protocol spoken by the backend
    pub schema: VersionedAPISchema,

    /// Model name sent upstream regardless of the client's choice
    #[serde(rename = "modelNameOverride", default, skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
}

/// Application configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Admin server configuration (optional, defaults to localhost:1064)
    #[serde(default)]
    pub server: ServerConfig,

    /// Schema clients speak
    #[serde(default = "default_input_schema")]
    pub schema: VersionedAPISchema,

    /// Backends by name, as referenced by the selected-backend header
    pub backends: HashMap<String, BackendConfig>,
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&content)?;

        debug!("Loaded {} backends", config.backends.len());
        Ok(config)
    }

    /// Parse and validate configuration JSON
    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    /// Searches in order:
    /// 1. ~/.config/aigateway-extproc/extproc.json
    /// 2. ./extproc.json
    ///
    /// Returns error if no configuration file is found.
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("aigateway-extproc").join("extproc.json");
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        let local_path = Path::new("extproc.json");
        if local_path.exists() {
            return Self::load(local_path);
        }

        anyhow::bail!(
            "Configuration file not found. Set AIGW_CONFIG or create one at:\n\
             - ~/.config/aigateway-extproc/extproc.json (recommended)\n\
             - ./extproc.json (current directory)"
        )
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.schema.name != APISchemaName::OpenAI {
            anyhow::bail!("Unsupported input schema '{}', only OpenAI is served", self.schema.name);
        }
        if self.schema.version.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("Input schema version cannot be empty");
        }

        if self.backends.is_empty() {
            anyhow::bail!("At least one backend must be configured");
        }

        for (name, backend) in &self.backends {
            if name.is_empty() {
                anyhow::bail!("Backend names cannot be empty");
            }
            match backend.schema.version_or_default() {
                None => anyhow::bail!("Backend '{}' uses {} and must set a schema version", name, backend.schema.name),
                Some("") => anyhow::bail!("Backend '{}' has an empty schema version", name),
                Some(_) => {}
            }
            if backend.model_name_override.as_deref().is_some_and(str::is_empty) {
                anyhow::bail!("Backend '{}' has an empty modelNameOverride", name);
            }
        }

        Ok(())
    }

    /// Version prefix of the client-facing paths
    pub fn input_version(&self) -> &str {
        self.schema.version_or_default().unwrap_or("v1")
    }

    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Sorted backend names
    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
