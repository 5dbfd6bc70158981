use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_MAX_PAGE_LIMIT;
use crate::resource::{default_catalogue, ResourceSchema};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// API server configuration
    Serve,
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_page_limit() -> u64 {
    DEFAULT_MAX_PAGE_LIMIT
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Server configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    /// Configuration type (must be "serve")
    pub config_type: ConfigType,
    /// API server port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the database and the uploads tree (default: data)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file path (default: <data_dir>/cms.sqlite)
    pub database_file: Option<PathBuf>,
    /// Largest page size a client may request (default: 100)
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u64,
    /// Request body limit, uploads included (default: 50 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Resource kinds to serve (default: the built-in catalogue)
    pub resources: Option<Vec<ResourceSchema>>,
}

impl ServeConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: ServeConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved SQLite path
    pub fn database_path(&self) -> PathBuf {
        self.database_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("cms.sqlite"))
    }

    /// Configured resources, or the built-in catalogue when none are listed
    pub fn resource_schemas(&self) -> Vec<ResourceSchema> {
        self.resources.clone().unwrap_or_else(default_catalogue)
    }

    /// Validate limits and resource descriptors
    pub fn validate(&self) -> Result<(), String> {
        if self.config_type != ConfigType::Serve {
            return Err("config_type must be \"serve\"".to_string());
        }
        if self.max_page_limit == 0 {
            return Err("max_page_limit must be at least 1".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".to_string());
        }

        let schemas = self.resource_schemas();
        if schemas.is_empty() {
            return Err("at least one resource must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for schema in &schemas {
            schema.validate(self.max_page_limit)?;
            if !seen.insert(schema.kind.as_str()) {
                return Err(format!("resource '{}' is configured twice", schema.kind));
            }
        }
        Ok(())
    }
}
