//! Configuration management for the class GraphQL API
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (graphql.toml)
//! - Environment variables (FAMILIAR_GRAPHQL__*)
//!
//! ## Example config file (graphql.toml):
//! ```toml
//! [project]
//! path = "./project.json"
//! fixture = "./fixture.json"
//!
//! [api]
//! allow_mutation = false
//! pretty = true
//!
//! [cache]
//! enabled = true
//!
//! [logging]
//! filter = "info,familiar_graphql=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlConfig {
    /// Project document and store fixture
    #[serde(default)]
    pub project: ProjectConfig,

    /// Request execution settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Schema cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Path to the project JSON document
    #[serde(default = "default_project_path")]
    pub path: PathBuf,

    /// JSON fixture seeding the in-memory store
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

/// Request execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Grant the mutation capability to every request
    #[serde(default)]
    pub allow_mutation: bool,

    /// Pretty-print JSON responses
    #[serde(default = "default_true")]
    pub pretty: bool,
}

/// Schema cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Reuse compiled schemas while the definitions hash is unchanged
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives used when RUST_LOG is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_project_path() -> PathBuf {
    PathBuf::from("project.json")
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            fixture: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            allow_mutation: false,
            pretty: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl GraphqlConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["graphql.toml", ".graphql.toml", "config/graphql.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "graphql") {
            let xdg_config = config_dir.config_dir().join("graphql.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (FAMILIAR_GRAPHQL__*)
        builder = builder.add_source(
            Environment::with_prefix("FAMILIAR_GRAPHQL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Project document path (resolves relative paths)
    pub fn project_path(&self) -> PathBuf {
        resolve(&self.project.path)
    }

    /// Fixture path (resolves relative paths)
    pub fn fixture_path(&self) -> Option<PathBuf> {
        self.project.fixture.as_deref().map(resolve)
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
