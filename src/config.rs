use crate::cli::Cli;
use crate::error::{ConfigError, ConfigResult as Result};
use crate::http_client::HttpClientConfig;
use crate::mode::SchemaMode;
use crate::model::W3C_XML_SCHEMA_NS_URI;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Builder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BuilderConfig {
    pub schema: SchemaConfig,
    pub network: NetworkConfig,
    pub resources: ResourceConfig,
}

/// Schema attachment and compilation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// When schemas are attached to marshallers and unmarshallers
    pub mode: SchemaMode,
    /// Schema language handed to the compiler
    pub language: String,
}

/// Network configuration for remote schema documents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed downloads
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Upper bound for the exponential back-off
    pub max_retry_delay_ms: u64,
}

/// Where `classpath:` and relative locations are looked up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourceConfig {
    pub classpath_roots: Vec<PathBuf>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            mode: SchemaMode::Never,
            language: W3C_XML_SCHEMA_NS_URI.to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
        }
    }
}

impl NetworkConfig {
    pub fn to_http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: self.timeout_seconds,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            ..HttpClientConfig::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            classpath_roots: vec![PathBuf::from(".")],
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    const CONFIG_NAMES: [&'static str; 4] = [
        "xml-binder.toml",
        "xml-binder.json",
        ".xml-binder.toml",
        ".xml-binder.json",
    ];

    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<BuilderConfig> {
        let config = match &cli.config {
            Some(path) => Self::load_from_file(path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        let config = Self::apply_environment_overrides(config)?;
        let config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<BuilderConfig> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<BuilderConfig>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Find a configuration file in the working directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<BuilderConfig>> {
        let mut candidates: Vec<PathBuf> = Self::CONFIG_NAMES.iter().map(PathBuf::from).collect();
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("xml-binder");
            candidates.extend(Self::CONFIG_NAMES.iter().map(|name| app_dir.join(name)));
        }

        for path in candidates {
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: BuilderConfig) -> Result<BuilderConfig> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: BuilderConfig,
    ) -> Result<BuilderConfig> {
        if let Some(mode) = env.get("XML_BINDER_SCHEMA_MODE") {
            config.schema.mode = mode.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_BINDER_SCHEMA_MODE value: {}", mode))
            })?;
        }

        if let Some(language) = env.get("XML_BINDER_SCHEMA_LANGUAGE") {
            config.schema.language = language;
        }

        if let Some(timeout) = env.get("XML_BINDER_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_BINDER_TIMEOUT value: {}", timeout))
            })?;
        }

        if let Some(retry_attempts) = env.get("XML_BINDER_RETRY_ATTEMPTS") {
            config.network.retry_attempts = retry_attempts.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_BINDER_RETRY_ATTEMPTS value: {}",
                    retry_attempts
                ))
            })?;
        }

        if let Some(classpath) = env.get("XML_BINDER_CLASSPATH") {
            config.resources.classpath_roots = classpath
                .split(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: BuilderConfig, cli: &Cli) -> BuilderConfig {
        if let Some(mode) = cli.schema_mode {
            config.schema.mode = mode;
        }
        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }
        if !cli.classpath.is_empty() {
            config.resources.classpath_roots = cli.classpath.clone();
        }
        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &BuilderConfig) -> Result<()> {
        if config.schema.language.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Schema language must not be empty".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.network.max_retry_delay_ms < config.network.retry_delay_ms {
            return Err(ConfigError::Validation(
                "Maximum retry delay cannot be below the initial retry delay".to_string(),
            ));
        }

        if config.resources.classpath_roots.is_empty() {
            return Err(ConfigError::Validation(
                "At least one classpath root must be specified".to_string(),
            ));
        }

        Ok(())
    }
}
