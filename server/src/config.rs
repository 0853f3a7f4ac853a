use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Listen address for the HTTP server
    pub listen_addr: String,
    /// Port number to listen on
    pub port: u16,
    /// Seconds allowed for in-flight requests to drain on shutdown
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one database file per project.
    /// Defaults to `<home>/.airyra/projects` when unset.
    pub base_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MaintenanceConfig {
    /// Days of audit history to keep; 0 disables the pruning worker
    pub audit_retention_days: u32,
    /// Seconds between pruning sweeps
    pub audit_prune_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional config
    /// file, and environment variable overrides.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // Start with default configuration
        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        // Add config file if specified
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        // Add environment variable overrides with AIRYRA_ prefix
        builder = builder.add_source(
            Environment::with_prefix("AIRYRA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Handle the common standalone environment variables as overrides
        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("AIRYRA")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .context("Failed to build configuration from file")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration from file")?;
        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Apply standard environment variables (LISTEN_ADDR, LOG_LEVEL,
    /// AIRYRA_BASE_DIR) for compatibility with common deployment patterns
    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(listen_addr) = env::var("LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Ok(base_dir) = env::var("AIRYRA_BASE_DIR") {
            config.storage.base_dir = Some(base_dir);
        }
    }

    /// The project database directory, defaulting to `<home>/.airyra/projects`.
    pub fn base_dir(&self) -> PathBuf {
        match &self.storage.base_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Self::default_base_dir(),
        }
    }

    /// Default base directory under the user's home, falling back to the
    /// current directory when no home is available.
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".airyra")
            .join("projects")
    }

    /// Get the server socket address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        // the drain window is bounded by contract: at least 5s, at most 30s
        if !(5..=30).contains(&self.server.shutdown_grace_secs) {
            return Err(anyhow::anyhow!(
                "shutdown_grace_secs must be between 5 and 30, got {}",
                self.server.shutdown_grace_secs
            ));
        }

        if self.maintenance.audit_retention_days > 0
            && self.maintenance.audit_prune_interval_secs == 0
        {
            return Err(anyhow::anyhow!(
                "audit_prune_interval_secs must be greater than 0 when pruning is enabled"
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "127.0.0.1".to_string(),
                port: 7420,
                shutdown_grace_secs: 10,
            },
            storage: StorageConfig { base_dir: None },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            maintenance: MaintenanceConfig {
                audit_retention_days: 0,
                audit_prune_interval_secs: 3600,
            },
        }
    }
}
