//! Gateway configuration: YAML file plus command-line overrides.

use std::path::{Path, PathBuf};

use clap::Parser;
use data_connector::{RedisConfig, StorageBackend, StorageConfig};
use gateway_mcp::McpConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mcp: McpConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        self.mcp
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.storage.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command-line arguments. Every flag overrides the matching file setting.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mcp-gateway", version, about = "MCP tool registry and invocation router")]
pub struct CliArgs {
    /// YAML configuration file
    #[arg(short, long, env = "MCP_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "MCP_GATEWAY_HOST")]
    pub host: Option<String>,

    #[arg(short, long, env = "MCP_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Registry storage backend: memory, file or redis
    #[arg(long, env = "MCP_GATEWAY_STORAGE")]
    pub storage_backend: Option<StorageBackend>,

    /// Snapshot file for the file backend
    #[arg(long, env = "MCP_GATEWAY_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    #[arg(long, env = "MCP_GATEWAY_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Upper bound for one tool invocation, in seconds
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    #[arg(long, env = "MCP_GATEWAY_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long)]
    pub log_json: bool,

    #[arg(long, env = "MCP_GATEWAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Load the configured file (or defaults), apply overrides and validate.
    pub fn load(&self) -> ConfigResult<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_file(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backend) = self.storage_backend {
            config.storage.backend = backend;
        }
        if let Some(path) = &self.storage_path {
            config.storage.path = Some(path.clone());
        }
        if let Some(url) = &self.redis_url {
            match &mut config.storage.redis {
                Some(redis) => redis.url = url.clone(),
                None => config.storage.redis = Some(RedisConfig::new(url.clone())),
            }
        }
        if let Some(secs) = self.call_timeout_secs {
            config.mcp.call_timeout_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = Some(dir.clone());
        }
    }
}
