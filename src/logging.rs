//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the configured level. Console output is always on;
//! a daily rolling file is added when a log directory is configured.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "mcp-gateway.log";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `gateway_mcp=debug,info`
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Directory for daily rolling log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.level)?),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = config.filter()?;

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };
    let mut layers = vec![console];

    let mut guard = None;
    if let Some(dir) = &config.dir {
        std::fs::create_dir_all(dir)?;
        let (writer, file_guard) = tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
        let file = fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(if config.json {
            file.json().boxed()
        } else {
            file.boxed()
        });
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        json = config.json,
        dir = ?config.dir,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
        assert!(config.dir.is_none());
    }

    #[test]
    fn test_yaml_defaults() {
        let config: LoggingConfig = serde_yaml::from_str("json: true").unwrap();
        assert!(config.json);
        assert_eq!(config.level, "info");
    }
}
