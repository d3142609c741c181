use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Names a YAML file to load before environment overrides are applied.
pub const CONFIG_ENV: &str = "EVSERVE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub limits: LimitsConfig,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bytes requested from the socket per receive call
    pub recv_buffer: usize,
    /// Longest request line accepted before it is discarded
    pub max_request_line: usize,
    /// Longest request path accepted
    pub max_path: usize,
    /// Bytes read from a file per chunk while sending
    pub chunk_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Close a connection when a receive fails instead of waiting for the next event
    pub close_on_receive_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "[::]:8080".to_string(),
        }
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/www"),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            recv_buffer: 512,
            max_request_line: 8192,
            max_path: crate::http::parser::MAX_PATH,
            chunk_size: crate::static_files::transmitter::CHUNK_SIZE,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            close_on_receive_error: true,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `EVSERVE_CONFIG`, then the
    /// `LISTEN` and `DOCROOT` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        if let Ok(root) = std::env::var("DOCROOT") {
            cfg.static_files.root = PathBuf::from(root);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("recv_buffer", self.limits.recv_buffer),
            ("max_request_line", self.limits.max_request_line),
            ("max_path", self.limits.max_path),
            ("chunk_size", self.limits.chunk_size),
        ];

        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }

        Ok(())
    }
}
