//! Server configuration, loadable from YAML and overridable from the CLI.
//!
//! ```yaml
//! host: 127.0.0.1
//! port: 9000
//! contracts: [contracts/items.yaml]
//! stubs: [stubs/]
//! strict: true
//! max_external_commands: 8
//! log_format: json
//! ```

use crate::engine::{MatchMode, DEFAULT_MAX_EXTERNAL_COMMANDS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Contract files, merged into one type registry.
    #[serde(default)]
    pub contracts: Vec<PathBuf>,
    /// Stub files or directories searched recursively for `*.json`.
    #[serde(default)]
    pub stubs: Vec<PathBuf>,
    /// Answer unmatched requests with 400 instead of generating.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_max_external_commands")]
    pub max_external_commands: usize,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_max_external_commands() -> usize {
    DEFAULT_MAX_EXTERNAL_COMMANDS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            contracts: Vec::new(),
            stubs: Vec::new(),
            strict: false,
            max_external_commands: default_max_external_commands(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.host.trim().is_empty() {
            anyhow::bail!("host must not be empty");
        }
        if self.max_external_commands == 0 {
            anyhow::bail!("max_external_commands must be at least 1");
        }
        for contract in &self.contracts {
            if !contract.is_file() {
                anyhow::bail!("Contract file not found: {}", contract.display());
            }
        }
        for stubs in &self.stubs {
            if !stubs.exists() {
                anyhow::bail!("Stub path not found: {}", stubs.display());
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> MatchMode {
        if self.strict {
            MatchMode::Strict
        } else {
            MatchMode::Lenient
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
