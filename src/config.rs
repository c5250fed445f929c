use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::ports::{DEFAULT_BASE_PORTS, DEFAULT_SEARCH_WINDOW};
use crate::utils::paths::get_config_path;

/// Port allocation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Ports held by the base stack (prometheus, grafana, pushgateway, api)
    #[serde(default = "default_reserved_ports")]
    pub reserved: Vec<u16>,

    /// How many ports past a plugin's hint are searched
    #[serde(default = "default_search_window")]
    pub search_window: u16,
}

fn default_reserved_ports() -> Vec<u16> {
    DEFAULT_BASE_PORTS.to_vec()
}

fn default_search_window() -> u16 {
    DEFAULT_SEARCH_WINDOW
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            reserved: default_reserved_ports(),
            search_window: default_search_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Installation directory used when --install-dir is not given
    #[serde(default = "default_install_dir")]
    pub default_dir: PathBuf,

    /// Refuse to install unless the base stack compose file exists
    #[serde(default = "default_require_base_stack")]
    pub require_base_stack: bool,
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("secure-monitoring-stack")
}

fn default_require_base_stack() -> bool {
    true
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            default_dir: default_install_dir(),
            require_base_stack: default_require_base_stack(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Alternate catalog document; the built-in catalog is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.ports.search_window == 0 {
            return Err("ports.search_window must be at least 1".to_string());
        }
        if self.ports.reserved.contains(&0) {
            return Err("ports.reserved cannot contain port 0".to_string());
        }
        if self.install.default_dir.as_os_str().is_empty() {
            return Err("install.default_dir cannot be empty".to_string());
        }
        Ok(())
    }
}
