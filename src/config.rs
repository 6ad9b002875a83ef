//! Runtime settings.
//!
//! Built from defaults, then an optional YAML file, then environment
//! variables (`PRODSCOPE_*`), each layer overriding the previous one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PYTHON: &str = "PRODSCOPE_PYTHON";
pub const ENV_SCRIPTS_DIR: &str = "PRODSCOPE_SCRIPTS_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "PRODSCOPE_CACHE_TTL_SECS";
pub const ENV_TIMEOUT_SECS: &str = "PRODSCOPE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value '{value}' for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Interpreter that runs the worker scripts
    pub python: String,
    pub scripts_dir: PathBuf,
    pub product_script: String,
    pub reviews_script: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: Option<usize>,
    pub review_excerpt: usize,
    pub accepted_hosts: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            scripts_dir: PathBuf::from("scripts"),
            product_script: "product.py".to_string(),
            reviews_script: "reviews.py".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 2000,
            cache_ttl_secs: 30 * 60,
            cache_max_entries: None,
            review_excerpt: 10,
            accepted_hosts: vec!["amazon.".to_string(), "amzn.".to_string()],
        }
    }
}

impl Settings {
    /// Loads settings from an optional YAML file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Applies `PRODSCOPE_*` overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(python) = lookup(ENV_PYTHON) {
            self.python = python;
        }
        if let Some(dir) = lookup(ENV_SCRIPTS_DIR) {
            self.scripts_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup(ENV_CACHE_TTL_SECS) {
            self.cache_ttl_secs = parse_env(ENV_CACHE_TTL_SECS, &ttl)?;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_env(ENV_TIMEOUT_SECS, &timeout)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache_ttl_secs must be positive".into()));
        }
        if self.accepted_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "accepted_hosts needs at least one entry".into(),
            ));
        }
        Ok(())
    }

    pub fn product_script_path(&self) -> PathBuf {
        self.scripts_dir.join(&self.product_script)
    }

    pub fn reviews_script_path(&self) -> PathBuf {
        self.scripts_dir.join(&self.reviews_script)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_env(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
