//! Client configuration.
//!
//! Loaded from environment variables or a TOML file:
//! - `INTERCOM_APP_ID`, `INTERCOM_API_KEY` (required)
//! - `INTERCOM_ENDPOINT` (default `https://api.intercom.io/v1/`)
//! - `INTERCOM_DEBUG`, `INTERCOM_DELAYED` (default false)
//! - `INTERCOM_INCREMENT_MODE` (default true)
//! - `INTERCOM_DELAYED_LOG` (default `/tmp/intercom_delayed_commands`)
//!
//! The merge field sets come only from the file's `[merge]` table.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::Credentials;
use crate::error::ConfigError;
use crate::merge::MergePolicy;
use crate::queue::DEFAULT_LOG_PATH;

pub const DEFAULT_ENDPOINT: &str = "https://api.intercom.io/v1/";

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub app_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Log every outbound request and response status.
    #[serde(default)]
    pub debug: bool,
    /// Append write calls to the deferred log instead of sending them.
    #[serde(default)]
    pub delayed: bool,
    /// Add counter deltas to remote values instead of overwriting them.
    #[serde(default = "default_true")]
    pub increment_mode: bool,
    #[serde(default = "default_log_path")]
    pub delayed_log: PathBuf,
    #[serde(default)]
    pub merge: MergePolicy,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .field("delayed", &self.delayed)
            .field("increment_mode", &self.increment_mode)
            .field("delayed_log", &self.delayed_log)
            .field("merge", &self.merge)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            endpoint: default_endpoint(),
            debug: false,
            delayed: false,
            increment_mode: true,
            delayed_log: default_log_path(),
            merge: MergePolicy::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_delayed_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.delayed_log = path.into();
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.app_id.clone(), self.api_key.clone())
    }

    /// Load from the process environment.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Self::load_from_vars(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn load_from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        let flag = |name: &'static str, default: bool| match lookup(name) {
            None => Ok(default),
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidValue { var: name, value }),
        };

        let mut config = Self::new(required("INTERCOM_APP_ID")?, required("INTERCOM_API_KEY")?);
        if let Some(endpoint) = lookup("INTERCOM_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(path) = lookup("INTERCOM_DELAYED_LOG") {
            config.delayed_log = PathBuf::from(path);
        }
        config.debug = flag("INTERCOM_DEBUG", false)?;
        config.delayed = flag("INTERCOM_DELAYED", false)?;
        config.increment_mode = flag("INTERCOM_INCREMENT_MODE", true)?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
