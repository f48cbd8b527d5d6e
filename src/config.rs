//! Backend and shortener configuration.
//!
//! Configuration can be loaded from:
//! 1. a TOML file
//! 2. environment variables (with the `TOOLFLOW_` prefix)
//!
//! Environment variables override the file. Missing sections and keys fall back to
//! the defaults below.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [backend]
//! endpoint = "https://generativelanguage.googleapis.com"
//! model = "gemini-2.5-flash"
//! media_model = "gemini-2.5-flash-image"
//! api_key_env = "GEMINI_API_KEY"
//! timeout_ms = 60000
//!
//! [shortener]
//! endpoint = "https://tinyurl.com/api-create.php"
//! query_param = "url"
//! timeout_ms = 10000
//! response_check = "strict"
//! ```
//!
//! The API key itself never lives in the file; `api_key_env` names the variable
//! that holds it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invoker::ResponseCheck;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generative backend settings.
    pub backend: BackendConfig,
    /// URL-shortening upstream settings.
    pub shortener: ShortenerConfig,
}

/// Generative backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the `generateContent` API.
    pub endpoint: String,
    /// Model for structured (JSON) output.
    pub model: String,
    /// Model for media output.
    pub media_model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            media_model: "gemini-2.5-flash-image".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// URL-shortening upstream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortenerConfig {
    /// Upstream endpoint.
    pub endpoint: String,
    /// Query parameter carrying the long URL.
    pub query_param: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// How a 2xx body is judged.
    pub response_check: ResponseCheck,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://tinyurl.com/api-create.php".to_string(),
            query_param: "url".to_string(),
            timeout_ms: 10_000,
            response_check: ResponseCheck::Strict,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML file and overlay environment variables.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content. Environment variables are not consulted.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay `TOOLFLOW_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay values from `lookup`, keyed by environment variable name.
    ///
    /// Unparseable numeric or enum values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("TOOLFLOW_BACKEND_ENDPOINT") {
            self.backend.endpoint = endpoint;
        }
        if let Some(model) = lookup("TOOLFLOW_BACKEND_MODEL") {
            self.backend.model = model;
        }
        if let Some(model) = lookup("TOOLFLOW_BACKEND_MEDIA_MODEL") {
            self.backend.media_model = model;
        }
        if let Some(timeout) = lookup("TOOLFLOW_BACKEND_TIMEOUT_MS") {
            override_parsed("TOOLFLOW_BACKEND_TIMEOUT_MS", &timeout, &mut self.backend.timeout_ms);
        }
        if let Some(endpoint) = lookup("TOOLFLOW_SHORTENER_ENDPOINT") {
            self.shortener.endpoint = endpoint;
        }
        if let Some(timeout) = lookup("TOOLFLOW_SHORTENER_TIMEOUT_MS") {
            override_parsed(
                "TOOLFLOW_SHORTENER_TIMEOUT_MS",
                &timeout,
                &mut self.shortener.timeout_ms,
            );
        }
        if let Some(check) = lookup("TOOLFLOW_SHORTENER_RESPONSE_CHECK") {
            override_parsed(
                "TOOLFLOW_SHORTENER_RESPONSE_CHECK",
                &check,
                &mut self.shortener.response_check,
            );
        }
    }

    /// Reject unusable endpoints and zero timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_endpoint("backend.endpoint", &self.backend.endpoint)?;
        check_endpoint("shortener.endpoint", &self.shortener.endpoint)?;
        if self.backend.model.trim().is_empty() || self.backend.media_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.model and backend.media_model must be set".to_string(),
            ));
        }
        if self.shortener.query_param.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "shortener.query_param must be set".to_string(),
            ));
        }
        if self.backend.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backend.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.shortener.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "shortener.timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_parsed<T: std::str::FromStr>(name: &str, raw: &str, target: &mut T) {
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(variable = name, value = raw, "ignoring unparseable override"),
    }
}

fn check_endpoint(key: &str, endpoint: &str) -> Result<(), ConfigError> {
    match url::Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(ConfigError::Invalid(format!(
            "{key} must be an http(s) URL, got scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(ConfigError::Invalid(format!("{key} is not a valid URL: {e}"))),
    }
}
