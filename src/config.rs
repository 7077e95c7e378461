//! Configuration management for askpipe.
//!
//! Configuration is loaded from `~/.config/askpipe/config.toml` when present.
//! `OLLAMA_HOST` overrides the server address from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the server address.
pub const HOST_ENV: &str = "OLLAMA_HOST";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama server address (default: http://localhost:11434).
    #[serde(default = "default_host")]
    pub host: String,
    /// Model name (default: qwen2.5-coder).
    #[serde(default = "default_model")]
    pub model: String,
    /// Interactive display preferences.
    #[serde(default)]
    pub ui: UiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            ui: UiConfig::default(),
        }
    }
}

/// Interactive display preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Use the plain line-mode terminal instead of the full-screen view.
    #[serde(default)]
    pub plain: bool,
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5-coder".to_string()
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("askpipe"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file used while the full-screen UI owns the terminal.
    pub fn log_path() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|p| p.join("askpipe").join("askpipe.log"))
            .context("Could not determine cache directory")
    }

    /// Load configuration from file, using defaults if not found, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_host_override(std::env::var(HOST_ENV).ok());
        Ok(config)
    }

    /// Replace the host when a non-empty override is given.
    pub fn apply_host_override(&mut self, host: Option<String>) {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.host = host;
        }
    }

    /// Base address with a scheme and without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        }
    }

    /// Full URL of the generate endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }
}
