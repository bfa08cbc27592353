use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gitlab::{ClientOptions, HookSettings};

/// Configuration file structure for the bridge.
///
/// Loaded from an explicit path, the working directory, or the user config directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// GitLab connection settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// How GitLab reaches this process
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Items requested per page on list endpoints
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Retries on rate limiting, server errors and connection failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Per-request transport timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Externally reachable base URL; webhooks target `<base-url>/events`
    pub base_url: Option<String>,

    /// Secret GitLab echoes in `X-Gitlab-Token` on every delivery
    pub hook_secret_token: Option<String>,

    #[serde(default)]
    pub enable_ssl_verification: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

impl GitLabConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            page_size: self.page_size.clamp(1, 100),
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ServerConfig {
    pub fn hook_settings(&self) -> HookSettings {
        HookSettings {
            secret_token: self.hook_secret_token.clone(),
            enable_ssl_verification: self.enable_ssl_verification,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ci-bridge.toml
    /// 3. ./ci-bridge.json
    /// 4. ./ci-bridge.yaml
    /// 5. ./ci-bridge.yml
    /// 6. `<config dir>/gitlab-ci-bridge/config.toml`
    ///
    /// Returns default configuration if no file is found. An explicit path that
    /// does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["ci-bridge.toml", "ci-bridge.json", "ci-bridge.yaml", "ci-bridge.yml"]
            .into_iter()
            .map(PathBuf::from)
            .chain(user_config_file());

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gitlab-ci-bridge").join("config.toml"))
}
