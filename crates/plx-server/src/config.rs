//! Server configuration: TOML file + CLI overrides + environment.

use plx_core::BridgeResult;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the Perplexity API key.
pub const ENV_API_KEY: &str = "PERPLEXITY_API_KEY";

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub upstream: UpstreamSection,
}

/// `[upstream]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fallback credential; the environment variable wins when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}
fn default_model() -> String {
    "sonar".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Resolved server configuration (CLI overrides applied, credential read).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides and read the
    /// credential from the environment.
    pub fn load(
        config_path: Option<&Path>,
        cli_base_url: Option<&str>,
        cli_model: Option<&str>,
        cli_timeout_secs: Option<u64>,
    ) -> BridgeResult<Self> {
        // Load base config from file
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content).map_err(|e| {
                    plx_core::BridgeError::Other(format!("config parse error: {e}"))
                })?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile {
                    upstream: UpstreamSection::default(),
                }
            }
        } else {
            ConfigFile {
                upstream: UpstreamSection::default(),
            }
        };

        // Merge CLI overrides
        let base_url = cli_base_url
            .map(|s| s.to_string())
            .unwrap_or(file_config.upstream.base_url);
        let model = cli_model
            .map(|s| s.to_string())
            .unwrap_or(file_config.upstream.model);
        let timeout_secs = cli_timeout_secs.unwrap_or(file_config.upstream.timeout_secs);

        // Credential: environment wins over the config file. Read once here;
        // the bridge receives the resolved value and never consults the
        // environment itself.
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|k| !k.is_empty())
            .or(file_config.upstream.api_key);

        if api_key.is_none() {
            warn!(
                env = ENV_API_KEY,
                "no API key configured — tool calls will fail until one is provided"
            );
        }

        Ok(Self {
            base_url,
            model,
            timeout: Duration::from_secs(timeout_secs),
            api_key,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> std::path::PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(s.as_ref())
}
