use proto::{ConfigError, DEFAULT_ERROR_NOTICE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_ENDPOINT_URL: &str = "https://test-stream-python.onrender.com/stream";

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Streaming endpoint configuration.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Conversation behaviour.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Where and how the answer stream is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Full URL of the streaming GET endpoint.
    pub url: String,
    /// Static API key; empty means no key header is sent.
    pub api_key: String,
    /// Header that carries `api_key`.
    pub api_key_header: String,
    /// `Accept` header value.
    pub accept: String,
    /// Query parameter that carries the prompt.
    pub prompt_param: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT_URL.to_string(),
            api_key: String::new(),
            api_key_header: "x-api-key".to_string(),
            accept: "text/event-stream".to_string(),
            prompt_param: "prompt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Text of the AI message appended when a send fails.
    pub error_notice: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
        }
    }
}

impl Config {
    /// Load config from file, with env var overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join("config.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = home_dir()?.join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        // Environment variable overrides
        if let Ok(url) = std::env::var("STREAMCHAT_ENDPOINT") {
            config.endpoint.url = url;
        }
        if let Ok(key) = std::env::var("STREAMCHAT_API_KEY") {
            config.endpoint.api_key = key;
        }

        debug!(
            endpoint = %config.endpoint.url,
            has_api_key = !config.endpoint.api_key.is_empty(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Rejects values the stream client cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.endpoint.url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.url".to_string(),
                reason: format!("expected an http(s) URL, got '{url}'"),
            });
        }
        if self.endpoint.prompt_param.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.prompt_param".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// `~/.streamchat`, when `HOME` is set.
pub fn home_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".streamchat"))
}
