use crate::errors::{Result, TerminalError};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file error: {message}")]
    FileError { message: String },
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

pub struct Config {
    settings: config::Config,
}

impl Config {
    fn from_file(filepath: &str, format: config::FileFormat) -> std::result::Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(filepath).format(format))
            .build()
            .map(|settings| {
                info!("loaded configuration from {}", filepath);
                Config { settings }
            })
            .map_err(|e| ConfigError::FileError {
                message: e.to_string(),
            })
    }

    pub fn from_json(filepath: &str) -> std::result::Result<Self, ConfigError> {
        Self::from_file(filepath, config::FileFormat::Json)
    }

    pub fn from_yaml(filepath: &str) -> std::result::Result<Self, ConfigError> {
        Self::from_file(filepath, config::FileFormat::Yaml)
    }

    pub fn from_toml(filepath: &str) -> std::result::Result<Self, ConfigError> {
        Self::from_file(filepath, config::FileFormat::Toml)
    }

    pub fn get<'de, T: Deserialize<'de>>(&self, key: &str) -> std::result::Result<T, ConfigError> {
        self.settings
            .get::<T>(key)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
    }
}

fn default_connect_timeout_milli_secs() -> u64 {
    10000
}

fn default_request_timeout_milli_secs() -> u64 {
    60000
}

fn default_heartbeat_interval_milli_secs() -> u64 {
    30000
}

fn default_reconnect_interval_milli_secs() -> u64 {
    1000
}

fn default_send_buf_size() -> usize {
    1024
}

fn default_equity_recompute_interval() -> u32 {
    100
}

/// Settings of the streaming transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    // forwarded as the auth-token query parameter
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_connect_timeout_milli_secs")]
    pub connect_timeout_milli_secs: u64,
    #[serde(default = "default_request_timeout_milli_secs")]
    pub request_timeout_milli_secs: u64,
    #[serde(default = "default_heartbeat_interval_milli_secs")]
    pub heartbeat_interval_milli_secs: u64,
    #[serde(default = "default_reconnect_interval_milli_secs")]
    pub reconnect_interval_milli_secs: u64,
    #[serde(default = "default_send_buf_size")]
    pub send_buf_size: usize,
}

impl ClientConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            token: None,
            connect_timeout_milli_secs: default_connect_timeout_milli_secs(),
            request_timeout_milli_secs: default_request_timeout_milli_secs(),
            heartbeat_interval_milli_secs: default_heartbeat_interval_milli_secs(),
            reconnect_interval_milli_secs: default_reconnect_interval_milli_secs(),
            send_buf_size: default_send_buf_size(),
        }
    }

    pub fn from_config(config: &Config, key: &str) -> Result<Self> {
        let client_config: ClientConfig = config
            .get(key)
            .map_err(|e| TerminalError::config(format!("get {} err: {}", key, e)))?;
        client_config.validate()?;
        Ok(client_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_milli_secs == 0 {
            return Err(TerminalError::config("connect_timeout_milli_secs must be > 0"));
        }
        if self.request_timeout_milli_secs == 0 {
            return Err(TerminalError::config("request_timeout_milli_secs must be > 0"));
        }
        if self.heartbeat_interval_milli_secs == 0 {
            return Err(TerminalError::config("heartbeat_interval_milli_secs must be > 0"));
        }
        // a zero interval would turn the reconnect loop into a hot loop
        if self.reconnect_interval_milli_secs == 0 {
            return Err(TerminalError::config("reconnect_interval_milli_secs must be > 0"));
        }
        if self.send_buf_size == 0 {
            return Err(TerminalError::config("send_buf_size must be > 0"));
        }
        self.socket_url().map(|_| ())
    }

    /// Socket URL with the token attached.
    pub fn socket_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| TerminalError::config(format!("invalid url {}: {}", self.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TerminalError::config(format!(
                "unsupported url scheme: {}",
                url.scheme()
            )));
        }
        if let Some(token) = self.token.as_ref() {
            url.query_pairs_mut().append_pair("auth-token", token);
        }
        Ok(url.to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_milli_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_milli_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_milli_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_milli_secs)
    }
}

/// Settings of the local terminal state replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalStateConfig {
    /// Incremental equity updates allowed between two full recomputes.
    #[serde(default = "default_equity_recompute_interval")]
    pub equity_recompute_interval: u32,
}

impl Default for TerminalStateConfig {
    fn default() -> Self {
        Self {
            equity_recompute_interval: default_equity_recompute_interval(),
        }
    }
}

impl TerminalStateConfig {
    pub fn from_config(config: &Config, key: &str) -> Result<Self> {
        let state_config: TerminalStateConfig = config
            .get(key)
            .map_err(|e| TerminalError::config(format!("get {} err: {}", key, e)))?;
        Ok(state_config)
    }
}
