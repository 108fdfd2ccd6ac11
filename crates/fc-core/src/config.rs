use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fc_protocol::ExchangeOptions;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Scheme, host and port of the chat server.
    pub base_url: String,
    /// Path of the streaming chat endpoint.
    pub stream_path: String,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            stream_path: "/api/chat/stream".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Full URL of the streaming endpoint.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Model family the server should answer with.
    pub model_type: String,
    pub system_prompt: String,
    /// Tool service URL selected at startup. None means the server default.
    pub service: Option<String>,
    /// Upper bound on one whole exchange. None waits as long as the server streams.
    pub exchange_timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model_type: "deepseek".to_string(),
            system_prompt: String::new(),
            service: None,
            exchange_timeout_secs: None,
        }
    }
}

impl ChatConfig {
    /// Options for one exchange routed through `service`.
    pub fn exchange_options(&self, service: Option<&str>) -> ExchangeOptions {
        ExchangeOptions {
            model_type: non_empty(&self.model_type),
            system_prompt: non_empty(&self.system_prompt),
            mcp_url: service.and_then(non_empty),
        }
    }

    pub fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Window in which redraw requests are merged into one redraw.
    pub redraw_window_ms: u64,
    /// Text the server writes into chunks when it reports a tool result.
    pub tool_markers: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            redraw_window_ms: 30,
            tool_markers: vec![
                "✅ 工具".to_string(),
                "❌ 工具".to_string(),
                "⚠️ 工具".to_string(),
            ],
        }
    }
}

impl UiConfig {
    pub fn redraw_window(&self) -> Duration {
        Duration::from_millis(self.redraw_window_ms)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when neither FEEDCHAT_LOG nor RUST_LOG is set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default() -> Self {
        Self::load(&config_path()).unwrap_or_else(|e| {
            eprintln!("warning: {e}");
            Config::default()
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("feedchat").join("config.toml")
}
