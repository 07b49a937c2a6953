//! Configuration types for logtap.
//!
//! [`Config::load`] reads `~/.config/logtap/config.toml`, creating it with
//! hardcoded defaults if it does not yet exist, then applies `LOGTAP_*`
//! environment overrides (`LOGTAP_REMOTE__PAGE_SIZE=50`). [`Config::defaults`]
//! returns the same defaults without touching the filesystem (useful in tests).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[stream]
poll_interval_ms = 500
channel_capacity = 1

[remote]
endpoint            = "https://logging.googleapis.com"
page_size           = 100
oauth_client_id     = ""
oauth_client_secret = ""
auth_uri            = "https://accounts.google.com/o/oauth2/auth"
token_uri           = "https://oauth2.googleapis.com/token"
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level configuration, loaded from `~/.config/logtap/config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// `[stream]` section of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// How often the file reader re-checks the watched path.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the record channel handed to the consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 { 500 }
fn default_channel_capacity() -> usize { 1 }

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Channel capacity, never below one.
    pub fn capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// `[remote]` section of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the logging API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub oauth_client_id: String,
    #[serde(default)]
    pub oauth_client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Where browser-acquired credentials are stored.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

fn default_endpoint() -> String { "https://logging.googleapis.com".to_string() }
fn default_page_size() -> u32 { 100 }
fn default_auth_uri() -> String { "https://accounts.google.com/o/oauth2/auth".to_string() }
fn default_token_uri() -> String { "https://oauth2.googleapis.com/token".to_string() }

impl RemoteConfig {
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_file
            .clone()
            .unwrap_or_else(|| config_dir().join("credentials.json"))
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            page_size: default_page_size(),
            oauth_client_id: String::new(),
            oauth_client_secret: String::new(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            credentials_file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from `~/.config/logtap/config.toml`, layered on top of the built-in
    /// defaults. Creates the file with defaults if it does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_dir().join("config.toml");

        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, DEFAULT_CONFIG.trim_start())?;
        }

        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix("LOGTAP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/logtap`, falling back to `~/.config/logtap`.
pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("logtap")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
