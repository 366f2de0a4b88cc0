//! Configuration system for Topograph.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> CLI flags. The user-level file lives at
//! `~/.config/topograph/config.toml`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopographConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub refresh: RefreshConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind. A bare `:port` binds every interface.
    pub listen_address: String,
    /// Deadline for a single HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };
        address.parse().map_err(|e| ConfigError::Invalid {
            message: format!("listen address '{}': {e}", self.listen_address),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// InfluxDB connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Accept invalid TLS certificates from the store.
    pub skip_tls_verify: bool,
    pub query_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://influxdb:8086".to_string(),
            username: "aporeto".to_string(),
            password: "aporeto".to_string(),
            database: "flowDB".to_string(),
            skip_tls_verify: true,
            query_timeout_secs: 20,
        }
    }
}

impl StoreConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Refresh cycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 20 }
    }
}

impl RefreshConfig {
    /// Time between refresh cycles, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected human or json")),
        }
    }
}

impl TopographConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "server.request_timeout_secs must be greater than zero".into(),
            });
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "refresh.interval_secs must be greater than zero".into(),
            });
        }
        if self.store.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "store.query_timeout_secs must be greater than zero".into(),
            });
        }
        if self.store.database.is_empty() {
            return Err(ConfigError::Invalid {
                message: "store.database must not be empty".into(),
            });
        }
        match reqwest::Url::parse(&self.store.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            Ok(url) => Err(ConfigError::Invalid {
                message: format!("store.url has unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => Err(ConfigError::Invalid {
                message: format!("store.url '{}': {e}", self.store.url),
            }),
        }
    }

    /// Copy of the configuration with the store password masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.store.password.is_empty() {
            config.store.password = "********".to_string();
        }
        config
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Values supplied on the command line. Each `Some` wins over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen_address: Option<String>,
    pub influx_url: Option<String>,
    pub influx_username: Option<String>,
    pub influx_password: Option<String>,
    pub influx_database: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub interval_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    fn merge_into(&self, mut figment: Figment) -> Figment {
        if let Some(v) = &self.listen_address {
            figment = figment.merge(Serialized::default("server.listen_address", v));
        }
        if let Some(v) = &self.influx_url {
            figment = figment.merge(Serialized::default("store.url", v));
        }
        if let Some(v) = &self.influx_username {
            figment = figment.merge(Serialized::default("store.username", v));
        }
        if let Some(v) = &self.influx_password {
            figment = figment.merge(Serialized::default("store.password", v));
        }
        if let Some(v) = &self.influx_database {
            figment = figment.merge(Serialized::default("store.database", v));
        }
        if let Some(v) = self.skip_tls_verify {
            figment = figment.merge(Serialized::default("store.skip_tls_verify", v));
        }
        if let Some(v) = self.interval_secs {
            figment = figment.merge(Serialized::default("refresh.interval_secs", v));
        }
        if let Some(v) = &self.log_level {
            figment = figment.merge(Serialized::default("logging.level", v));
        }
        if let Some(v) = self.log_format {
            figment = figment.merge(Serialized::default("logging.format", v));
        }
        figment
    }
}

/// Load configuration from all layers.
pub fn load_config(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<TopographConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(TopographConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("io", "topograph", "topograph") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Explicit config file
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (TOPOGRAPH_STORE__URL, TOPOGRAPH_REFRESH__INTERVAL_SECS, etc.)
    figment = figment.merge(Env::prefixed("TOPOGRAPH_").split("__"));

    overrides.merge_into(figment).extract().map_err(Box::new)
}
