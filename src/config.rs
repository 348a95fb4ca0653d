use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_DEVICE: &str = "/dev/cdrom";
pub const DEFAULT_CDDB_URL: &str = "http://gnudb.gnudb.org/~cddb/cddb.cgi";
pub const DEFAULT_CDDB_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be true or false, got {value:?}")]
    Bool { key: String, value: String },
    #[error("{key} must be a whole number of seconds, got {value:?}")]
    Seconds { key: String, value: String },
}

/// Application configuration
/// In debug builds: loads a .env file first, then reads the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Drive used when no device path is given
    pub default_device: PathBuf,
    /// CDDB-over-HTTP endpoint
    pub cddb_url: String,
    /// Whether to look up disc metadata at all
    pub cddb_enabled: bool,
    /// Upper bound on each lookup request
    pub cddb_timeout: Duration,
    /// Values for the CDDB `hello` handshake
    pub cddb_user: String,
    pub cddb_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_device: PathBuf::from(DEFAULT_DEVICE),
            cddb_url: DEFAULT_CDDB_URL.to_string(),
            cddb_enabled: true,
            cddb_timeout: Duration::from_secs(DEFAULT_CDDB_TIMEOUT_SECS),
            cddb_user: "cdda".to_string(),
            cddb_host: "localhost".to_string(),
        }
    }
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Config: Dev mode activated - loaded .env file");
            } else {
                debug!("Config: No .env file found");
            }
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(device) = lookup("CDDA_DEFAULT_DEVICE").filter(|v| !v.trim().is_empty()) {
            config.default_device = PathBuf::from(device);
        }
        if let Some(url) = lookup("CDDA_CDDB_URL").filter(|v| !v.trim().is_empty()) {
            config.cddb_url = url;
        }
        if let Some(value) = lookup("CDDA_CDDB_ENABLED") {
            config.cddb_enabled = parse_bool("CDDA_CDDB_ENABLED", &value)?;
        }
        if let Some(value) = lookup("CDDA_CDDB_TIMEOUT_SECS") {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::Seconds {
                    key: "CDDA_CDDB_TIMEOUT_SECS".to_string(),
                    value: value.clone(),
                })?;
            config.cddb_timeout = Duration::from_secs(secs);
        }
        if let Some(user) = lookup("CDDA_CDDB_USER").filter(|v| !v.trim().is_empty()) {
            config.cddb_user = user;
        }
        if let Some(host) = lookup("CDDA_CDDB_HOST").filter(|v| !v.trim().is_empty()) {
            config.cddb_host = host;
        }

        debug!("Config: {:?}", config);
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
