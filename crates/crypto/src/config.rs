use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Client configuration loaded from keyproof.toml with env var overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the key directory, e.g. "https://keys.example.org"
    #[serde(default = "default_directory_url")]
    pub directory_url: String,
    /// Whole-request deadline for directory lookups, in seconds. Default: 15
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// TCP connect deadline, in seconds. Default: 5
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Encrypted trust database. Default: "keyproof.db"
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Tracing filter used when `RUST_LOG` is unset. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_directory_url() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_database_path() -> PathBuf {
    PathBuf::from("keyproof.db")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_url: default_directory_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            database_path: default_database_path(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `keyproof.toml` in the CWD, or the path in
    /// `KEYPROOF_CONFIG`, then apply env var overrides.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path =
            std::env::var("KEYPROOF_CONFIG").unwrap_or_else(|_| "keyproof.toml".to_string());
        let contents = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config: ClientConfig = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Returns an error if an env var is set but unparseable
    /// (e.g. KEYPROOF_REQUEST_TIMEOUT_SECS=soon).
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(val) = std::env::var("KEYPROOF_DIRECTORY_URL") {
            self.directory_url = val;
        }
        if let Ok(val) = std::env::var("KEYPROOF_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = val
                .parse()
                .map_err(|_| format!("invalid KEYPROOF_REQUEST_TIMEOUT_SECS value: {val}"))?;
        }
        if let Ok(val) = std::env::var("KEYPROOF_DATABASE_PATH") {
            self.database_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("KEYPROOF_LOG_LEVEL") {
            self.log_level = val;
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".into());
        }
        Ok(())
    }

    /// `RUST_LOG` if set, otherwise `log_level`.
    pub fn env_filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error>> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.log_level).map_err(|e| -> Box<dyn std::error::Error> {
                format!("invalid log_level {:?}: {e}", self.log_level).into()
            }),
        }
    }

    /// Install the global fmt subscriber for a client process.
    ///
    /// Fails if `log_level` does not parse or a subscriber is already set.
    pub fn init_tracing(&self) -> Result<(), Box<dyn std::error::Error>> {
        tracing_subscriber::fmt()
            .with_env_filter(self.env_filter()?)
            .try_init()
            .map_err(|e| -> Box<dyn std::error::Error> { e })
    }
}
