use serde::Deserialize;

/// Directory configuration loaded from config.toml with env var overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Host to bind to. Default: "127.0.0.1"
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on. Default: 3000
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Default: ["http://localhost:1420"]
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Tracing log level. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Largest accepted request body. Default: 16 KiB
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:1420".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_body_bytes() -> usize {
    16 * 1024
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            log_level: default_log_level(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl DirectoryConfig {
    /// Load configuration from TOML file with environment variable overrides.
    ///
    /// Reads `config.toml` from CWD (or path in `CONFIG_PATH` env var). A
    /// missing file means all defaults.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config: DirectoryConfig = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the config.
    ///
    /// Returns an error if an env var is set but has an invalid format
    /// (e.g., PORT=abc).
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(val) = std::env::var("HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("PORT") {
            self.port = val
                .parse()
                .map_err(|_| format!("invalid PORT value: {val}"))?;
        }
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn loads_from_valid_toml_string() {
        let toml = r#"
            host = "0.0.0.0"
            port = 8080
            cors_origins = ["http://localhost:3000"]
            log_level = "debug"
            max_body_bytes = 4096
        "#;
        let config = DirectoryConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_body_bytes, 4096);
    }

    #[test]
    #[serial]
    fn applies_env_var_overrides() {
        std::env::set_var("PORT", "4040");
        std::env::set_var("LOG_LEVEL", "trace");
        let config = DirectoryConfig::from_toml_str("port = 8080");
        std::env::remove_var("PORT");
        std::env::remove_var("LOG_LEVEL");

        let config = config.unwrap();
        assert_eq!(config.port, 4040);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    #[serial]
    fn invalid_port_override_is_an_error() {
        std::env::set_var("PORT", "abc");
        let result = DirectoryConfig::from_toml_str("");
        std::env::remove_var("PORT");
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn has_correct_defaults_for_omitted_fields() {
        let config = DirectoryConfig::from_toml_str("").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origins, vec!["http://localhost:1420"]);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_body_bytes, 16 * 1024);
    }

    #[test]
    #[serial]
    fn fails_on_malformed_toml() {
        assert!(DirectoryConfig::from_toml_str("this is not valid = [[[toml").is_err());
    }
}
