//! Configuration management
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `QUIZBANK__SECTION__KEY` environment variables.

use crate::error::{ErrorContext, QuizbankError, QuizbankResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizbankConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
    /// JSON file with the navigation menu
    pub menu_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every request
    pub request_timeout_secs: u64,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_grace_secs: u64,
    pub enable_swagger: bool,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Token signing and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// A refresh inside this margin before expiry rotates the refresh token too
    pub refresh_sliding_window_secs: i64,
}

/// Account seeded into an empty database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for QuizbankConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            bootstrap: BootstrapConfig::default(),
            logging: LoggingConfig::default(),
            menu_file: Some("menu.json".to_string()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 15,
            shutdown_grace_secs: 15,
            enable_swagger: false,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:quizbank.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: 60 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            refresh_sliding_window_secs: 24 * 60 * 60,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AuthConfig {
    pub fn has_secret(&self) -> bool {
        !self.jwt_secret.trim().is_empty()
    }
}

impl QuizbankConfig {
    /// Defaults overlaid with an optional file and the environment
    pub fn load(path: Option<&Path>) -> QuizbankResult<Self> {
        let defaults = ::config::Config::try_from(&QuizbankConfig::default())
            .map_err(|e| config_load_error("defaults", e))?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("QUIZBANK")
                .separator("__")
                .try_parsing(true),
        );

        let config: QuizbankConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| config_load_error("build", e))?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> QuizbankResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| QuizbankError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: QuizbankConfig = toml::from_str(&content).map_err(|e| QuizbankError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> QuizbankResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| QuizbankError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| QuizbankError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> QuizbankResult<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs must be greater than 0"));
        }

        if self.auth.access_token_ttl_secs <= 0 || self.auth.refresh_token_ttl_secs <= 0 {
            return Err(invalid("token lifetimes must be positive"));
        }

        if self.auth.refresh_sliding_window_secs < 0
            || self.auth.refresh_sliding_window_secs >= self.auth.refresh_token_ttl_secs
        {
            return Err(invalid(
                "auth.refresh_sliding_window_secs must be shorter than the refresh token lifetime",
            ));
        }

        if self.bootstrap.admin_username.trim().is_empty() {
            return Err(invalid("bootstrap.admin_username must not be empty"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> QuizbankError {
    QuizbankError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config").with_operation("validate"),
    }
}

fn config_load_error(operation: &str, e: ::config::ConfigError) -> QuizbankError {
    QuizbankError::Config {
        message: format!("Failed to load configuration: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config")
            .with_operation(operation)
            .with_suggestion("Check QUIZBANK__* environment variables and the config file"),
    }
}
