use crate::error::{LmsError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/lms.db".to_string(),
        }
    }
}

/// Which invoice backend checkout talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Gateway,
    Offline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub mode: PaymentMode,
    pub api_base_url: String,
    pub secret_key: String,
    pub callback_token: String,
    pub success_redirect_url: Option<String>,
    pub currency: String,
    pub invoice_duration_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::Offline,
            api_base_url: "https://api.xendit.co".to_string(),
            secret_key: String::new(),
            callback_token: String::new(),
            success_redirect_url: None,
            currency: "IDR".to_string(),
            invoice_duration_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_name: "lms.log".to_string(),
            default_filter: "lms_server=info,tower_http=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "127.0.0.1:9898".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply `LMS_*` environment overrides.
    /// A missing file yields the defaults. Call [`Config::validate`] before serving.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                LmsError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml_str(&content)?
        } else {
            debug!("Config file {} not found, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var("LMS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("LMS_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| LmsError::Config(format!("LMS_PORT is not a valid port: {port}")))?;
        }
        if let Ok(path) = env::var("LMS_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(mode) = env::var("LMS_PAYMENT_MODE") {
            self.payment.mode = match mode.to_lowercase().as_str() {
                "gateway" => PaymentMode::Gateway,
                "offline" => PaymentMode::Offline,
                other => {
                    return Err(LmsError::Config(format!(
                        "LMS_PAYMENT_MODE must be 'gateway' or 'offline', got '{other}'"
                    )))
                }
            };
        }
        if let Ok(key) = env::var("LMS_PAYMENT_SECRET_KEY") {
            self.payment.secret_key = key;
        }
        if let Ok(token) = env::var("LMS_PAYMENT_CALLBACK_TOKEN") {
            self.payment.callback_token = token;
        }
        if let Ok(addr) = env::var("LMS_METRICS_ADDR") {
            self.metrics.enabled = true;
            self.metrics.addr = addr;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(LmsError::Config("server.port must be non-zero".to_string()));
        }
        if self.payment.callback_token.trim().is_empty() {
            return Err(LmsError::Config(
                "payment.callback_token must be set (LMS_PAYMENT_CALLBACK_TOKEN)".to_string(),
            ));
        }
        if self.payment.mode == PaymentMode::Gateway && self.payment.secret_key.trim().is_empty() {
            return Err(LmsError::Config(
                "payment.secret_key is required in gateway mode (LMS_PAYMENT_SECRET_KEY)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
