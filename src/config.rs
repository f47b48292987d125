//! Startup-time configuration, loaded once from the environment.
//!
//! Nothing here is on the hot path; every value is read and validated
//! before the first request is served.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, Result};

/// Which ownership registry strategy the deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipStrategy {
    /// Ownership derived from resource labels; no persisted state.
    Labels,
    /// Table-backed registry with soft-deleted rows.
    Durable,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the boundary HTTP server binds.
    pub bind_addr: SocketAddr,
    /// Base URL of the external identity gateway.
    pub auth_gateway: String,
    /// Namespace the managed resources live in.
    pub namespace: String,
    /// Timeout applied to every boundary call.
    pub call_timeout: Duration,
    /// Path to the image allow-list file.
    pub images_file: PathBuf,
    pub ownership: OwnershipStrategy,
    /// Database URL; required for the durable strategy.
    pub database_url: Option<String>,
    /// Whether each instance gets a fronting network endpoint.
    pub endpoint_enabled: bool,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_addr: parse_var("PODBENCH_BIND", "0.0.0.0:5000")?,
            auth_gateway: require_var("AUTH_GATEWAY")?,
            namespace: var_or("PODBENCH_NAMESPACE", "default"),
            call_timeout: timeout_from_secs(parse_var::<f64>("PODBENCH_TIMEOUT_SECS", "5.0")?)?,
            images_file: PathBuf::from(var_or("PODBENCH_IMAGES_FILE", "podbench-images")),
            ownership: match var_or("PODBENCH_OWNERSHIP", "labels").as_str() {
                "labels" => OwnershipStrategy::Labels,
                "durable" => OwnershipStrategy::Durable,
                other => {
                    return Err(ConfigError::InvalidValue {
                        name: "PODBENCH_OWNERSHIP",
                        reason: format!("expected 'labels' or 'durable', got '{other}'"),
                    }
                    .into())
                }
            },
            database_url: std::env::var("DATABASE_URL").ok(),
            endpoint_enabled: parse_var("PODBENCH_ENDPOINTS", "true")?,
            logging: LoggingConfig {
                level: var_or("LOG_LEVEL", "info"),
                format: var_or("LOG_FORMAT", "pretty"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.auth_gateway.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_GATEWAY",
                reason: "cannot be empty".into(),
            }
            .into());
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "PODBENCH_TIMEOUT_SECS",
                reason: "must be positive".into(),
            }
            .into());
        }
        if self.ownership == OwnershipStrategy::Durable && self.database_url.is_none() {
            return Err(ConfigError::MissingVar {
                name: "DATABASE_URL",
            }
            .into());
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        self.logging.init();
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

/// `Duration::from_secs_f64` panics on negative or non-finite input, so
/// the parsed value is checked before the conversion.
fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            name: "PODBENCH_TIMEOUT_SECS",
            reason: format!("must be a positive number of seconds, got {secs}"),
        }
        .into());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_var(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar { name }.into())
}

fn parse_var<T>(name: &'static str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var_or(name, default)
        .parse()
        .map_err(|e: T::Err| {
            ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
            }
            .into()
        })
}
