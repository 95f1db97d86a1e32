use crate::error::{AppErrorExt, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;
use wiston_event_bus::{DEFAULT_CAPACITY, DEFAULT_WORKERS};
use wiston_logger::{LevelFilter, LogTarget, Logger, LoggerError};

const DEFAULT_CONFIG_FILE: &str = "wiston";
const ENV_PREFIX: &str = "WISTON";

/// Top-level application configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

/// Event bus sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Upper bound on concurrently running listener tasks. Unbounded when unset.
    pub max_in_flight: Option<usize>,
}

/// Logging output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub name: String,
    pub level: String,
    /// `stdout` or a log file path.
    pub target: String,
    pub json: bool,
    pub env_filter: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_WORKERS, queue_capacity: DEFAULT_CAPACITY, max_in_flight: None }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            name: "wiston".to_owned(),
            level: "info".to_owned(),
            target: "stdout".to_owned(),
            json: false,
            env_filter: None,
        }
    }
}

/// Loads configuration from a file, overlaid with environment variables.
///
/// Variables are prefixed with `WISTON__` and nested with double underscores,
/// so `WISTON__EVENTS__WORKERS=8` maps to `events.workers`. Without a path the
/// `wiston` file in the working directory is used; its format follows the extension.
///
/// # Errors
/// Returns [`AppError::Config`](crate::AppError::Config) if the file is missing or the
/// merged values do not match `T`.
///
/// # Example
/// ```rust
/// use wiston::{AppConfig, load_config};
///
/// let cfg: AppConfig = load_config(Some("config/local")).unwrap_or_default();
/// assert!(cfg.events.workers > 0);
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T>
where
    T: DeserializeOwned,
{
    load_layered(path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn load_layered<T>(path: Option<impl AsRef<Path>>, environment: Environment) -> Result<T>
where
    T: DeserializeOwned,
{
    let effective_path =
        path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |p| p.as_ref().to_path_buf());

    info!("Loading config from {}", effective_path.display());

    Config::builder()
        .add_source(File::from(effective_path.as_path()).required(true))
        .add_source(environment)
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}

/// Installs the global tracing subscriber described by `config`.
///
/// # Errors
/// Returns [`AppError::Logger`](crate::AppError::Logger) for an unknown level or when a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Logger> {
    let level = config
        .level
        .parse::<LevelFilter>()
        .map_err(|e| LoggerError::InvalidConfiguration {
            message: format!("Unknown log level '{}': {e}", config.level).into(),
            context: None,
        })
        .context("logging.level")?;
    let target = config.target.parse::<LogTarget>().unwrap_or_default();

    let mut builder = Logger::builder().name(config.name.clone()).target(target).level(level);
    if config.json {
        builder = builder.json();
    }
    if let Some(filter) = &config.env_filter {
        builder = builder.env_filter(filter.clone());
    }

    builder.init().context("Failed to initialize logging")
}
