//! # Logger
//!
//! Global `tracing` subscriber setup for applications built on the event bus.
//!
//! Output goes to exactly one target: standard output, or a log file written
//! through a non-blocking appender. Filtering honours `RUST_LOG` on top of the
//! configured level, or an explicit directive string.
//!
//! ## Example
//!
//! ```rust
//! # use wiston_logger::{LevelFilter, LogTarget, Logger};
//!
//! let _logger = Logger::builder()
//!     .name("my-app")
//!     .target(LogTarget::Stdout)
//!     .level(LevelFilter::DEBUG)
//!     .init()
//!     .unwrap();
//! ```

mod error;

pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

use private::Sealed;
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_MAX_FILES: usize = 10;
const LOG_FILE_SUFFIX: &str = "log";
const STDOUT: &str = "stdout";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Human-readable lines on standard output.
    #[default]
    Stdout,
    /// Append to the given file. The parent directory is created if needed.
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = Infallible;

    /// `"stdout"` (any case) selects standard output; anything else is a file path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(STDOUT) { Ok(Self::Stdout) } else { Ok(Self::File(s.into())) }
    }
}

#[derive(Debug)]
struct LoggerConfig {
    target: LogTarget,
    level: LevelFilter,
    rotation: Rotation,
    max_files: usize,
    json: bool,
    env_filter: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::Stdout,
            level: LevelFilter::INFO,
            rotation: Rotation::NEVER,
            max_files: DEFAULT_MAX_FILES,
            json: false,
            env_filter: None,
        }
    }
}

#[derive(Debug)]
pub struct NoName;
#[derive(Debug)]
pub struct WithName(String);

mod private {
    pub trait Sealed {}
}
impl Sealed for NoName {}
impl Sealed for WithName {}

/// A builder for configuring and initializing the global tracing subscriber.
///
/// A name is required before [`LoggerBuilder::init`] becomes available.
#[derive(Debug)]
pub struct LoggerBuilder<N: Sealed = NoName> {
    config: LoggerConfig,
    name: N,
}

impl LoggerBuilder<NoName> {
    /// Sets the name of the logger; file targets without an explicit file
    /// name are prefixed with it.
    pub fn name(self, name: impl Into<String>) -> LoggerBuilder<WithName> {
        LoggerBuilder { config: self.config, name: WithName(name.into()) }
    }
}

impl<N: Sealed> LoggerBuilder<N> {
    /// Selects the output target.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn target(mut self, target: LogTarget) -> Self {
        self.config.target = target;
        self
    }

    /// Configures the minimum log level to be emitted.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.config.level = level;
        self
    }

    /// Adds an explicit filter (e.g., `wiston_event_bus=trace,info`).
    ///
    /// Invalid filters will cause [`LoggerBuilder::init`] to return an error.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.env_filter = Some(filter.into());
        self
    }

    /// Rotation strategy for file targets. Defaults to [`Rotation::NEVER`].
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn rotation(mut self, rotation: Rotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    /// Maximum number of rotated files to keep for file targets.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn max_files(mut self, max: usize) -> Self {
        self.config.max_files = max;
        self
    }

    /// Writes JSON lines instead of the compact text format.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn json(mut self) -> Self {
        self.config.json = true;
        self
    }
}

impl LoggerBuilder<WithName> {
    /// Consumes the builder and installs the global tracing subscriber.
    ///
    /// # Returns
    /// A [`Logger`] handle. For file targets it holds the [`WorkerGuard`] of the
    /// non-blocking writer; keep it alive until shutdown so buffered lines are
    /// flushed.
    ///
    /// # Errors
    /// Returns [`LoggerError::Subscriber`] if a global subscriber has already been set,
    /// [`LoggerError::InvalidConfiguration`] for invalid builder settings, and
    /// [`LoggerError::Internal`] or [`LoggerError::Appender`] when the log file
    /// cannot be prepared.
    pub fn init(self) -> Result<Logger, LoggerError> {
        validate_config(&self.config, &self.name.0)?;
        let env_filter = build_env_filter(&self.config)?;

        let (output, guard) = match &self.config.target {
            LogTarget::Stdout => {
                let console = layer().with_ansi(true);
                let boxed = if self.config.json {
                    console.json().boxed()
                } else {
                    console.compact().boxed()
                };
                (boxed, None)
            },
            LogTarget::File(path) => {
                let appender = file_appender(path, &self.name.0, &self.config)?;
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let file = layer().with_writer(writer).with_ansi(false);
                let boxed = if self.config.json { file.json().boxed() } else { file.boxed() };
                (boxed, Some(guard))
            },
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(output)
            .try_init()
            .map_err(LoggerError::from)
            .context(format!("logger '{}'", self.name.0))?;

        tracing::debug!(name = %self.name.0, output = ?self.config.target, "Logger initialized");
        Ok(Logger { target: self.config.target, guard })
    }
}

/// A handle to the initialized logging system.
///
/// Drop it only when the application is shutting down.
#[must_use = "Dropping this handle will stop background logging threads."]
#[derive(Debug)]
pub struct Logger {
    target: LogTarget,
    guard: Option<WorkerGuard>,
}

impl Logger {
    /// Returns a new [`LoggerBuilder`] to configure the global tracing subscriber.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder { config: LoggerConfig::default(), name: NoName }
    }

    /// The target this logger writes to.
    #[must_use]
    pub const fn target(&self) -> &LogTarget {
        &self.target
    }

    /// Returns a reference to the non-blocking writer guard, present for file targets.
    #[must_use]
    pub const fn guard(&self) -> Option<&WorkerGuard> {
        self.guard.as_ref()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!("Logging system shutting down, flushing buffers...");
        }
    }
}

/// Splits a file target into directory, prefix and suffix for the appender.
///
/// `logs/app.log` → (`logs`, `app`, `log`); a path without extension gets the
/// `log` suffix, and an empty stem falls back to the logger name.
fn file_parts<'a>(path: &'a Path, name: &'a str) -> (PathBuf, &'a str, &'a str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let prefix = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()).unwrap_or(name);
    let suffix = path.extension().and_then(|s| s.to_str()).unwrap_or(LOG_FILE_SUFFIX);
    (dir, prefix, suffix)
}

fn file_appender(
    path: &Path,
    name: &str,
    config: &LoggerConfig,
) -> Result<RollingFileAppender, LoggerError> {
    let (dir, prefix, suffix) = file_parts(path, name);
    fs::create_dir_all(&dir).map_err(|e| LoggerError::Internal {
        message: e.to_string().into(),
        context: Some(format!("Failed to create path: {}", dir.display()).into()),
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(config.rotation.clone())
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .max_log_files(config.max_files)
        .build(dir)?;
    Ok(appender)
}

fn validate_config(config: &LoggerConfig, name: &str) -> Result<(), LoggerError> {
    if name.trim().is_empty() {
        return Err(LoggerError::InvalidConfiguration {
            message: "Logger name cannot be empty".into(),
            context: None,
        });
    }

    if config.max_files == 0 {
        return Err(LoggerError::InvalidConfiguration {
            message: "max_files must be greater than zero".into(),
            context: None,
        });
    }

    if matches!(&config.target, LogTarget::File(path) if path.as_os_str().is_empty()) {
        return Err(LoggerError::InvalidConfiguration {
            message: "log file path cannot be empty".into(),
            context: None,
        });
    }

    Ok(())
}

fn build_env_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    let builder = EnvFilter::builder().with_default_directive(config.level.into());
    config.env_filter.as_ref().map_or_else(
        || Ok(builder.from_env_lossy()),
        |filter| {
            builder.parse(filter).map_err(|e| LoggerError::InvalidConfiguration {
                message: format!("Invalid env filter '{filter}': {e}").into(),
                context: None,
            })
        },
    )
}
