use std::borrow::Cow;
use wiston_event_bus::EventBusError;
use wiston_logger::LoggerError;

/// Errors surfaced by the application facade.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Loading or deserializing configuration failed.
    #[error("Config error{}: {source}", format_context(.context))]
    Config {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },

    /// The event bus could not be built or used.
    #[error("Event bus error{}: {source}", format_context(.context))]
    EventBus {
        #[source]
        source: EventBusError,
        context: Option<Cow<'static, str>>,
    },

    /// Logging could not be initialized.
    #[error("Logger error{}: {source}", format_context(.context))]
    Logger {
        #[source]
        source: LoggerError,
        context: Option<Cow<'static, str>>,
    },

    /// A gateway refused to attach.
    #[error("Gateway error{}: {message}", format_context(.context))]
    Gateway { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<config::ConfigError> for AppError {
    fn from(source: config::ConfigError) -> Self {
        Self::Config { source, context: None }
    }
}

impl From<EventBusError> for AppError {
    fn from(source: EventBusError) -> Self {
        Self::EventBus { source, context: None }
    }
}

impl From<LoggerError> for AppError {
    fn from(source: LoggerError) -> Self {
        Self::Logger { source, context: None }
    }
}

/// Adds `.context(..)` to any result whose error converts into [`AppError`].
pub trait AppErrorExt<T> {
    /// Converts the error into [`AppError`] and attaches a human-readable context.
    ///
    /// # Errors
    /// Returns the converted error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T>;
}

impl<T, E: Into<AppError>> AppErrorExt<T> for std::result::Result<T, E> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T> {
        self.map_err(|e| {
            let mut e = e.into();
            match &mut e {
                AppError::Config { context: c, .. }
                | AppError::EventBus { context: c, .. }
                | AppError::Logger { context: c, .. }
                | AppError::Gateway { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
