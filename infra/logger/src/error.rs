use std::borrow::Cow;
use tracing_appender::rolling::InitError;
use tracing_subscriber::util::TryInitError;

/// Errors that can occur during logger initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Failure when configuring the file appender (e.g., unwritable path).
    #[error("File appender error{}: {source}", format_context(.context))]
    Appender {
        #[source]
        source: InitError,
        context: Option<Cow<'static, str>>,
    },

    /// Occurs if a global tracing subscriber has already been initialized in the current process.
    #[error("Tracing subscriber error{}: {source}", format_context(.context))]
    Subscriber {
        #[source]
        source: TryInitError,
        context: Option<Cow<'static, str>>,
    },

    /// Internal logic errors.
    #[error("Internal logger error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Invalid configuration supplied to the logger builder.
    #[error("Invalid logger configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl From<InitError> for LoggerError {
    fn from(source: InitError) -> Self {
        Self::Appender { source, context: None }
    }
}

impl From<TryInitError> for LoggerError {
    fn from(source: TryInitError) -> Self {
        Self::Subscriber { source, context: None }
    }
}

impl From<&'static str> for LoggerError {
    fn from(message: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(message), context: None }
    }
}

impl From<String> for LoggerError {
    fn from(message: String) -> Self {
        Self::Internal { message: Cow::Owned(message), context: None }
    }
}

/// Adds `.context(..)` to logger results.
pub trait LoggerErrorExt<T> {
    /// Attaches a human-readable context to the error, replacing any previous one.
    ///
    /// # Errors
    /// Returns the original error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, LoggerError>;
}

impl<T> LoggerErrorExt<T> for Result<T, LoggerError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                LoggerError::Appender { context: c, .. }
                | LoggerError::Subscriber { context: c, .. }
                | LoggerError::Internal { context: c, .. }
                | LoggerError::InvalidConfiguration { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_rendered_in_display() {
        let err: Result<(), LoggerError> = Err("flush failed".into());
        let err = err.context("shutdown").unwrap_err();
        assert_eq!(err.to_string(), "Internal logger error (shutdown): flush failed");
    }
}
