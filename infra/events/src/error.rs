use std::borrow::Cow;

/// Errors that can occur during event bus operations.
///
/// Only enqueue-time failures are reported here. Anything that goes wrong
/// inside a listener is reported to the bus [`FailureSink`](crate::FailureSink).
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// `DropIfFull` found no free slot in the queue.
    #[error("Queue full{}: {message}", format_context(.context))]
    QueueFull { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `TimeoutIfFull` could not enqueue before its deadline.
    #[error("Publish timeout{}: {message}", format_context(.context))]
    PublishTimeout { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The bus was used or built with settings that can never work.
    #[error("Invalid configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Capacity must be greater than zero for the job queue.
    #[error("Invalid capacity{}: {message}", format_context(.context))]
    InvalidCapacity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The bus has been closed and no longer accepts events.
    #[error("Event bus closed{}: {message}", format_context(.context))]
    Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No Tokio runtime was available to host the worker pool.
    #[error("Runtime unavailable{}: {message}", format_context(.context))]
    Runtime { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Convenience alias for results produced by the event bus.
pub type Result<T> = std::result::Result<T, EventBusError>;

/// Adds `.context(..)` to event bus results.
pub trait EventBusErrorExt<T> {
    /// Attaches a human-readable context to the error, replacing any previous one.
    ///
    /// # Errors
    /// Returns the original error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T>;
}

impl<T> EventBusErrorExt<T> for Result<T> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                EventBusError::QueueFull { context: c, .. }
                | EventBusError::PublishTimeout { context: c, .. }
                | EventBusError::InvalidConfiguration { context: c, .. }
                | EventBusError::InvalidCapacity { context: c, .. }
                | EventBusError::Closed { context: c, .. }
                | EventBusError::Runtime { context: c, .. } => *c = Some(context.into()),
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
    fn display_includes_context_when_present() {
        let err = EventBusError::QueueFull { message: "dropped event".into(), context: None };
        assert_eq!(err.to_string(), "Queue full: dropped event");

        let err: Result<()> = Err(err);
        let err = err.context("order.created").unwrap_err();
        assert_eq!(err.to_string(), "Queue full (order.created): dropped event");
    }
}
