use std::fmt;
use std::sync::Arc;

use crate::registry::SubscriptionId;

/// Receives a human-readable message for every contained listener failure.
///
/// Any `Fn(&str) + Send + Sync` closure is a sink.
pub trait FailureSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> FailureSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message);
    }
}

/// Default sink: emits failures through `tracing` at the `ERROR` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report(&self, message: &str) {
        tracing::error!(target: "wiston_event_bus", "{message}");
    }
}

/// A listener that terminated abnormally while handling a job.
#[derive(Debug)]
pub(crate) struct ListenerFailure {
    pub(crate) event: Arc<str>,
    pub(crate) subscription: SubscriptionId,
    pub(crate) reason: String,
}

impl ListenerFailure {
    pub(crate) fn from_panic(
        event: Arc<str>,
        subscription: SubscriptionId,
        panic: &(dyn std::any::Any + Send),
    ) -> Self {
        let reason = panic
            .downcast_ref::<&'static str>()
            .map(|msg| (*msg).to_owned())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        Self { event, subscription, reason }
    }
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener {} for event '{}' panicked: {}",
            self.subscription, self.event, self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn failure_message_names_listener_event_and_reason() {
        let failure = ListenerFailure::from_panic(
            "order.created".into(),
            SubscriptionId::new(3),
            &"boom" as &(dyn std::any::Any + Send),
        );
        assert_eq!(failure.to_string(), "listener 3 for event 'order.created' panicked: boom");

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        let failure = ListenerFailure::from_panic("x".into(), SubscriptionId::new(4), &*owned);
        assert_eq!(failure.reason, "owned boom");

        let opaque: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        let failure = ListenerFailure::from_panic("x".into(), SubscriptionId::new(5), &*opaque);
        assert_eq!(failure.reason, "unknown panic");
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |message: &str| seen.lock().push(message.to_owned())
        };

        sink.report("first");
        FailureSink::report(&sink, "second");
        assert_eq!(*seen.lock(), vec!["first".to_owned(), "second".to_owned()]);
    }
}
