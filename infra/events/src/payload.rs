use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Marker trait for values that can be carried by the [`EventBus`](crate::EventBus).
///
/// Any type that is `Send + Sync + 'static` automatically implements this trait.
pub trait Event: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Event for T {}

/// A type-erased, shared event payload.
///
/// Every listener of a job receives its own clone; cloning only bumps a
/// reference count.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wraps a value into a payload.
    pub fn new<T: Event>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without re-allocating.
    pub fn from_arc<T: Event>(value: Arc<T>) -> Self {
        Self { value, type_name: std::any::type_name::<T>() }
    }

    /// Returns `true` if the payload holds a `T`.
    #[must_use]
    pub fn is<T: Event>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the payload as a `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns a shared handle to the payload as a `T`, if it is one.
    #[must_use]
    pub fn downcast<T: Event>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Name of the type the payload was created from.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("type", &self.type_name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct OrderCreated(u64);

    #[test]
    fn downcasts_to_the_original_type_only() {
        let payload = Payload::new(OrderCreated(7));

        assert!(payload.is::<OrderCreated>());
        assert_eq!(payload.downcast_ref::<OrderCreated>(), Some(&OrderCreated(7)));
        assert_eq!(payload.downcast::<OrderCreated>().map(|v| v.0), Some(7));
        assert!(payload.downcast_ref::<u64>().is_none());
        assert!(payload.downcast::<String>().is_none());
        assert!(payload.type_name().ends_with("OrderCreated"));
    }

    #[test]
    fn clones_share_the_same_value() {
        let shared = Arc::new(OrderCreated(1));
        let payload = Payload::from_arc(Arc::clone(&shared));
        let clone = payload.clone();

        let a = payload.downcast::<OrderCreated>().unwrap();
        let b = clone.downcast::<OrderCreated>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &shared));
    }
}
