use crate::payload::Payload;
use futures::future::BoxFuture;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one subscription for the lifetime of a bus.
///
/// Ids start at `1`, grow monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Erased listener: every registration flavour is normalized to this shape.
pub(crate) type Listener = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

type ListenerSet = FxHashMap<SubscriptionId, Listener>;

/// Event name → listener set, guarded by one reader/writer lock.
#[derive(Default)]
pub(crate) struct Registry {
    events: RwLock<FxHashMap<Arc<str>, ListenerSet>>,
    counter: AtomicU64,
}

impl Registry {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, name: &str, listener: Listener) -> SubscriptionId {
        let id = self.next_id();
        let mut events = self.events.write();
        match events.get_mut(name) {
            Some(set) => {
                set.insert(id, listener);
            },
            None => {
                let mut set = ListenerSet::default();
                set.insert(id, listener);
                events.insert(Arc::from(name), set);
            },
        }
        id
    }

    pub(crate) fn remove(&self, name: &str, id: SubscriptionId) -> bool {
        let mut events = self.events.write();
        let Some(set) = events.get_mut(name) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            events.remove(name);
        }
        removed
    }

    /// Copies the current listener set for `name`.
    ///
    /// The read lock is released before this returns; callers may invoke the
    /// listeners while other tasks mutate the registry.
    pub(crate) fn snapshot(&self, name: &str) -> Vec<(SubscriptionId, Listener)> {
        self.events.read().get(name).map_or_else(Vec::new, |set| {
            set.iter().map(|(id, listener)| (*id, Arc::clone(listener))).collect()
        })
    }

    pub(crate) fn listener_count(&self, name: &str) -> usize {
        self.events.read().get(name).map_or(0, FxHashMap::len)
    }

    pub(crate) fn event_names(&self) -> Vec<String> {
        self.events.read().keys().map(|name| name.to_string()).collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.read();
        f.debug_struct("Registry")
            .field("events", &events.len())
            .field("listeners", &events.values().map(FxHashMap::len).sum::<usize>())
            .field("last_id", &self.counter.load(Ordering::Relaxed))
            .finish()
    }
}
