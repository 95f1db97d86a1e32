#![allow(dead_code, unreachable_pub)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use wiston_event_bus::{EventBus, EventBusError, Payload};

/// Event whose listener parks until the gate opens.
pub const SLOW_EVENT: &str = "test.slow";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestEvent(pub u64);

/// Records every payload a listener sees, tagged by listener.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<(&'static str, u64)>>>,
}

impl Recorder {
    /// A listener callback that records `TestEvent` payloads under `tag`.
    pub fn listener(&self, tag: &'static str) -> impl Fn(Payload) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |payload| {
            if let Some(event) = payload.downcast_ref::<TestEvent>() {
                seen.lock().push((tag, event.0));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.seen.lock().iter().filter(|(t, _)| *t == tag).count()
    }

    pub fn values(&self, tag: &str) -> Vec<u64> {
        self.seen.lock().iter().filter(|(t, _)| *t == tag).map(|(_, v)| *v).collect()
    }
}

/// Failure sink that keeps every reported message.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn sink(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let messages = Arc::clone(&self.messages);
        move |message| messages.lock().push(message.to_owned())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

/// Keeps listeners parked until [`Gate::open`] is called.
#[derive(Clone, Debug)]
pub struct Gate {
    barrier: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
}

impl Default for Gate {
    fn default() -> Self {
        Self { barrier: Arc::new(Semaphore::new(0)), entered: Arc::new(AtomicUsize::new(0)) }
    }
}

impl Gate {
    /// Subscribes a listener to [`SLOW_EVENT`] that waits on this gate.
    pub fn install(&self, bus: &EventBus) {
        let gate = self.clone();
        bus.subscribe_async(SLOW_EVENT, move |_| {
            let gate = gate.clone();
            async move {
                gate.entered.fetch_add(1, Ordering::SeqCst);
                // A closed semaphore fails every pending and future acquire.
                let _ = gate.barrier.acquire().await;
            }
        });
    }

    pub fn open(&self) {
        self.barrier.close();
    }

    /// Number of listener invocations that reached the gate.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Builds a bus whose listeners can only run one at a time, so a parked
/// listener stalls the whole pool.
pub fn gated_bus(workers: usize, capacity: usize) -> (EventBus, Gate) {
    let bus = EventBus::builder()
        .workers(workers)
        .queue_capacity(capacity)
        .max_in_flight(1)
        .build()
        .expect("bus should build");
    let gate = Gate::default();
    gate.install(&bus);
    (bus, gate)
}

/// Publishes [`SLOW_EVENT`] jobs until the queue rejects one.
///
/// Returns the number of accepted jobs. Only terminates while the gate is shut.
pub async fn saturate(bus: &EventBus) -> usize {
    let mut accepted = 0;
    loop {
        match bus.try_publish(SLOW_EVENT, TestEvent(accepted as u64)) {
            Ok(()) => accepted += 1,
            Err(EventBusError::QueueFull { .. }) => return accepted,
            Err(err) => panic!("unexpected publish error: {err}"),
        }
        assert!(accepted < 64, "queue never saturated");
        // Let idle workers pick the job up before the next attempt.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within 2s");
}
