use crate::dispatch::{Dispatcher, Job, run_worker};
use crate::error::{EventBusError, Result};
use crate::payload::{Event, Payload};
use crate::registry::{Listener, Registry, SubscriptionId};
use crate::sink::{FailureSink, TracingSink};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A safe default for the job queue.
/// 128 is usually enough for domain events between a handful of modules.
pub const DEFAULT_CAPACITY: usize = 128;
/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 4;
const MIN_CAPACITY: usize = 1;
/// Largest queue or in-flight size Tokio's semaphores accept.
const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Behaviour of [`EventBus::publish`] when the job queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Fail immediately with [`EventBusError::QueueFull`].
    #[default]
    DropIfFull,
    /// Wait for a free slot, however long it takes.
    BlockIfFull,
    /// Wait for a free slot up to the supplied timeout, then fail with
    /// [`EventBusError::PublishTimeout`].
    TimeoutIfFull,
}

/// An asynchronous, thread-safe publish/subscribe bus keyed by event name.
///
/// Publishing only enqueues; a fixed pool of workers drains the queue and runs
/// every listener of the event as its own Tokio task. A listener that panics is
/// reported to the bus [`FailureSink`] and affects nobody else.
///
/// Cloning is cheap and every clone drives the same bus.
///
/// Dropping the last clone stops the workers. A listener that captures a clone
/// keeps the bus alive through the registry, so a bus with re-entrant
/// listeners must be stopped with [`EventBus::close`].
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    sender: mpsc::Sender<Job>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    closed: AtomicBool,
}

impl EventBus {
    /// Creates a bus with `workers` workers and a queue of `capacity` jobs,
    /// and starts the worker pool on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns [`EventBusError::InvalidCapacity`] if `capacity` is zero or
    /// above `Semaphore::MAX_PERMITS`,
    /// [`EventBusError::InvalidConfiguration`] if `workers` is zero, or
    /// [`EventBusError::Runtime`] when called outside a Tokio runtime.
    ///
    /// # Examples
    /// ```rust
    /// use wiston_event_bus::EventBus;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiston_event_bus::EventBusError> {
    /// let bus = EventBus::new(2, 16)?;
    /// assert_eq!(bus.worker_count(), 2);
    /// bus.close().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(workers: usize, capacity: usize) -> Result<Self> {
        Self::builder().workers(workers).queue_capacity(capacity).build()
    }

    /// Returns a new [`EventBusBuilder`] with default settings.
    #[must_use = "The builder must be configured before it can be used to build the bus."]
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Registers a synchronous listener for `name`.
    ///
    /// The callback runs on a Tokio worker thread; long blocking work belongs in
    /// [`tokio::task::spawn_blocking`].
    ///
    /// # Examples
    /// ```rust
    /// use wiston_event_bus::EventBus;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiston_event_bus::EventBusError> {
    /// let bus = EventBus::new(1, 8)?;
    /// let id = bus.subscribe("order.created", |payload| {
    ///     let _ = payload.downcast_ref::<u64>();
    /// });
    /// assert!(bus.unsubscribe("order.created", id));
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe<F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(move |payload| {
            callback(payload);
            futures::future::ready(()).boxed()
        });
        self.register(name, listener)
    }

    /// Registers an asynchronous listener for `name`.
    pub fn subscribe_async<F, Fut>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: Listener = Arc::new(move |payload| callback(payload).boxed());
        self.register(name, listener)
    }

    /// Registers a listener that only runs for payloads of type `T`.
    ///
    /// Payloads of any other type are skipped.
    ///
    /// # Examples
    /// ```rust
    /// use std::sync::Arc;
    /// use wiston_event_bus::EventBus;
    ///
    /// #[derive(Debug)]
    /// struct UserCreated { id: u64 }
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiston_event_bus::EventBusError> {
    /// let bus = EventBus::new(1, 8)?;
    /// bus.subscribe_typed("user.created", |event: Arc<UserCreated>| {
    ///     assert_eq!(event.id, 42);
    /// });
    /// bus.try_publish("user.created", UserCreated { id: 42 })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe_typed<T, F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        T: Event,
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        self.subscribe(name, move |payload| match payload.downcast::<T>() {
            Some(value) => callback(value),
            None => {
                debug!(
                    expected = std::any::type_name::<T>(),
                    found = payload.type_name(),
                    "Typed listener skipped a payload of another type"
                );
            },
        })
    }

    /// Removes a subscription. Unknown names or ids are ignored.
    ///
    /// Returns `true` if a listener was removed. Jobs already snapshotted for
    /// dispatch still reach the removed listener.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let removed = self.inner.registry.remove(name, id);
        trace!(event = name, subscription = %id, removed, "Unsubscribe");
        removed
    }

    /// Publishes `event` under `name` using the given backpressure `mode`.
    ///
    /// `timeout` is only read by [`PublishMode::TimeoutIfFull`].
    ///
    /// # Errors
    /// * [`EventBusError::QueueFull`] for `DropIfFull` on a full queue.
    /// * [`EventBusError::PublishTimeout`] when `TimeoutIfFull` runs out of time.
    /// * [`EventBusError::InvalidConfiguration`] for `TimeoutIfFull` without a timeout.
    /// * [`EventBusError::Closed`] once the bus is closed.
    ///
    /// # Examples
    /// ```rust
    /// use std::time::Duration;
    /// use wiston_event_bus::{EventBus, PublishMode};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiston_event_bus::EventBusError> {
    /// let bus = EventBus::new(2, 16)?;
    /// bus.publish("order.created", 42_u64, PublishMode::BlockIfFull, None).await?;
    /// bus.publish("order.created", 43_u64, PublishMode::TimeoutIfFull, Some(Duration::from_millis(50)))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn publish<T: Event>(
        &self,
        name: &str,
        event: T,
        mode: PublishMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.publish_payload(name, Payload::new(event), mode, timeout).await
    }

    /// Publishes a shared event instance without re-wrapping.
    ///
    /// # Errors
    /// Same as [`EventBus::publish`].
    pub async fn publish_arc<T: Event>(
        &self,
        name: &str,
        event: Arc<T>,
        mode: PublishMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.publish_payload(name, Payload::from_arc(event), mode, timeout).await
    }

    /// Publishes an already erased payload.
    ///
    /// # Errors
    /// Same as [`EventBus::publish`].
    pub async fn publish_payload(
        &self,
        name: &str,
        payload: Payload,
        mode: PublishMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = match mode {
            PublishMode::TimeoutIfFull => Some(timeout.ok_or_else(|| {
                EventBusError::InvalidConfiguration {
                    message: "TimeoutIfFull requires a timeout".into(),
                    context: Some(name.to_owned().into()),
                }
            })?),
            PublishMode::DropIfFull | PublishMode::BlockIfFull => None,
        };
        self.ensure_open(name)?;

        let job = Job { name: Arc::from(name), payload };
        let sender = &self.inner.sender;
        match (mode, deadline) {
            (PublishMode::DropIfFull, _) => self.enqueue_now(job)?,
            (_, Some(limit)) => match tokio::time::timeout(limit, sender.send(job)).await {
                Ok(sent) => sent.map_err(|_| closed_error(name))?,
                Err(_) => {
                    return Err(EventBusError::PublishTimeout {
                        message: format!("no free slot within {limit:?}").into(),
                        context: Some(name.to_owned().into()),
                    });
                },
            },
            (_, None) => sender.send(job).await.map_err(|_| closed_error(name))?,
        }
        trace!(event = name, ?mode, "Event enqueued");
        Ok(())
    }

    /// Publishes without waiting, as [`PublishMode::DropIfFull`] does.
    ///
    /// Usable from synchronous code.
    ///
    /// # Errors
    /// Returns [`EventBusError::QueueFull`] if no slot is free, or
    /// [`EventBusError::Closed`] once the bus is closed.
    pub fn try_publish<T: Event>(&self, name: &str, event: T) -> Result<()> {
        self.ensure_open(name)?;
        self.enqueue_now(Job { name: Arc::from(name), payload: Payload::new(event) })
    }

    /// Stops the worker pool and waits for every worker to finish.
    ///
    /// Workers finish the job they are dispatching; jobs still queued are
    /// discarded. Returns the number of workers that stopped. Calling it again
    /// is a no-op that returns `0`; a call racing the first one waits until
    /// every worker has stopped before returning.
    pub async fn close(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let mut workers = self.inner.workers.lock().await;
        if workers.is_empty() {
            trace!("Event bus already closed");
            return 0;
        }

        let discarded = self.queue_len();
        self.inner.shutdown.send_replace(true);

        // Handles are popped only once joined, so a cancelled close leaves the
        // rest for the next caller.
        let mut stopped = 0;
        while let Some(handle) = workers.last_mut() {
            let joined = handle.await;
            workers.pop();
            match joined {
                Ok(()) => stopped += 1,
                Err(e) => warn!(error = %e, "Event bus worker ended abnormally"),
            }
        }

        if discarded > 0 {
            debug!(discarded, "Queued events discarded on close");
        }
        info!(workers = stopped, "Event bus closed");
        stopped
    }

    /// Number of listeners currently registered for `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.registry.listener_count(name)
    }

    /// Event names that currently have at least one listener.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.inner.registry.event_names()
    }

    /// Number of jobs waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        let sender = &self.inner.sender;
        sender.max_capacity() - sender.capacity()
    }

    /// Fixed capacity of the job queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.inner.sender.max_capacity()
    }

    /// Size of the worker pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Returns `true` once [`EventBus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn register(&self, name: &str, listener: Listener) -> SubscriptionId {
        let id = self.inner.registry.insert(name, listener);
        trace!(event = name, subscription = %id, "Listener registered");
        id
    }

    fn ensure_open(&self, name: &str) -> Result<()> {
        if self.is_closed() {
            return Err(closed_error(name));
        }
        Ok(())
    }

    fn enqueue_now(&self, job: Job) -> Result<()> {
        self.inner.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                trace!(event = %job.name, "Queue full; event dropped");
                EventBusError::QueueFull {
                    message: "dropped event".into(),
                    context: Some(job.name.to_string().into()),
                }
            },
            mpsc::error::TrySendError::Closed(job) => closed_error(&job.name),
        })
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.inner.registry)
            .field("workers", &self.inner.worker_count)
            .field("queue_len", &self.queue_len())
            .field("queue_capacity", &self.queue_capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// Unreachable while a registered listener holds an `EventBus` clone.
impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn closed_error(name: &str) -> EventBusError {
    EventBusError::Closed {
        message: "event bus no longer accepts events".into(),
        context: Some(name.to_owned().into()),
    }
}

/// Configures and starts an [`EventBus`].
#[must_use = "The builder must be built to start the bus."]
pub struct EventBusBuilder {
    workers: usize,
    capacity: usize,
    max_in_flight: Option<usize>,
    sink: Arc<dyn FailureSink>,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_CAPACITY,
            max_in_flight: None,
            sink: Arc::new(TracingSink),
        }
    }
}

impl EventBusBuilder {
    /// Sets the size of the worker pool.
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the fixed capacity of the job queue.
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Caps the number of listener tasks running at once across the bus.
    ///
    /// Without a cap every listener of every job is spawned immediately. With
    /// one, a worker waits for a free slot before spawning the next listener.
    pub const fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    /// Replaces the sink that receives listener failure messages.
    pub fn failure_sink(mut self, sink: impl FailureSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Validates the settings and starts the worker pool on the current runtime.
    ///
    /// # Errors
    /// Returns [`EventBusError::InvalidCapacity`] for a zero or oversized capacity,
    /// [`EventBusError::InvalidConfiguration`] for zero workers or an in-flight
    /// cap outside `1..=Semaphore::MAX_PERMITS`, and [`EventBusError::Runtime`]
    /// outside a Tokio runtime.
    pub fn build(self) -> Result<EventBus> {
        let capacity = validate_capacity(self.capacity)?;
        if self.workers == 0 {
            return Err(EventBusError::InvalidConfiguration {
                message: "worker count must be >= 1".into(),
                context: None,
            });
        }
        if let Some(limit) = self.max_in_flight
            && !(1..=MAX_CAPACITY).contains(&limit)
        {
            return Err(EventBusError::InvalidConfiguration {
                message: format!("max_in_flight must be within 1..={MAX_CAPACITY}").into(),
                context: Some(limit.to_string().into()),
            });
        }
        let runtime = Handle::try_current().map_err(|e| EventBusError::Runtime {
            message: e.to_string().into(),
            context: Some("EventBus must be built inside a Tokio runtime".into()),
        })?;

        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let registry = Arc::new(Registry::default());
        let dispatcher = Dispatcher {
            registry: Arc::clone(&registry),
            sink: self.sink,
            in_flight: self.max_in_flight.map(|limit| Arc::new(Semaphore::new(limit))),
        };

        let workers = (0..self.workers)
            .map(|index| {
                runtime.spawn(run_worker(
                    index,
                    Arc::clone(&queue),
                    shutdown_rx.clone(),
                    dispatcher.clone(),
                ))
            })
            .collect();

        debug!(
            workers = self.workers,
            capacity,
            max_in_flight = ?self.max_in_flight,
            "Event bus started"
        );

        Ok(EventBus {
            inner: Arc::new(Inner {
                registry,
                sender,
                shutdown,
                workers: Mutex::new(workers),
                worker_count: self.workers,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

fn validate_capacity(capacity: usize) -> Result<usize> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(EventBusError::InvalidCapacity {
            message: format!("capacity must be within {MIN_CAPACITY}..={MAX_CAPACITY}").into(),
            context: Some(capacity.to_string().into()),
        });
    }
    Ok(capacity)
}
