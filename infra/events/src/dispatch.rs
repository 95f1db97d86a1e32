//! Worker pool and fan-out.
//!
//! ```text
//! publish ──► [bounded queue] ──► worker 1 ─┐
//!                   │                        ├─► snapshot(listeners) ─► spawn(listener 1) ─► panic → sink
//!                   └──────────► worker N ─┘                         └► spawn(listener M)
//! ```
//!
//! Workers share the queue receiver, so every job is taken by exactly one
//! worker. Jobs still queued when the shutdown signal fires are discarded.

use crate::payload::Payload;
use crate::registry::Registry;
use crate::sink::{FailureSink, ListenerFailure};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tracing::{debug, trace};

/// One published occurrence awaiting dispatch.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) name: Arc<str>,
    pub(crate) payload: Payload,
}

pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Fans a job out to a snapshot of its listeners.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<Registry>,
    pub(crate) sink: Arc<dyn FailureSink>,
    pub(crate) in_flight: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Spawns one task per listener in the snapshot.
    ///
    /// With an in-flight cap, waiting for a slot gives way to shutdown; the
    /// listeners not yet spawned are then skipped.
    pub(crate) async fn dispatch(&self, job: Job, shutdown: &mut watch::Receiver<bool>) {
        let listeners = self.registry.snapshot(&job.name);
        if listeners.is_empty() {
            trace!(event = %job.name, "No listeners registered; event discarded");
            return;
        }
        trace!(event = %job.name, listeners = listeners.len(), "Dispatching event");

        for (id, listener) in listeners {
            let permit = match &self.in_flight {
                Some(limit) => tokio::select! {
                    biased;
                    () = stop_requested(shutdown) => return,
                    permit = Arc::clone(limit).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                },
                None => None,
            };

            let payload = job.payload.clone();
            let event = Arc::clone(&job.name);
            let sink = Arc::clone(&self.sink);

            tokio::spawn(async move {
                let _permit = permit;
                // The listener is called inside the guarded future so a panic
                // while building its future is caught as well.
                let call = async move { listener(payload).await };
                if let Err(panic) = AssertUnwindSafe(call).catch_unwind().await {
                    let failure = ListenerFailure::from_panic(event, id, &*panic);
                    sink.report(&failure.to_string());
                }
            });
        }
    }
}

/// Runs until the shutdown signal fires or every queue sender is gone.
pub(crate) async fn run_worker(
    index: usize,
    queue: JobQueue,
    mut shutdown: watch::Receiver<bool>,
    dispatcher: Dispatcher,
) {
    debug!(worker = index, "Event bus worker started");
    loop {
        tokio::select! {
            biased;
            () = stop_requested(&mut shutdown) => break,
            job = next_job(&queue) => match job {
                Some(job) => dispatcher.dispatch(job, &mut shutdown).await,
                None => break,
            },
        }
    }
    debug!(worker = index, "Event bus worker stopped");
}

async fn next_job(queue: &JobQueue) -> Option<Job> {
    queue.lock().await.recv().await
}

/// Completes once the bus asks workers to stop, or the signal is dropped.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight.as_ref().map(|s| s.available_permits()))
            .finish_non_exhaustive()
    }
}
