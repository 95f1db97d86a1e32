//! # Event Bus
//!
//! An in-process, thread-safe, asynchronous publish/subscribe bus keyed by
//! event name.
//!
//! ## Overview
//!
//! Listeners subscribe to a string event name. Publishers enqueue
//! `(name, payload)` jobs on a bounded queue under one of three backpressure
//! modes, and a fixed pool of Tokio workers drains the queue and fans every job
//! out to the listeners registered at that moment.
//!
//! ## Features
//!
//! * **Backpressure choice**: drop, block, or block with a timeout when the
//!   queue is full ([`PublishMode`]).
//! * **Failure isolation**: every listener runs in its own task behind a panic
//!   boundary; failures go to a [`FailureSink`], never to the publisher.
//! * **Consistent snapshots**: `FxHashMap` + `parking_lot::RwLock`, released
//!   before any listener runs.
//! * **Idempotent shutdown**: [`EventBus::close`] stops the pool once and
//!   discards jobs still queued.
//!
//! Listeners that never return keep their task alive forever; there is no
//! per-listener timeout.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use wiston_event_bus::{EventBus, EventBusError, PublishMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EventBusError> {
//!     let bus = EventBus::new(2, 64)?;
//!     let total = Arc::new(AtomicU64::new(0));
//!
//!     let seen = Arc::clone(&total);
//!     bus.subscribe_typed("order.created", move |amount: Arc<u64>| {
//!         seen.fetch_add(*amount, Ordering::SeqCst);
//!     });
//!
//!     bus.publish("order.created", 42_u64, PublishMode::BlockIfFull, None).await?;
//!     bus.close().await;
//!     Ok(())
//! }
//! ```

mod bus;
mod dispatch;
mod error;
mod payload;
mod registry;
mod sink;

pub use bus::{DEFAULT_CAPACITY, DEFAULT_WORKERS, EventBus, EventBusBuilder, PublishMode};
pub use error::{EventBusError, EventBusErrorExt, Result};
pub use payload::{Event, Payload};
pub use registry::SubscriptionId;
pub use sink::{FailureSink, TracingSink};
