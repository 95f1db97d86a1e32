//! Facade crate for wiston applications.
//! Re-exports the event bus and logger and composes them into an [`App`].
//! Keep this crate thin: it wires infrastructure together, it does not implement it.
//!
//! ## Usage
//! ```rust,no_run
//! use wiston::{App, AppConfig, Module, init_logging, load_config};
//!
//! #[tokio::main]
//! async fn main() -> wiston::Result<()> {
//!     let config: AppConfig = load_config(Some("wiston")).unwrap_or_default();
//!     let _logger = init_logging(&config.logging)?;
//!
//!     let mut app = App::new(&config)?;
//!     app.add_module(Module::new("orders"));
//!     app.start()?;
//!
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

mod app;
mod config;
mod error;

pub use crate::app::{App, Gateway, GatewayKind, Module};
pub use crate::config::{AppConfig, EventsConfig, LoggingConfig, init_logging, load_config};
pub use crate::error::{AppError, AppErrorExt, Result};
pub use wiston_event_bus as events;
pub use wiston_logger as logger;
