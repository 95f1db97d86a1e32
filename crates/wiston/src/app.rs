//! Application container: one event bus plus the modules and gateways built around it.

use crate::config::AppConfig;
use crate::error::{AppErrorExt, Result};
use fxhash::FxHashMap;
use std::any::Any;
use std::fmt;
use tracing::{info, warn};
use wiston_event_bus::EventBus;

/// A named unit of application logic registered with the [`App`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Transport family of a [`Gateway`]. At most one gateway per kind is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    Http,
    WebSocket,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::WebSocket => f.write_str("websocket"),
        }
    }
}

/// An externally implemented entry point (HTTP server, WebSocket hub, ...).
pub trait Gateway: Any + fmt::Debug + Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Called once by [`App::use_gateway`] before the gateway is stored.
    ///
    /// Gateways typically keep a clone of the bus to publish inbound traffic.
    ///
    /// # Errors
    /// Returning an error aborts registration.
    fn attach(&mut self, events: &EventBus) -> Result<()> {
        let _ = events;
        Ok(())
    }

    /// Helper to allow downcasting from the trait object.
    fn as_any(&self) -> &dyn Any;
}

pub struct App {
    events: EventBus,
    modules: Vec<Module>,
    gateways: FxHashMap<GatewayKind, Box<dyn Gateway>>,
}

impl App {
    /// Builds the event bus described by `config.events`.
    ///
    /// # Errors
    /// Returns [`AppError::EventBus`](crate::AppError::EventBus) for invalid sizing or when
    /// called outside a Tokio runtime.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let events = &config.events;
        let mut builder =
            EventBus::builder().workers(events.workers).queue_capacity(events.queue_capacity);
        if let Some(limit) = events.max_in_flight {
            builder = builder.max_in_flight(limit);
        }
        let events = builder.build().context("Failed to build event bus")?;

        Ok(Self { events, modules: Vec::new(), gateways: FxHashMap::default() })
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers a module, replacing and returning any module with the same name.
    pub fn add_module(&mut self, module: Module) -> Option<Module> {
        match self.modules.iter_mut().find(|m| m.name == module.name) {
            Some(slot) => Some(std::mem::replace(slot, module)),
            None => {
                self.modules.push(module);
                None
            },
        }
    }

    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Registered modules in registration order.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Attaches `gateway` to the bus and registers it under its kind.
    ///
    /// # Returns
    /// The previously registered gateway of the same kind, if any.
    ///
    /// # Errors
    /// Propagates the error returned by [`Gateway::attach`]; nothing is replaced then.
    pub fn use_gateway<G: Gateway>(&mut self, mut gateway: G) -> Result<Option<Box<dyn Gateway>>> {
        let kind = gateway.kind();
        gateway.attach(&self.events).context(format!("{kind} gateway"))?;

        let replaced = self.gateways.insert(kind, Box::new(gateway));
        if replaced.is_some() {
            warn!(%kind, "Gateway replaced");
        }
        Ok(replaced)
    }

    /// Resolves the gateway registered under `kind` as its concrete type.
    ///
    /// `None` when nothing is registered for `kind` or it is not a `T`.
    #[must_use]
    pub fn gateway<T: Gateway>(&self, kind: GatewayKind) -> Option<&T> {
        self.gateways.get(&kind)?.as_any().downcast_ref::<T>()
    }

    /// Logs the assembled application.
    ///
    /// # Errors
    /// Does not fail at present.
    pub fn start(&self) -> Result<()> {
        let modules: Vec<&str> = self.modules.iter().map(Module::name).collect();
        let gateways: Vec<GatewayKind> = self.gateways.keys().copied().collect();
        info!(
            ?modules,
            ?gateways,
            workers = self.events.worker_count(),
            queue_capacity = self.events.queue_capacity(),
            "Application started"
        );
        Ok(())
    }

    /// Closes the event bus. Returns the number of workers stopped by this call.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.events.close().await;
        info!(stopped, "Application shut down");
        stopped
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("events", &self.events)
            .field("modules", &self.modules)
            .field("gateways", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}
