use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiston::events::{EventBus, EventBusError, PublishMode};
use wiston::{App, AppConfig, AppError, Gateway, GatewayKind, Module};

#[derive(Debug, Default)]
struct HttpGateway {
    events: Option<EventBus>,
    requests: Arc<AtomicUsize>,
}

impl Gateway for HttpGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Http
    }

    fn attach(&mut self, events: &EventBus) -> wiston::Result<()> {
        let requests = Arc::clone(&self.requests);
        events.subscribe("http.request", move |_| {
            requests.fetch_add(1, Ordering::SeqCst);
        });
        self.events = Some(events.clone());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct SocketGateway;

impl Gateway for SocketGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::WebSocket
    }

    fn attach(&mut self, _events: &EventBus) -> wiston::Result<()> {
        Err(AppError::Gateway { message: "port already bound".into(), context: None })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn app_builds_bus_from_config() {
    let mut config = AppConfig::default();
    config.events.workers = 2;
    config.events.queue_capacity = 8;

    let app = App::new(&config).expect("app should build");
    assert_eq!(app.events().worker_count(), 2);
    assert_eq!(app.events().queue_capacity(), 8);
    assert!(app.start().is_ok());
    assert_eq!(app.shutdown().await, 2);
    assert_eq!(app.shutdown().await, 0);
}

#[tokio::test]
async fn invalid_bus_sizing_is_reported() {
    let mut config = AppConfig::default();
    config.events.queue_capacity = 0;

    let err = App::new(&config).unwrap_err();
    assert!(matches!(err, AppError::EventBus { source: EventBusError::InvalidCapacity { .. }, .. }));

    config.events.queue_capacity = usize::MAX;
    let err = App::new(&config).unwrap_err();
    assert!(matches!(err, AppError::EventBus { source: EventBusError::InvalidCapacity { .. }, .. }));

    config.events.queue_capacity = 8;
    config.events.max_in_flight = Some(usize::MAX);
    let err = App::new(&config).unwrap_err();
    assert!(matches!(
        err,
        AppError::EventBus { source: EventBusError::InvalidConfiguration { .. }, .. }
    ));
}

#[tokio::test]
async fn modules_are_replaced_by_name() {
    let mut app = App::new(&AppConfig::default()).expect("app should build");

    assert!(app.add_module(Module::new("orders")).is_none());
    assert!(app.add_module(Module::new("billing")).is_none());
    let replaced = app.add_module(Module::new("orders"));

    assert_eq!(replaced, Some(Module::new("orders")));
    let names: Vec<&str> = app.modules().iter().map(Module::name).collect();
    assert_eq!(names, ["orders", "billing"]);
    assert!(app.module("billing").is_some());
    assert!(app.module("shipping").is_none());

    app.shutdown().await;
}

#[tokio::test]
async fn gateway_is_attached_and_resolved_by_type() {
    let mut app = App::new(&AppConfig::default()).expect("app should build");
    let requests = Arc::new(AtomicUsize::new(0));
    let gateway = HttpGateway { events: None, requests: Arc::clone(&requests) };

    assert!(app.use_gateway(gateway).expect("attach should succeed").is_none());

    let http = app.gateway::<HttpGateway>(GatewayKind::Http).expect("gateway registered");
    let bus = http.events.as_ref().expect("attach stored the bus");
    bus.publish("http.request", (), PublishMode::BlockIfFull, None).await.expect("publish");

    tokio::time::timeout(Duration::from_secs(2), async {
        while requests.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener registered by attach should run");

    assert!(app.gateway::<SocketGateway>(GatewayKind::Http).is_none(), "type miss");
    assert!(app.gateway::<HttpGateway>(GatewayKind::WebSocket).is_none(), "kind miss");

    let replaced = app.use_gateway(HttpGateway::default()).expect("attach should succeed");
    assert!(replaced.is_some());

    app.shutdown().await;
}

#[tokio::test]
async fn failing_attach_registers_nothing() {
    let mut app = App::new(&AppConfig::default()).expect("app should build");

    let err = app.use_gateway(SocketGateway).unwrap_err();
    assert!(matches!(err, AppError::Gateway { .. }));
    assert!(err.to_string().contains("websocket gateway"));
    assert!(app.gateway::<SocketGateway>(GatewayKind::WebSocket).is_none());

    app.shutdown().await;
}
