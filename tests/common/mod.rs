//! Shared fixtures for lifecycle tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use service_host::server::{GrpcRoutes, Server, ServerError, ServerState};
use service_host::service::{RegistryBuilder, Service, ServiceConfig, ServiceError};
use service_host::ServiceRegistry;

/// Ordered record of lifecycle calls across every fake server.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// In-memory server honouring the server contract.
pub struct FakeServer {
    name: String,
    fail_start: bool,
    accepts_services: bool,
    state: Mutex<ServerState>,
    started: Mutex<bool>,
    services: Mutex<Vec<String>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    log: EventLog,
}

impl FakeServer {
    pub fn new(name: &str, log: &EventLog) -> Arc<Self> {
        Self::build(name, log, false, true)
    }

    pub fn failing(name: &str, log: &EventLog) -> Arc<Self> {
        Self::build(name, log, true, true)
    }

    pub fn exporter(name: &str, log: &EventLog) -> Arc<Self> {
        Self::build(name, log, false, false)
    }

    fn build(name: &str, log: &EventLog, fail_start: bool, accepts_services: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_start,
            accepts_services,
            state: Mutex::new(ServerState::Stopped),
            started: Mutex::new(false),
            services: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    pub fn services(&self) -> Vec<String> {
        self.services.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{event}:{}", self.name));
    }
}

#[async_trait]
impl Server for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn accepts_services(&self) -> bool {
        self.accepts_services
    }

    fn add_service(&self, service: Arc<dyn Service>) -> Result<(), ServerError> {
        if !self.accepts_services {
            return Err(ServerError::ServicesUnsupported(self.name.clone()));
        }
        if *self.started.lock().unwrap() {
            return Err(ServerError::AlreadyStarted(self.name.clone()));
        }
        self.services.lock().unwrap().push(service.name().to_string());
        Ok(())
    }

    async fn start(&self) -> Result<(), ServerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record("start");

        let mut state = self.state.lock().unwrap();
        if *state != ServerState::Stopped {
            return Err(ServerError::AlreadyRunning(self.name.clone()));
        }
        if self.fail_start {
            return Err(ServerError::Bind {
                server: self.name.clone(),
                address: "127.0.0.1:1".into(),
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            });
        }
        *state = ServerState::Running;
        *self.started.lock().unwrap() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state == ServerState::Running {
            self.record("stop");
            *state = ServerState::Stopped;
        }
        Ok(())
    }

    fn abort(&self) {
        *self.state.lock().unwrap() = ServerState::Stopped;
    }
}

#[derive(Debug)]
pub struct CountedService {
    name: String,
}

impl Service for CountedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, _routes: &mut GrpcRoutes) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Per-name constructor call counters.
#[derive(Clone, Default)]
pub struct ConstructorCalls {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ConstructorCalls {
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|n| *n == name).count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Registry whose constructors record every invocation.
pub fn counting_registry(names: &[&str]) -> (ServiceRegistry, ConstructorCalls) {
    let calls = ConstructorCalls::default();
    let mut builder = RegistryBuilder::new();
    for name in names {
        let calls = calls.clone();
        builder
            .register(*name, move |name: &str, _config: &ServiceConfig| {
                calls.calls.lock().unwrap().push(name.to_string());
                Ok(Arc::new(CountedService {
                    name: name.to_string(),
                }) as Arc<dyn Service>)
            })
            .unwrap();
    }
    (builder.build(), calls)
}
