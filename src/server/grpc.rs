//! gRPC server.
//!
//! # Responsibilities
//! - Collect services attached before start
//! - Let each service register its routes
//! - Publish per-service status through `grpc.health.v1`
//! - Serve on a bound listener until told to stop

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::{Routes, RoutesBuilder};
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

use crate::config::GrpcConfig;
use crate::server::{resolve_bind_address, Server, ServerError, ServerState};
use crate::service::Service;

/// Route table handed to every service during start.
pub struct GrpcRoutes {
    builder: RoutesBuilder,
    health_names: Vec<String>,
}

impl GrpcRoutes {
    fn new() -> Self {
        Self {
            builder: Routes::builder(),
            health_names: Vec::new(),
        }
    }

    /// Underlying tonic builder, for adding generated service servers.
    pub fn builder_mut(&mut self) -> &mut RoutesBuilder {
        &mut self.builder
    }

    /// Publish an extra health-check name that follows the server's status.
    pub fn report_health(&mut self, name: impl Into<String>) {
        self.health_names.push(name.into());
    }

    fn into_parts(self) -> (Routes, Vec<String>) {
        (self.builder.routes(), self.health_names)
    }
}

type ServeResult = Result<(), tonic::transport::Error>;

struct Inner {
    state: ServerState,
    started: bool,
    services: Vec<Arc<dyn Service>>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ServeResult>>,
    abort: Option<AbortHandle>,
    health: Option<(HealthReporter, Vec<String>)>,
}

/// gRPC endpoint hosting every attached service plus the health service.
pub struct GrpcServer {
    name: String,
    address: String,
    inner: Mutex<Inner>,
}

impl GrpcServer {
    pub fn new(config: &GrpcConfig) -> Self {
        Self::with_address("grpc", config.bind_address())
    }

    /// Create a server bound to an explicit `host:port`.
    pub fn with_address(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            inner: Mutex::new(Inner {
                state: ServerState::Stopped,
                started: false,
                services: Vec::new(),
                local_addr: None,
                shutdown_tx: None,
                task: None,
                abort: None,
                health: None,
            }),
        }
    }

    /// Names of attached services.
    pub fn service_names(&self) -> Vec<String> {
        self.lock().services.iter().map(|s| s.name().to_string()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn launch(&self, services: &[Arc<dyn Service>]) -> Result<Launched, ServerError> {
        let addr = resolve_bind_address(&self.name, &self.address).await?;
        let bind_error = |source| ServerError::Bind {
            server: self.name.clone(),
            address: self.address.clone(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        let mut routes = GrpcRoutes::new();
        routes.builder_mut().add_service(health_service);

        for service in services {
            service.register(&mut routes).map_err(|source| ServerError::Service {
                server: self.name.clone(),
                service: service.name().to_string(),
                source,
            })?;
            routes.report_health(service.name());
            tracing::debug!(server = %self.name, service = service.name(), "Service registered");
        }

        let (routes, health_names) = routes.into_parts();
        for name in &health_names {
            health_reporter
                .set_service_status(name, ServingStatus::Serving)
                .await;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);
        let mut builder = tonic::transport::Server::builder();
        let router = builder.add_routes(routes);
        let task = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Launched {
            local_addr,
            shutdown_tx,
            task,
            health: (health_reporter, health_names),
        })
    }
}

struct Launched {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<ServeResult>,
    health: (HealthReporter, Vec<String>),
}

#[async_trait]
impl Server for GrpcServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServerState {
        self.lock().state
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().local_addr
    }

    fn accepts_services(&self) -> bool {
        true
    }

    fn add_service(&self, service: Arc<dyn Service>) -> Result<(), ServerError> {
        let mut inner = self.lock();
        if inner.started || inner.state != ServerState::Stopped {
            return Err(ServerError::AlreadyStarted(self.name.clone()));
        }
        tracing::debug!(server = %self.name, service = service.name(), "Service attached");
        inner.services.push(service);
        Ok(())
    }

    async fn start(&self) -> Result<(), ServerError> {
        let services = {
            let mut inner = self.lock();
            if inner.state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning(self.name.clone()));
            }
            inner.state = ServerState::Running;
            inner.services.clone()
        };

        let launched = match self.launch(&services).await {
            Ok(launched) => launched,
            Err(e) => {
                self.lock().state = ServerState::Stopped;
                return Err(e);
            }
        };

        let local_addr = launched.local_addr;
        {
            let mut inner = self.lock();
            inner.started = true;
            inner.local_addr = Some(local_addr);
            inner.shutdown_tx = Some(launched.shutdown_tx);
            inner.abort = Some(launched.task.abort_handle());
            inner.task = Some(launched.task);
            inner.health = Some(launched.health);
        }

        tracing::info!(
            server = %self.name,
            address = %local_addr,
            services = services.len(),
            "gRPC server listening"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        let (shutdown_tx, task, health) = {
            let mut inner = self.lock();
            if inner.state != ServerState::Running {
                return Ok(());
            }
            inner.state = ServerState::Stopping;
            (inner.shutdown_tx.take(), inner.task.take(), inner.health.take())
        };

        tracing::info!(server = %self.name, "gRPC server stopping");

        if let Some((reporter, names)) = health {
            for name in &names {
                reporter
                    .set_service_status(name, ServingStatus::NotServing)
                    .await;
            }
        }

        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let result = match task {
            Some(task) => match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Serve {
                    server: self.name.clone(),
                    message: e.to_string(),
                }),
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(ServerError::Serve {
                    server: self.name.clone(),
                    message: e.to_string(),
                }),
            },
            None => Ok(()),
        };

        {
            let mut inner = self.lock();
            inner.state = ServerState::Stopped;
            inner.local_addr = None;
            inner.abort = None;
        }

        tracing::info!(server = %self.name, "gRPC server stopped");
        result
    }

    fn abort(&self) {
        let mut inner = self.lock();
        if let Some(handle) = inner.abort.take() {
            handle.abort();
            tracing::warn!(server = %self.name, "gRPC server aborted");
        }
        inner.task = None;
        inner.shutdown_tx = None;
        inner.health = None;
        inner.local_addr = None;
        inner.state = ServerState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceError;

    #[derive(Debug)]
    struct Echo;

    impl Service for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn register(&self, _routes: &mut GrpcRoutes) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl Service for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn register(&self, _routes: &mut GrpcRoutes) -> Result<(), ServiceError> {
            Err(ServiceError::Registration("no handlers".into()))
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.add_service(Arc::new(Echo)).unwrap();
        assert_eq!(server.state(), ServerState::Stopped);

        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.local_addr().is_some());

        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.start().await.unwrap();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning(_)));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_service_after_start_rejected() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.start().await.unwrap();
        let err = server.add_service(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted(_)));
        server.stop().await.unwrap();
        assert_eq!(server.service_names(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.stop().await.unwrap();
        server.start().await.unwrap();
        server.stop().await.unwrap();
        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_server_stopped() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let server = GrpcServer::with_address("grpc", addr.to_string());
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_service_registration_failure() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.add_service(Arc::new(Broken)).unwrap();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Service { ref service, .. } if service == "broken"));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_abort_resets_state() {
        let server = GrpcServer::with_address("grpc", "127.0.0.1:0");
        server.start().await.unwrap();
        server.abort();
        assert_eq!(server.state(), ServerState::Stopped);
        server.stop().await.unwrap();
    }
}
