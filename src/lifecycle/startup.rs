//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct the configured services from the registry
//! - Attach them to every server that hosts services
//! - Register every server for shutdown, then start them in order
//! - Roll back already-started servers when a later one fails
//! - Wait for the shutdown notification and stop everything
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - All services are resolved before any server starts
//! - Exporter starts before the gRPC server

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::HostConfig;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::lifecycle::signals::SignalWatcher;
use crate::observability::metrics;
use crate::server::{GrpcServer, MetricsExporter, Server, ServerError};
use crate::service::{RegistryError, Service, ServiceRegistry};

/// Application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppState::Idle => "idle",
            AppState::Starting => "starting",
            AppState::Running => "running",
            AppState::Stopping => "stopping",
            AppState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// `start` was called more than once.
    #[error("application already started (state: {0})")]
    AlreadyStarted(AppState),

    /// A configured service could not be resolved or constructed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A service could not be attached to a server.
    #[error("cannot attach service '{service}': {source}")]
    Attach {
        service: String,
        #[source]
        source: ServerError,
    },

    /// A server failed to start; every started server has been stopped.
    #[error("server '{server}' failed to start: {source}")]
    ServerStart {
        server: String,
        #[source]
        source: ServerError,
        rollback: ShutdownReport,
    },
}

/// Owns the configuration, registry and servers, and drives their lifecycle.
pub struct Application {
    id: Uuid,
    config: Arc<HostConfig>,
    registry: ServiceRegistry,
    servers: Option<Vec<Arc<dyn Server>>>,
    services: Vec<Arc<dyn Service>>,
    coordinator: ShutdownCoordinator,
    state: AppState,
}

impl Application {
    /// Create an application serving the default server set derived from `config`.
    pub fn new(config: HostConfig, registry: ServiceRegistry) -> Self {
        Self::build(config, registry, None)
    }

    /// Create an application serving an explicit, ordered server list.
    pub fn with_servers(
        config: HostConfig,
        registry: ServiceRegistry,
        servers: Vec<Arc<dyn Server>>,
    ) -> Self {
        Self::build(config, registry, Some(servers))
    }

    fn build(
        config: HostConfig,
        registry: ServiceRegistry,
        servers: Option<Vec<Arc<dyn Server>>>,
    ) -> Self {
        let grace_period = Duration::from_secs(config.shutdown.grace_period_secs);
        Self {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            registry,
            servers,
            services: Vec::new(),
            coordinator: ShutdownCoordinator::new(grace_period),
            state: AppState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Names of the services constructed during startup.
    pub fn services(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Run the application until `signals` fires.
    ///
    /// Returns the shutdown report on a clean run. Startup failures are
    /// returned only after every started server has been stopped.
    pub async fn start(&mut self, signals: &SignalWatcher) -> Result<ShutdownReport, AppError> {
        if self.state != AppState::Idle {
            return Err(AppError::AlreadyStarted(self.state));
        }
        self.state = AppState::Starting;

        tracing::info!(
            instance_id = %self.id,
            services = self.config.services.len(),
            "Application starting"
        );

        let servers = match self.prepare() {
            Ok(servers) => servers,
            Err(e) => {
                tracing::error!(error = %e, "Application startup aborted");
                self.state = AppState::Stopped;
                return Err(e);
            }
        };

        for server in &servers {
            self.coordinator.register(server.clone());
        }

        for server in &servers {
            if let Err(source) = server.start().await {
                let name = server.name().to_string();
                metrics::record_server_start_failed(&name);
                tracing::error!(server = %name, error = %source, "Server failed to start, rolling back");

                let rollback = self.coordinator.stop_all().await;
                if !rollback.is_clean() {
                    tracing::error!(
                        failed = ?rollback.failed,
                        timed_out = ?rollback.timed_out,
                        "Rollback did not complete cleanly"
                    );
                }

                self.state = AppState::Stopped;
                return Err(AppError::ServerStart {
                    server: name,
                    source,
                    rollback,
                });
            }
            metrics::record_server_started(server.name());
        }

        self.state = AppState::Running;
        tracing::info!(
            instance_id = %self.id,
            servers = servers.len(),
            services = ?self.services(),
            "Application running"
        );

        signals.done().await;

        self.state = AppState::Stopping;
        tracing::info!(instance_id = %self.id, "Application stopping");

        let report = self.coordinator.stop_all().await;
        for server in &report.timed_out {
            tracing::warn!(server = %server, "Server abandoned after grace period");
        }

        self.state = AppState::Stopped;
        tracing::info!(
            instance_id = %self.id,
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            "Application stopped"
        );
        Ok(report)
    }

    /// Resolve services and attach them. No server is started here.
    fn prepare(&mut self) -> Result<Vec<Arc<dyn Server>>, AppError> {
        let mut services = Vec::with_capacity(self.config.services.len());
        for (name, service_config) in &self.config.services {
            let service = self.registry.resolve(name, service_config)?;
            tracing::info!(service = %name, "Service constructed");
            services.push(service);
        }

        let servers = match self.servers.take() {
            Some(servers) => servers,
            None => self.default_servers(),
        };

        for service in &services {
            for server in servers.iter().filter(|s| s.accepts_services()) {
                server
                    .add_service(service.clone())
                    .map_err(|source| AppError::Attach {
                        service: service.name().to_string(),
                        source,
                    })?;
            }
        }

        metrics::record_services_active(services.len());
        self.services = services;
        Ok(servers)
    }

    fn default_servers(&self) -> Vec<Arc<dyn Server>> {
        let mut servers: Vec<Arc<dyn Server>> = Vec::with_capacity(2);
        if self.config.exporter.enabled {
            servers.push(Arc::new(MetricsExporter::new(&self.config.exporter)));
        }
        servers.push(Arc::new(GrpcServer::new(&self.config.grpc)));
        servers
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("services", &self.services())
            .finish()
    }
}
