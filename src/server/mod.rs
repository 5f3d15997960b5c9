//! Network-facing servers.
//!
//! # Data Flow
//! ```text
//! Application
//!     → Server::add_service (RPC servers only, before start)
//!     → ShutdownCoordinator::register
//!     → Server::start (bind, spawn serve loop)
//!     ...
//!     → Server::stop (graceful) / Server::abort (after grace period)
//! ```
//!
//! # Design Decisions
//! - One small capability trait; gRPC and exporter share no implementation
//! - `start` binds synchronously so bind errors surface to the caller
//! - `stop` is idempotent and returns once the serve task has finished

pub mod exporter;
pub mod grpc;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::service::{Service, ServiceError};

pub use exporter::MetricsExporter;
pub use grpc::{GrpcRoutes, GrpcServer};

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Stopped => "stopped",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Errors raised by the server capability.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` called while the server is not stopped.
    #[error("server '{0}' is already running")]
    AlreadyRunning(String),

    /// `add_service` called after `start`.
    #[error("server '{0}' has already been started")]
    AlreadyStarted(String),

    /// The server does not host services.
    #[error("server '{0}' does not accept services")]
    ServicesUnsupported(String),

    /// Bind address could not be resolved or bound.
    #[error("server '{server}' failed to bind {address}: {source}")]
    Bind {
        server: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured HTTP route cannot be served.
    #[error("server '{server}' cannot serve path '{path}': {reason}")]
    Route {
        server: String,
        path: String,
        reason: String,
    },

    /// An attached service failed to register itself.
    #[error("service '{service}' failed to register on '{server}': {source}")]
    Service {
        server: String,
        service: String,
        #[source]
        source: ServiceError,
    },

    /// The serve task ended with an error.
    #[error("server '{server}' terminated abnormally: {message}")]
    Serve { server: String, message: String },
}

/// A listening endpoint with a start/stop lifecycle.
#[async_trait]
pub trait Server: Send + Sync {
    /// Identifier used in logs and metrics.
    fn name(&self) -> &str;

    fn state(&self) -> ServerState;

    /// Address actually bound, once running.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Whether [`Server::add_service`] can succeed on this server.
    fn accepts_services(&self) -> bool {
        false
    }

    /// Attach a service. Only legal before `start`.
    fn add_service(&self, service: Arc<dyn Service>) -> Result<(), ServerError> {
        let _ = service;
        Err(ServerError::ServicesUnsupported(self.name().to_string()))
    }

    /// Bind and begin serving in the background.
    async fn start(&self) -> Result<(), ServerError>;

    /// Stop serving and wait for the serve loop to exit.
    async fn stop(&self) -> Result<(), ServerError>;

    /// Drop the serve loop without waiting.
    fn abort(&self);
}

/// Resolve a `host:port` pair, accepting hostnames as well as IP literals.
pub(crate) async fn resolve_bind_address(server: &str, address: &str) -> Result<SocketAddr, ServerError> {
    let bind_error = |source| ServerError::Bind {
        server: server.to_string(),
        address: address.to_string(),
        source,
    };

    tokio::net::lookup_host(address)
        .await
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            ))
        })
}
