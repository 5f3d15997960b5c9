//! Microservice host: service registry, gRPC and metrics servers, and
//! coordinated startup and shutdown.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod server;
pub mod service;
pub mod services;

pub use config::HostConfig;
pub use lifecycle::{Application, ShutdownCoordinator, SignalWatcher};
pub use server::{Server, ServerError, ServerState};
pub use service::{Service, ServiceConfig, ServiceRegistry};
