//! Hosted services.
//!
//! # Data Flow
//! ```text
//! HostConfig.services[name] (ServiceConfig)
//!     → registry.rs (name → constructor)
//!     → Arc<dyn Service>
//!     → Service::register(&mut GrpcRoutes)
//!     → served by the gRPC server
//! ```
//!
//! # Design Decisions
//! - The set of services is closed and bound at build time; no reflection
//! - A service only ever sees its own configuration slice
//! - Services carry no teardown hook; dropping them releases their resources

pub mod registry;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::grpc::GrpcRoutes;

pub use registry::{RegistryBuilder, RegistryError, ServiceConstructor, ServiceRegistry};

/// Opaque per-service configuration payload.
///
/// Immutable once loaded. Services pull typed settings out of it with
/// [`ServiceConfig::parse`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ServiceConfig(serde_json::Value);

impl ServiceConfig {
    /// Wrap an arbitrary structured value.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Deserialize the payload into a typed settings struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_value(self.0.clone()).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Raw payload.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }
}

impl From<serde_json::Value> for ServiceConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Errors raised by service constructors and registration hooks.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration slice does not fit the service's settings.
    #[error("invalid service configuration: {0}")]
    Config(String),

    /// The service could not bind itself to the server.
    #[error("service registration failed: {0}")]
    Registration(String),
}

/// A named unit of business logic hosted by this process.
pub trait Service: Send + Sync + fmt::Debug {
    /// Registry name of this instance.
    fn name(&self) -> &str;

    /// Bind handlers onto an RPC server before it starts.
    fn register(&self, routes: &mut GrpcRoutes) -> Result<(), ServiceError>;
}
