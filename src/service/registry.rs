//! Name → constructor mapping for hosted services.
//!
//! Registration happens in a single build phase through [`RegistryBuilder`].
//! [`RegistryBuilder::build`] freezes the map into a [`ServiceRegistry`],
//! which can only resolve.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::service::{Service, ServiceConfig, ServiceError};

/// Constructor producing a service from its name and configuration slice.
pub type ServiceConstructor =
    Arc<dyn Fn(&str, &ServiceConfig) -> Result<Arc<dyn Service>, ServiceError> + Send + Sync>;

/// Errors raised while building or resolving from a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two constructors were registered under the same name.
    #[error("service '{0}' is already registered")]
    DuplicateName(String),

    /// Configuration names a service that was never registered.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The constructor ran and rejected its configuration.
    #[error("failed to construct service '{name}': {source}")]
    Construction {
        name: String,
        #[source]
        source: ServiceError,
    },
}

/// Build phase of a [`ServiceRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, ServiceConstructor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constructor under `name`.
    ///
    /// Fails with [`RegistryError::DuplicateName`] if the name is taken.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&str, &ServiceConfig) -> Result<Arc<dyn Service>, ServiceError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::debug!(service = %name, "Service constructor registered");
        self.entries.insert(name, Arc::new(constructor));
        Ok(self)
    }

    /// Freeze the registry. No further registration is possible.
    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable mapping from service name to constructor.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    entries: BTreeMap<String, ServiceConstructor>,
}

impl ServiceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Construct the service registered under `name`.
    ///
    /// Only that one constructor runs.
    pub fn resolve(&self, name: &str, config: &ServiceConfig) -> Result<Arc<dyn Service>, RegistryError> {
        let constructor = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;

        constructor(name, config).map_err(|source| RegistryError::Construction {
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
