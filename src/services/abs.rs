//! The `abs` service.

use std::sync::Arc;

use serde::Deserialize;

use crate::server::GrpcRoutes;
use crate::service::{Service, ServiceConfig, ServiceError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AbsSettings {
    /// Free-form description, logged on registration.
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct AbsService {
    name: String,
    settings: AbsSettings,
}

impl AbsService {
    pub fn new(name: &str, config: &ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            name: name.to_string(),
            settings: config.parse()?,
        })
    }

    /// Registry constructor.
    pub fn construct(name: &str, config: &ServiceConfig) -> Result<Arc<dyn Service>, ServiceError> {
        Ok(Arc::new(Self::new(name, config)?))
    }

    pub fn settings(&self) -> &AbsSettings {
        &self.settings
    }
}

impl Service for AbsService {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, _routes: &mut GrpcRoutes) -> Result<(), ServiceError> {
        tracing::info!(
            service = %self.name,
            description = self.settings.description.as_deref().unwrap_or(""),
            "abs service bound"
        );
        Ok(())
    }
}
