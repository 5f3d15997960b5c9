//! The `child` service.

use std::sync::Arc;

use serde::Deserialize;

use crate::server::GrpcRoutes;
use crate::service::{Service, ServiceConfig, ServiceError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChildSettings {
    /// Name of the service this one is nested under.
    pub parent: Option<String>,
}

#[derive(Debug)]
pub struct ChildService {
    name: String,
    settings: ChildSettings,
}

impl ChildService {
    pub fn new(name: &str, config: &ServiceConfig) -> Result<Self, ServiceError> {
        let settings: ChildSettings = config.parse()?;
        if settings.parent.as_deref() == Some(name) {
            return Err(ServiceError::Config(format!("'{name}' cannot be its own parent")));
        }
        Ok(Self {
            name: name.to_string(),
            settings,
        })
    }

    /// Registry constructor.
    pub fn construct(name: &str, config: &ServiceConfig) -> Result<Arc<dyn Service>, ServiceError> {
        Ok(Arc::new(Self::new(name, config)?))
    }

    /// Health-check name nested under the parent, e.g. `abs.child`.
    pub fn qualified_name(&self) -> Option<String> {
        self.settings
            .parent
            .as_ref()
            .map(|parent| format!("{parent}.{}", self.name))
    }
}

impl Service for ChildService {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, routes: &mut GrpcRoutes) -> Result<(), ServiceError> {
        if let Some(qualified) = self.qualified_name() {
            routes.report_health(qualified);
        }
        tracing::info!(
            service = %self.name,
            parent = self.settings.parent.as_deref().unwrap_or("-"),
            "child service bound"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_qualified_name() {
        let config = ServiceConfig::new(json!({ "parent": "abs" }));
        let service = ChildService::new("child", &config).unwrap();
        assert_eq!(service.qualified_name().as_deref(), Some("abs.child"));

        let orphan = ChildService::new("child", &ServiceConfig::default()).unwrap();
        assert!(orphan.qualified_name().is_none());
    }

    #[test]
    fn test_self_parent_rejected() {
        let config = ServiceConfig::new(json!({ "parent": "child" }));
        let err = ChildService::new("child", &config).unwrap_err();
        assert!(err.to_string().contains("own parent"));
    }
}
