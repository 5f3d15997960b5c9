//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse fine but
//! cannot work at runtime. All violations are reported, not just the first.

use std::fmt;

use crate::config::schema::HostConfig;

/// A single semantic problem in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check that `path` is a literal HTTP route.
///
/// Captures and wildcards are rejected, so the router never sees a path it
/// would refuse.
pub fn check_route_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("must start with '/'");
    }
    if path.contains(['{', '}']) {
        return Err("must not contain '{' or '}'");
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err("segments must not start with ':' or '*'");
    }
    Ok(())
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.grpc.host.trim().is_empty() {
        errors.push(ValidationError::new("grpc.host", "must not be empty"));
    }

    if config.exporter.enabled {
        if config.exporter.host.trim().is_empty() {
            errors.push(ValidationError::new("exporter.host", "must not be empty"));
        }
        if let Err(message) = check_route_path(&config.exporter.path) {
            errors.push(ValidationError::new("exporter.path", message));
        }
        if config.exporter.interval_secs == 0 {
            errors.push(ValidationError::new(
                "exporter.interval_secs",
                "must be greater than 0",
            ));
        }
        // Port 0 means "any free port" and never collides.
        if config.exporter.port != 0
            && config.exporter.bind_address() == config.grpc.bind_address()
        {
            errors.push(ValidationError::new(
                "exporter.port",
                "collides with the gRPC listening address",
            ));
        }
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::new(
            "shutdown.grace_period_secs",
            "must be greater than 0",
        ));
    }

    for name in config.service_names() {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("services", "service name must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
