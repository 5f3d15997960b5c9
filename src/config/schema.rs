//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::service::ServiceConfig;

/// Root configuration for the service host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// gRPC server bind settings.
    pub grpc: GrpcConfig,

    /// Metrics exporter settings.
    pub exporter: ExporterConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Services to instantiate, keyed by registry name.
    ///
    /// Each value is handed, untouched, to the constructor of that service.
    pub services: BTreeMap<String, ServiceConfig>,
}

impl HostConfig {
    /// Look up the configuration slice of a single service.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    /// Names of every configured service, in a stable order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    /// Listening host.
    pub host: String,

    /// Listening port.
    pub port: u16,
}

impl GrpcConfig {
    /// `host:port` form used for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 42001,
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Run the exporter at all.
    pub enabled: bool,

    /// Listening host.
    pub host: String,

    /// Listening port.
    pub port: u16,

    /// HTTP path serving the scrape output.
    pub path: String,

    /// Upkeep interval in seconds.
    pub interval_secs: u64,
}

impl ExporterConfig {
    /// `host:port` form used for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 4242,
            path: "/metrics".to_string(),
            interval_secs: 1,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time every server gets to stop before it is abandoned.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format of log lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.grpc.bind_address(), "127.0.0.1:42001");
        assert_eq!(config.exporter.bind_address(), "127.0.0.1:4242");
        assert_eq!(config.exporter.path, "/metrics");
        assert_eq!(config.exporter.interval_secs, 1);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_services_keep_their_own_slice() {
        let config: HostConfig = toml::from_str(
            r#"
            [services.abs]
            greeting = "hi"

            [services.child]
            parent = "abs"
            "#,
        )
        .unwrap();

        let names: Vec<_> = config.service_names().collect();
        assert_eq!(names, vec!["abs", "child"]);

        let abs = config.service("abs").unwrap();
        assert_eq!(abs.get("greeting").and_then(|v| v.as_str()), Some("hi"));
        assert!(abs.get("parent").is_none());
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let config: HostConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }
}
