//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::HostConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read and parse a TOML configuration file without validating it.
///
/// Callers that layer overrides on top validate the merged result themselves.
pub fn read_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<HostConfig, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_file() {
        let file = write_config(
            r#"
            [grpc]
            port = 50051

            [services.abs]
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.grpc.port, 50051);
        assert_eq!(config.grpc.host, "127.0.0.1");
        assert!(config.service("abs").is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_config("[grpc\nport = ");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_read_skips_validation() {
        let file = write_config(
            r#"
            [grpc]
            port = 4242

            [exporter]
            port = 4242
            "#,
        );
        let config = read_config(file.path()).unwrap();
        assert_eq!(config.exporter.port, 4242);
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_invalid_values() {
        let file = write_config(
            r#"
            [shutdown]
            grace_period_secs = 0
            "#,
        );
        match load_config(file.path()).unwrap_err() {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "shutdown.grace_period_secs");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
