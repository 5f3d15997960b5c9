//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (cli.rs)
//!     → validation.rs (semantic checks, once, on the merged config)
//!     → HostConfig (validated, immutable)
//!     → shared via Arc with the application
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Per-service sections stay opaque until the service's own constructor reads them

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    ExporterConfig, GrpcConfig, HostConfig, LogFormat, ObservabilityConfig, ShutdownConfig,
};
