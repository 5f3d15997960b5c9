//! Command-line arguments.
//!
//! Flags override the matching values of the configuration file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::validation::validate_config;
use crate::config::{read_config, ConfigError, HostConfig};

pub const DEFAULT_CONFIG_PATH: &str = "./config/config.toml";

#[derive(Debug, Parser)]
#[command(name = "service-host")]
#[command(about = "Hosts registered services behind a gRPC server and a metrics exporter", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// gRPC listening host [default: 127.0.0.1]
    #[arg(long)]
    pub grpc_host: Option<String>,

    /// gRPC listening port [default: 42001]
    #[arg(long)]
    pub grpc_port: Option<u16>,

    /// Exporter listening host [default: 127.0.0.1]
    #[arg(long)]
    pub exporter_host: Option<String>,

    /// Exporter listening port [default: 4242]
    #[arg(long)]
    pub exporter_port: Option<u16>,

    /// Exporter scrape path [default: /metrics]
    #[arg(long)]
    pub exporter_path: Option<String>,

    /// Exporter upkeep interval in seconds [default: 1]
    #[arg(long)]
    pub exporter_interval: Option<u64>,
}

impl Cli {
    /// Read the configuration file, apply the flags, then validate the result.
    pub fn load_config(&self) -> Result<HostConfig, ConfigError> {
        let mut config = read_config(&self.config)?;
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Apply every flag given on the command line to `config`.
    pub fn apply(&self, config: &mut HostConfig) {
        if let Some(host) = &self.grpc_host {
            config.grpc.host = host.clone();
        }
        if let Some(port) = self.grpc_port {
            config.grpc.port = port;
        }
        if let Some(host) = &self.exporter_host {
            config.exporter.host = host.clone();
        }
        if let Some(port) = self.exporter_port {
            config.exporter.port = port;
        }
        if let Some(path) = &self.exporter_path {
            config.exporter.path = path.clone();
        }
        if let Some(interval) = self.exporter_interval {
            config.exporter.interval_secs = interval;
        }
    }
}
