//! Host metrics.
//!
//! # Metrics
//! - `service_host_services_active` (gauge): services constructed from config
//! - `service_host_server_starts_total` (counter): successful starts by server
//! - `service_host_server_start_failures_total` (counter): failed starts by server
//! - `service_host_shutdown_duration_seconds` (histogram): time spent in `stop_all`
//! - `service_host_shutdown_timeouts_total` (counter): servers abandoned after the grace period
//! - `service_host_uptime_seconds` (gauge): refreshed by the exporter upkeep loop

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusRecorder;

/// Install the process-wide recorder. Returns `false` if one is already set.
pub fn install_recorder(recorder: PrometheusRecorder) -> bool {
    ::metrics::set_global_recorder(recorder).is_ok()
}

pub fn record_services_active(count: usize) {
    gauge!("service_host_services_active").set(count as f64);
}

pub fn record_server_started(server: &str) {
    counter!("service_host_server_starts_total", "server" => server.to_string()).increment(1);
}

pub fn record_server_start_failed(server: &str) {
    counter!("service_host_server_start_failures_total", "server" => server.to_string())
        .increment(1);
}

pub fn record_shutdown(duration: Duration, timed_out: &[String]) {
    histogram!("service_host_shutdown_duration_seconds").record(duration.as_secs_f64());
    for server in timed_out {
        counter!("service_host_shutdown_timeouts_total", "server" => server.clone()).increment(1);
    }
}

pub fn record_uptime(uptime: Duration) {
    gauge!("service_host_uptime_seconds").set(uptime.as_secs_f64());
}
