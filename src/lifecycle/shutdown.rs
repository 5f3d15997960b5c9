//! Shutdown coordination for the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use crate::observability::metrics;
use crate::server::Server;

/// Outcome of [`ShutdownCoordinator::stop_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Servers that stopped cleanly.
    pub stopped: Vec<String>,
    /// Servers that stopped but reported an error.
    pub failed: Vec<(String, String)>,
    /// Servers abandoned after the grace period.
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    /// True when every server stopped without error or timeout.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

/// Tracks every server and stops them all exactly once.
pub struct ShutdownCoordinator {
    servers: Mutex<Vec<Arc<dyn Server>>>,
    grace_period: Duration,
    stopped: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            servers: Mutex::new(Vec::new()),
            grace_period,
            stopped: AtomicBool::new(false),
        }
    }

    /// Track a server. Registering the same instance twice has no effect.
    pub fn register(&self, server: Arc<dyn Server>) {
        let mut servers = self.lock();
        if servers.iter().any(|s| same_server(s, &server)) {
            return;
        }
        tracing::debug!(server = server.name(), "Server registered for shutdown");
        servers.push(server);
    }

    /// Number of tracked servers.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Stop every tracked server within the grace period.
    ///
    /// Servers still running when the period elapses are aborted and listed in
    /// [`ShutdownReport::timed_out`]. Only the first call does anything.
    pub async fn stop_all(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already performed");
            return ShutdownReport::default();
        }

        let servers: Vec<_> = self.lock().clone();
        let grace = self.grace_period;
        let started = Instant::now();

        tracing::info!(
            servers = servers.len(),
            grace_period_ms = grace.as_millis() as u64,
            "Stopping servers"
        );

        let outcomes = join_all(servers.iter().map(|server| async move {
            let outcome = tokio::time::timeout(grace, server.stop()).await;
            (server, outcome)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (server, outcome) in outcomes {
            let name = server.name().to_string();
            match outcome {
                Ok(Ok(())) => report.stopped.push(name),
                Ok(Err(e)) => {
                    tracing::error!(server = %name, error = %e, "Server stopped with error");
                    report.failed.push((name, e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(
                        server = %name,
                        grace_period_ms = grace.as_millis() as u64,
                        "Server did not stop within grace period, aborting"
                    );
                    server.abort();
                    report.timed_out.push(name);
                }
            }
        }

        metrics::record_shutdown(started.elapsed(), &report.timed_out);
        report
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Server>>> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_server(a: &Arc<dyn Server>, b: &Arc<dyn Server>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
