//! OS signal handling.
//!
//! # Responsibilities
//! - Observe SIGINT/SIGTERM (Ctrl-C where unix signals are unavailable)
//! - Turn the first one into a single-fire cancellation
//! - Allow the same cancellation to be triggered from inside the process
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The watcher task exits after the first signal; later signals are absorbed
//!   by Tokio's handler and never fire twice

use tokio_util::sync::CancellationToken;

/// Single-use shutdown notification source.
#[derive(Debug, Clone)]
pub struct SignalWatcher {
    token: CancellationToken,
}

impl SignalWatcher {
    /// Start observing termination signals on a background task.
    ///
    /// Handlers are installed before this returns. Must be called from within
    /// a Tokio runtime.
    pub fn watch() -> Self {
        let watcher = Self::manual();
        let token = watcher.token.clone();
        let signals = TerminationSignals::install();

        tokio::spawn(async move {
            let mut signals = match signals {
                Ok(signals) => signals,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for shutdown signals");
                    token.cancel();
                    return;
                }
            };

            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Ok(name) => tracing::info!(signal = name, "Shutdown signal received"),
                        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
                    }
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });

        watcher
    }

    /// A watcher that only fires through [`SignalWatcher::trigger`].
    pub fn manual() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Fire the notification from inside the process.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the notification has fired.
    pub async fn done(&self) {
        self.token.cancelled().await
    }
}

#[cfg(unix)]
struct TerminationSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok("SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }
}

#[cfg(not(unix))]
struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
