//! Prometheus metrics exporter.
//!
//! # Responsibilities
//! - Own the process metrics recorder
//! - Serve the scrape output on the configured path
//! - Run recorder upkeep on the configured interval
//!
//! # Design Decisions
//! - Served through axum rather than the exporter's built-in listener so the
//!   bind error and the shutdown path look like every other server
//! - Only the first exporter in a process becomes the global recorder; later
//!   ones render their own (empty) recorder

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::validation::check_route_path;
use crate::config::ExporterConfig;
use crate::observability::metrics;
use crate::server::{resolve_bind_address, Server, ServerError, ServerState};

struct Inner {
    state: ServerState,
    local_addr: Option<SocketAddr>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<std::io::Result<()>>>,
    aborts: Vec<AbortHandle>,
}

/// HTTP endpoint exposing the metrics recorder in Prometheus text format.
pub struct MetricsExporter {
    name: String,
    address: String,
    path: String,
    interval: Duration,
    handle: PrometheusHandle,
    inner: Mutex<Inner>,
}

impl MetricsExporter {
    pub fn new(config: &ExporterConfig) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::install_recorder(recorder) {
            tracing::debug!("Prometheus recorder installed");
        } else {
            tracing::debug!("Metrics recorder already installed, exporter renders its own recorder");
        }

        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };

        Self {
            name: "exporter".to_string(),
            address: config.bind_address(),
            path,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            handle,
            inner: Mutex::new(Inner {
                state: ServerState::Stopped,
                local_addr: None,
                cancel: None,
                task: None,
                aborts: Vec::new(),
            }),
        }
    }

    /// Current scrape output.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Path the scrape output is served on.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn router(&self) -> Result<Router, ServerError> {
        check_route_path(&self.path).map_err(|reason| ServerError::Route {
            server: self.name.clone(),
            path: self.path.clone(),
            reason: reason.to_string(),
        })?;

        Ok(Router::new()
            .route(&self.path, get(scrape))
            .with_state(self.handle.clone())
            .layer(TraceLayer::new_for_http()))
    }
}

async fn scrape(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

async fn upkeep(handle: PrometheusHandle, interval: Duration, cancel: CancellationToken) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                metrics::record_uptime(started.elapsed());
                handle.run_upkeep();
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Exporter upkeep stopped");
                break;
            }
        }
    }
}

#[async_trait]
impl Server for MetricsExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServerState {
        self.lock().state
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().local_addr
    }

    async fn start(&self) -> Result<(), ServerError> {
        {
            let mut inner = self.lock();
            if inner.state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning(self.name.clone()));
            }
            inner.state = ServerState::Running;
        }

        let app = match self.router() {
            Ok(app) => app,
            Err(e) => {
                self.lock().state = ServerState::Stopped;
                return Err(e);
            }
        };

        let bound = async {
            let addr = resolve_bind_address(&self.name, &self.address).await?;
            let bind_error = |source| ServerError::Bind {
                server: self.name.clone(),
                address: self.address.clone(),
                source,
            };
            let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
            let local_addr = listener.local_addr().map_err(bind_error)?;
            Ok::<_, ServerError>((listener, local_addr))
        }
        .await;

        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.lock().state = ServerState::Stopped;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });
        let ticker = tokio::spawn(upkeep(self.handle.clone(), self.interval, cancel.clone()));

        {
            let mut inner = self.lock();
            inner.local_addr = Some(local_addr);
            inner.cancel = Some(cancel);
            inner.aborts = vec![task.abort_handle(), ticker.abort_handle()];
            inner.task = Some(task);
        }

        tracing::info!(
            server = %self.name,
            address = %local_addr,
            path = %self.path,
            interval_secs = self.interval.as_secs(),
            "Metrics exporter listening"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        let (cancel, task) = {
            let mut inner = self.lock();
            if inner.state != ServerState::Running {
                return Ok(());
            }
            inner.state = ServerState::Stopping;
            (inner.cancel.take(), inner.task.take())
        };

        tracing::info!(server = %self.name, "Metrics exporter stopping");

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let result = match task {
            Some(task) => match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Serve {
                    server: self.name.clone(),
                    message: e.to_string(),
                }),
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(ServerError::Serve {
                    server: self.name.clone(),
                    message: e.to_string(),
                }),
            },
            None => Ok(()),
        };

        {
            let mut inner = self.lock();
            inner.state = ServerState::Stopped;
            inner.local_addr = None;
            inner.aborts.clear();
        }

        tracing::info!(server = %self.name, "Metrics exporter stopped");
        result
    }

    fn abort(&self) {
        let mut inner = self.lock();
        for handle in inner.aborts.drain(..) {
            handle.abort();
        }
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.task = None;
        inner.local_addr = None;
        inner.state = ServerState::Stopped;
        tracing::warn!(server = %self.name, "Metrics exporter aborted");
    }
}
