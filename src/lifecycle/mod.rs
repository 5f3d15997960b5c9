//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve services → Attach to servers → Register for shutdown → Start servers
//!
//! Shutdown (shutdown.rs):
//!     Notification fired → Stop all servers → Abort stragglers after grace period
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Single-fire shutdown notification
//! ```
//!
//! # Design Decisions
//! - Ordered startup: services first, then exporter, then gRPC
//! - Every server is tracked for shutdown before the first one starts
//! - Shutdown has one process-wide grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use signals::SignalWatcher;
pub use startup::{AppError, AppState, Application};
