//! # Engine
//!
//! Runs a `Plan` against a set of targets.
//!
//! - Stages run sequentially in plan order
//! - Within a stage, targets run concurrently, bounded by `parallelism`
//! - Failure policies (`abort` / `continue` / `rollback-to-previous`) are
//!   applied per target
//! - Cleanup stages run for every selected target regardless of earlier
//!   failures, unless the run was cancelled
//! - Every command produces one deploy log line, fanned out to log sinks
//!
//! ## Usage
//!
//! ```ignore
//! let engine = Engine::builder(ShellConnector::new(source_dir, retry))
//!     .secrets(Arc::new(EnvSecretProvider::new()))
//!     .config(EngineConfig::from_settings(&plan.settings))
//!     .log_sink(TracingSink::new("tracing"))
//!     .build();
//!
//! let (handle, token) = cancellation();
//! let report = engine.run(&plan, &targets, token).await?;
//! engine.shutdown().await;
//! ```

mod cancel;
mod config;
mod engine;
mod error;
mod executor;
mod handle;
mod log;
mod metrics;
mod schedule;
pub mod sinks;

pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::EngineError;
pub use handle::{LogFanout, SinkHandle, DEFAULT_SINK_CAPACITY};
pub use log::ExecutionLog;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use schedule::{schedule, ScheduledStage};
pub use sinks::{FileSink, MemorySink, TracingSink};
