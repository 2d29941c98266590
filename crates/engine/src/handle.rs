//! SinkHandle - one log sink behind its own queue and worker task

use std::sync::Arc;

use contracts::{CommandLogEntry, LogSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// Default queue capacity per sink
pub const DEFAULT_SINK_CAPACITY: usize = 256;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<CommandLogEntry>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a SinkHandle and spawn its worker task
    pub fn spawn<S: LogSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue an entry, waiting for room
    ///
    /// Log lines are never dropped; a slow sink applies backpressure.
    pub async fn send(&self, entry: CommandLogEntry) {
        if self.tx.send(entry).await.is_err() {
            error!(sink = %self.name, "Sink worker closed unexpectedly");
            return;
        }
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
    }

    /// Drain the queue, flush and close the sink
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes entries and writes them to the sink
#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: LogSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<CommandLogEntry>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("Sink worker started");

    while let Some(entry) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&entry).await {
            Ok(()) => {
                metrics.inc_write_count();
                observability::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_sink_write(&name, false);
                error!(
                    target_name = %entry.target,
                    stage = %entry.stage,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "Close failed on shutdown");
    }

    debug!("Sink worker stopped");
}

/// Fan-out of deploy log entries to every registered sink
#[derive(Default)]
pub struct LogFanout {
    handles: Vec<SinkHandle>,
}

impl LogFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a worker for `sink` and register it
    pub fn add<S: LogSink + Send + 'static>(&mut self, sink: S, queue_capacity: usize) {
        self.handles.push(SinkHandle::spawn(sink, queue_capacity));
    }

    pub fn with_sink<S: LogSink + Send + 'static>(mut self, sink: S) -> Self {
        self.add(sink, DEFAULT_SINK_CAPACITY);
        self
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Deliver an entry to every sink
    pub async fn emit(&self, entry: CommandLogEntry) {
        if let Some((last, rest)) = self.handles.split_last() {
            for handle in rest {
                handle.send(entry.clone()).await;
            }
            last.send(entry).await;
        }
    }

    /// Shut every sink down, flushing pending entries
    ///
    /// Returns each sink's final counters, taken after its queue drained.
    pub async fn shutdown(self) -> Vec<(String, MetricsSnapshot)> {
        let mut totals = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let metrics = Arc::clone(handle.metrics());
            handle.shutdown().await;
            totals.push((name, metrics.snapshot()));
        }
        totals
    }
}
