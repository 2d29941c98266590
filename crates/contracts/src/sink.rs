//! LogSink trait - deploy log output interface

use crate::{CommandLogEntry, ContractError};

/// Deploy log output
///
/// All deploy log sinks implement this trait.
#[trait_variant::make(LogSink: Send)]
pub trait LocalLogSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one command log entry
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, entry: &CommandLogEntry) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
