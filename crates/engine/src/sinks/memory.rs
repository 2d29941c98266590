//! MemorySink - keeps deploy log lines in memory

use std::sync::{Arc, Mutex, PoisonError};

use contracts::{CommandLogEntry, ContractError, LogSink};

/// Sink collecting formatted lines; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    name: String,
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Arc::default(),
        }
    }

    /// Lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, entry: &CommandLogEntry) -> Result<(), ContractError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.to_string());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
