//! TracingSink - emits deploy log lines as tracing events

use contracts::{CommandLogEntry, ContractError, LogSink};
use tracing::{info, instrument, warn};

/// Sink that forwards each line to the tracing subscriber
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LogSink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, entry: &CommandLogEntry) -> Result<(), ContractError> {
        match entry.exit_code {
            Some(0) => info!(
                target: "deploy_log",
                target_name = %entry.target,
                stage = %entry.stage,
                command = %entry.command,
                "{entry}"
            ),
            _ => warn!(
                target: "deploy_log",
                target_name = %entry.target,
                stage = %entry.stage,
                command = %entry.command,
                "{entry}"
            ),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "tracing_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_tracing_sink_write() {
        let mut sink = TracingSink::new("tracing");
        let entry = CommandLogEntry {
            timestamp: Utc::now(),
            target: "web-1".into(),
            stage: "build".into(),
            exit_code: Some(1),
            duration_ms: 5,
            command: "make".into(),
        };
        assert!(sink.write(&entry).await.is_ok());
        assert!(sink.close().await.is_ok());
    }
}
