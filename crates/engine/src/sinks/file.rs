//! FileSink - appends deploy log lines to a file

use std::path::{Path, PathBuf};

use contracts::{CommandLogEntry, ContractError, LogSink};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

/// Sink that appends one line per command to a log file
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            name: name.into(),
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, entry: &CommandLogEntry) -> Result<(), ContractError> {
        let line = format!("{entry}\n");
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer.flush().await?;
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self), fields(path = %self.path.display()))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush().await?;
        debug!("FileSink closed");
        Ok(())
    }
}
