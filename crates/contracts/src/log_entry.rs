//! Deploy log line
//!
//! One line per executed command:
//! `<ISO8601 timestamp> <target> <stage> <exit-code> <duration-ms>`

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Exit code written when a command produced none (timeout, transport failure)
pub const NO_EXIT_CODE: i32 = -1;

/// Log record for a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub stage: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Rendered command, kept for structured sinks only
    pub command: String,
}

impl fmt::Display for CommandLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.target,
            self.stage,
            self.exit_code.unwrap_or(NO_EXIT_CODE),
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn line_format() {
        let entry = CommandLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            target: "web-1".into(),
            stage: "build".into(),
            exit_code: Some(0),
            duration_ms: 1532,
            command: "docker compose build".into(),
        };
        assert_eq!(entry.to_string(), "2024-05-01T12:30:00.000Z web-1 build 0 1532");
    }

    #[test]
    fn missing_exit_code_prints_sentinel() {
        let entry = CommandLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            target: "web-1".into(),
            stage: "up".into(),
            exit_code: None,
            duration_ms: 10,
            command: "docker compose up -d".into(),
        };
        assert!(entry.to_string().ends_with(" up -1 10"));
    }
}
