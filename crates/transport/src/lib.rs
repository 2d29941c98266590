//! # Transport
//!
//! "Run a command on host X" and "copy a file to host X".
//!
//! Responsibilities:
//! - Define the `Transport` capability and the `Connector` that produces it
//! - Local shell and secure remote shell (`ssh` / `scp`) implementations
//! - Bounded connection retries (`RetryPolicy`)
//! - Mock transport with injectable failures for tests and demos
//! - Secret and source checkout providers used before and during a run
//!
//! Connection failures are reported as `TransportError`; a command that runs
//! and exits non-zero is a successful transport call with a failing
//! `CommandOutput`.

pub mod client;
pub mod connector;
pub mod error;
pub mod local;
pub mod mock;
pub mod retry;
pub mod secrets;
pub mod source;
pub mod ssh;

pub use client::{CommandOutput, Connector, Transport};
pub use connector::{AnyTransport, ShellConnector};
pub use error::{Result, TransportError};
pub use local::LocalShell;
pub use mock::{MockConfig, MockConnector, MockTransport};
pub use retry::RetryPolicy;
pub use secrets::{EnvSecretProvider, StaticSecretProvider};
pub use source::{fetch_declared, GitSource, LocalSource, SourceProvider};
pub use ssh::{SshPrograms, SshTransport};
