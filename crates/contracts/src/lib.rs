//! # Contracts
//!
//! Frozen interface contracts shared by every deploy crate: the plan model,
//! execution results, the deploy log line, credential handles and errors.
//! Business crates depend on this crate, never the other way around.
//!
//! ## Ownership
//! - `Plan` (and its `Stage`s / `Target`s) is immutable once loaded
//! - `ExecutionResult`s are created by the engine and never mutated after
//!   being appended to the execution log

mod error;
mod log_entry;
mod plan;
mod result;
mod secret;
mod sink;
mod stage;
mod target;

pub use error::*;
pub use log_entry::*;
pub use plan::*;
pub use result::*;
pub use secret::{CredentialHandle, SecretProvider};
pub use sink::*;
pub use stage::*;
pub use target::*;
