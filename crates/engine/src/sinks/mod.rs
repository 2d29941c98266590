//! Deploy log sinks

mod file;
mod log;
mod memory;

pub use file::FileSink;
pub use log::TracingSink;
pub use memory::MemorySink;
