//! External process execution and output interpretation
//!
//! - [`AsyncPipeReader`]: drains a child pipe on a background task
//! - [`StdoutParser`]: turns the tool's stdout lines into [`DlStat`](crate::DlStat)
//!   snapshots and confirmation actions
//! - [`StderrClassifier`]: sorts stderr lines into warnings and errors
//! - [`Outcome`]: the per-run severity ratchet
//! - [`ProcessAdapter`]: ties the above together for one invocation

mod adapter;
mod outcome;
mod parser;
mod pipe_reader;
mod side_files;
mod stderr;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;

pub use adapter::{AdapterContext, ProcessAdapter, RunResult, StopHandle};
pub use outcome::Outcome;
pub use parser::{LineAction, ParsedLine, StdoutParser};
pub use pipe_reader::AsyncPipeReader;
pub use side_files::SideFileWriter;
pub use stderr::{StderrClass, StderrClassifier};
