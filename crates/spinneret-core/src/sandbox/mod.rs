//! Execution sandbox: bounded, captured runs of generated programs.
//!
//! A candidate runs as a child process in its project directory. In testing
//! mode a wall-clock budget applies; on expiry the child is force-killed and
//! whatever output was captured still produces a classified
//! [`ExecutionResult`](crate::domain::ExecutionResult). Release runs pass no
//! timeout.
//!
//! # Modules
//!
//! - [`runner`] — `ProgramRunner` trait, `RunnerConfig`, `ProcessSandbox`
//! - [`error`]  — `SandboxError` / `SandboxResult`

pub mod error;
pub mod runner;

pub use error::{SandboxError, SandboxResult};
pub use runner::{ProcessSandbox, ProgramRunner, RunnerConfig};
