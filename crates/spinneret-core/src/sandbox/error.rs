//! Error types for the execution sandbox.

/// Errors produced by the sandbox layer.
///
/// These are infrastructure faults. A generated program that crashes or
/// scrapes nothing is NOT an error here — it comes back as a classified
/// [`ExecutionResult`](crate::domain::ExecutionResult).
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The execution environment itself could not run the program
    /// (missing interpreter, permission failure). Never classified as a
    /// program failure.
    #[error("execution environment unavailable: {reason}")]
    EnvironmentUnavailable { reason: String },

    #[error("io error during execution: {0}")]
    Io(#[from] std::io::Error),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
