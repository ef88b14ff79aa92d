//! Domain-level error taxonomy for spinneret.
//!
//! Program-logic faults in generated spiders are NOT errors — they are
//! expressed as [`Outcome`](crate::domain::outcome::Outcome) classifications
//! and drive the repair loop. Everything here is an infrastructure fault
//! that terminates a task as `Aborted`.

/// Spinneret domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SpinneretError {
    #[error("invalid field spec: {0}")]
    InvalidFieldSpec(String),

    #[error("invalid task configuration: {0}")]
    InvalidConfig(String),

    #[error("task not ready: {0}")]
    TaskNotReady(String),

    #[error("candidate version skew: expected generation {expected}, got {actual}")]
    VersionSkew { expected: u32, actual: u32 },

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("synthesis service error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for spinneret domain operations.
pub type Result<T> = std::result::Result<T, SpinneretError>;
