/// Errors that can occur in the containment kernel.
///
/// Policy denials are not errors — they are [`crate::Decision`] values.
/// Errors here are programmer contract violations and infrastructure
/// failures only.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A configuration value violates its contract.
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was refused.
        reason: String,
    },

    /// A graph operation referenced a node that does not exist.
    #[error("unknown node: {node_id}")]
    UnknownNode {
        /// The id that failed to resolve.
        node_id: String,
    },

    /// A second root was created, or a root operation ran without one.
    #[error("root violation: {0}")]
    RootViolation(String),

    /// Persistence of kernel state failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A cross-process budget backend failed and fallback was disabled.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
