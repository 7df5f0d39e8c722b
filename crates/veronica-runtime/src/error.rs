use veronica_core::KernelError;
use veronica_policy::PolicyError;

/// Errors that can occur constructing or finalizing a containment scope.
///
/// Ordinary policy denials never appear here — they are returned as
/// [`crate::CallOutcome::Suppressed`] values from the wrap calls.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A kernel contract violation (invalid config, graph misuse).
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A policy component failed (backend error in strict mode).
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
