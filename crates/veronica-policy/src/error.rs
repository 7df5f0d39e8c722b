/// Errors that can occur in policy components.
///
/// Ordinary policy denials are Decision values, not errors; these are
/// infrastructure and contract failures only.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The distributed budget backend failed and fallback was disabled.
    #[error("backend error: {0}")]
    Backend(String),

    /// A policy configuration value violates its contract.
    #[error("invalid policy config: {field}: {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was refused.
        reason: String,
    },

    /// An imported control state was rejected.
    #[error("invalid control state: {0}")]
    InvalidControlState(String),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
