//! Convenience re-exports for downstream crates.

pub use crate::call::{CallContext, CallKind};
pub use crate::config::ExecutionConfig;
pub use crate::decision::{CircuitState, Decision, DegradationLevel};
pub use crate::error::{KernelError, KernelResult};
pub use crate::event::SafetyEvent;
pub use crate::identity::{ChainId, RequestId};
pub use crate::metadata::ChainMetadata;
