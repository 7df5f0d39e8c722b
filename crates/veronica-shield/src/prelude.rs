//! Convenience re-exports for downstream crates.

pub use crate::event_log::ChainEventLog;
pub use crate::hook::{HookBoundary, ShieldHook, Verdict};
pub use crate::pipeline::ShieldPipeline;
pub use crate::policies::UrlLengthPolicy;
