//! Veronica Shield - the composable policy pipeline.
//!
//! Policy hooks implement [`ShieldHook`] and are registered on a
//! [`ShieldPipeline`]. The pipeline evaluates hooks in registration order at
//! six call boundaries (pre-LLM, pre-tool, tool dispatch, egress, retry,
//! charge); the first non-ALLOW verdict wins and is recorded as a
//! [`veronica_core::SafetyEvent`] in the chain's append-only event log.
//!
//! Hooks own their internal state; the pipeline holds no global lock during
//! evaluation.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod event_log;
pub mod hook;
pub mod pipeline;
pub mod policies;

pub use event_log::ChainEventLog;
pub use hook::{HookBoundary, ShieldHook, Verdict};
pub use pipeline::ShieldPipeline;
pub use policies::{UrlLengthPolicy, MAX_URL_LEN};
