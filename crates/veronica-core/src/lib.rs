//! Veronica Core - shared types for the containment kernel.
//!
//! Every outbound LLM or tool call in a contained agent run is described,
//! judged, and accounted for using the types in this crate:
//!
//! - [`Decision`]: the closed six-valued verdict produced by policy hooks.
//! - [`SafetyEvent`]: the append-only record of a policy decision or anomaly.
//! - [`CallContext`]: the per-call descriptor handed to hooks before dispatch.
//! - [`ChainMetadata`] / [`ExecutionConfig`]: immutable chain identity and
//!   resource contract.
//!
//! The crate is deliberately leaf-level: no async, no I/O, no policy logic.
//! Enforcement lives in `veronica-shield`, `veronica-policy`, and
//! `veronica-runtime`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod call;
pub mod config;
pub mod decision;
pub mod env;
/// Error types and results for the core module.
pub mod error;
pub mod event;
pub mod identity;
pub mod metadata;

pub use call::{CallContext, CallKind};
pub use config::ExecutionConfig;
pub use decision::{CircuitState, Decision, DegradationLevel};
pub use env::{compression_disabled_from_env, force_safe_mode_from_env};
pub use error::{KernelError, KernelResult};
pub use event::{SafetyEvent, MAX_REASON_LEN};
pub use identity::{ChainId, RequestId};
pub use metadata::ChainMetadata;
