//! Veronica Runtime - the containment scope around every outbound call.
//!
//! One [`ExecutionContext`] equals one agent run. All outbound LLM and tool
//! calls pass through [`ExecutionContext::wrap_llm_call`] or
//! [`ExecutionContext::wrap_tool_call`], which evaluate the chain's resource
//! contract, the circuit breaker, the process-wide SAFE_MODE flag, and the
//! shield pipeline — all **before** the call is dispatched. On HALT, no
//! network I/O occurs.
//!
//! Child contexts spawned with [`ExecutionContext::spawn_child`] propagate
//! every successful charge to each ancestor; an ancestor whose ceiling is
//! reached refuses its next wrapped call, in whichever context it occurs.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod context;
/// Error types and results for the runtime module.
pub mod error;
pub mod options;
pub mod pricing;
pub mod retry;

pub use context::{CallOutcome, ChildOverrides, ContextBuilder, ExecutionContext};
pub use error::{RuntimeError, RuntimeResult};
pub use options::{CallOptions, ProviderUsage};
pub use pricing::{ModelPricing, PricingTable};
pub use retry::RetryPolicy;
