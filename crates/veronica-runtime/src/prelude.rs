//! Convenience re-exports for embedders.

pub use crate::context::{CallOutcome, ChildOverrides, ExecutionContext};
pub use crate::options::{CallOptions, ProviderUsage};
pub use crate::pricing::{ModelPricing, PricingTable};
pub use crate::retry::RetryPolicy;

pub use veronica_core::prelude::*;
pub use veronica_graph::prelude::*;
pub use veronica_policy::prelude::*;
pub use veronica_safemode::prelude::*;
pub use veronica_shield::prelude::*;
