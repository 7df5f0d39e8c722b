//! Convenience re-exports for downstream crates.

pub use crate::controller::SafeModeController;
pub use crate::signals::{install_signal_handlers, SaveGuard};
pub use crate::state::{KernelState, PersistedState, StateTransition};
