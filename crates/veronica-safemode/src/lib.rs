//! Veronica Safemode - the process-wide emergency halt.
//!
//! SAFE_MODE is an operator-triggered kill switch, orthogonal to any single
//! chain: once set, every wrapped call returns HALT regardless of budget.
//! It must survive hard kills and must not clear on restart — leaving it
//! requires an explicit operator transition back to IDLE.
//!
//! Durability rests on the tmp-rename atomic write protocol in
//! [`persistence`], not on signal handlers: handlers and the drop guard are
//! best-effort conveniences that merely trigger an extra save.
//!
//! There is no ambient global. A [`SafeModeController`] is constructed
//! explicitly and passed into each execution context.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod controller;
pub mod persistence;
pub mod signals;
pub mod state;

pub use controller::SafeModeController;
pub use persistence::{load_or_default, write_atomic};
pub use signals::{install_signal_handlers, SaveGuard};
pub use state::{KernelState, PersistedState, StateTransition};
