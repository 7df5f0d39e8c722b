//! Best-effort save triggers.
//!
//! Signal interception is orthogonal to the durability guarantee: the
//! handlers here only call [`SafeModeController::save`]. Hard kills cannot
//! be intercepted; the kernel bounds loss to at most one operation between
//! successful saves.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::controller::SafeModeController;

/// Install graceful-termination handlers that persist kernel state.
///
/// Spawns a background task waiting on SIGINT (and SIGTERM on unix); on
/// receipt the controller is saved once. Must be called from within a tokio
/// runtime.
pub fn install_signal_handlers(controller: Arc<SafeModeController>) {
    tokio::spawn(async move {
        wait_for_termination().await;
        debug!("Termination signal received, persisting kernel state");
        if let Err(e) = controller.save() {
            warn!(error = %e, "Failed to persist kernel state on signal");
        }
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        },
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

/// At-exit fallback: saves the controller when dropped.
///
/// Hold one in `main` (or the embedding scope) so normal unwinding persists
/// the latest state even without a signal.
#[derive(Debug)]
pub struct SaveGuard {
    controller: Arc<SafeModeController>,
}

impl SaveGuard {
    /// Create a guard for the given controller.
    #[must_use]
    pub fn new(controller: Arc<SafeModeController>) -> Self {
        Self { controller }
    }
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        if let Err(e) = self.controller.save() {
            warn!(error = %e, "Failed to persist kernel state at exit");
        }
    }
}
