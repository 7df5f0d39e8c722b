//! Atomic tmp-rename persistence.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::warn;
use veronica_core::{KernelError, KernelResult};

use crate::state::PersistedState;

/// Write `state` to `path` atomically.
///
/// The serialized JSON goes to `<path>.tmp`, is fsynced, and is renamed
/// over `path`. A crash between any two steps leaves the previous file
/// intact: readers see either the old content or the complete new content,
/// never a truncated file.
pub fn write_atomic(path: &Path, state: &PersistedState) -> KernelResult<()> {
    let json = serde_json::to_vec_pretty(state)
        .map_err(|e| KernelError::Persistence(format!("serialize: {e}")))?;

    let tmp = path.with_extension("tmp");
    let mut file =
        fs::File::create(&tmp).map_err(|e| KernelError::Persistence(format!("create tmp: {e}")))?;
    file.write_all(&json)
        .map_err(|e| KernelError::Persistence(format!("write tmp: {e}")))?;
    file.sync_all()
        .map_err(|e| KernelError::Persistence(format!("fsync tmp: {e}")))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| KernelError::Persistence(format!("rename: {e}")))?;
    Ok(())
}

/// Load a persisted state, tolerating absence and corruption.
///
/// A missing file yields the blank initial state. A parse failure yields
/// the blank state with a warning — the kernel never refuses to start over
/// a bad state file.
#[must_use]
pub fn load_or_default(path: &Path) -> PersistedState {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PersistedState::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read kernel state, starting blank");
            return PersistedState::default();
        },
    };
    match serde_json::from_str(&raw) {
        Ok(state) => state,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt kernel state file, starting blank");
            PersistedState::default()
        },
    }
}
