//! The kernel's narrow environment surface.
//!
//! Exactly two toggles are consulted; no other environment variables are
//! read by the core. Both accept `1`, `true`, `yes`, or `on`
//! (case-insensitive) as truthy.

/// Forces the kernel into SAFE_MODE at load, regardless of persisted state.
pub const FORCE_SAFE_MODE_ENV: &str = "VERONICA_FORCE_SAFE_MODE";

/// Disables input compression in embedders that implement it.
pub const DISABLE_COMPRESSION_ENV: &str = "VERONICA_DISABLE_COMPRESSION";

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whether the operator forced SAFE_MODE via the environment.
#[must_use]
pub fn force_safe_mode_from_env() -> bool {
    std::env::var(FORCE_SAFE_MODE_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Whether input compression is disabled via the environment.
#[must_use]
pub fn compression_disabled_from_env() -> bool {
    std::env::var(DISABLE_COMPRESSION_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}
