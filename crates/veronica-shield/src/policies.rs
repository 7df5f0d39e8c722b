//! Built-in policy hooks.

use veronica_core::CallContext;

use crate::hook::{ShieldHook, Verdict};

/// Maximum accepted outbound URL length in characters.
pub const MAX_URL_LEN: usize = 2048;

/// Egress hook that quarantines calls whose outbound URL is oversized.
///
/// Oversized URLs are a common smuggling vector for exfiltrated content;
/// the call is quarantined rather than halted so an operator can inspect it.
#[derive(Debug, Clone, Default)]
pub struct UrlLengthPolicy {
    max_len: usize,
}

impl UrlLengthPolicy {
    /// Create the policy with the default limit of [`MAX_URL_LEN`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_len: MAX_URL_LEN,
        }
    }

    /// Create the policy with a custom limit.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl ShieldHook for UrlLengthPolicy {
    fn name(&self) -> &str {
        "url_length_policy"
    }

    fn on_egress(&self, ctx: &CallContext) -> Option<Verdict> {
        let url = ctx.url.as_deref()?;
        let max = if self.max_len == 0 {
            MAX_URL_LEN
        } else {
            self.max_len
        };
        if url.chars().count() > max {
            return Some(
                Verdict::quarantine(format!("url length {} exceeds {max}", url.chars().count()))
                    .with_event_type("url_too_long"),
            );
        }
        None
    }
}
