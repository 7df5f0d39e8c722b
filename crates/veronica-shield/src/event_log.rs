//! Per-chain append-only event log.

use std::sync::Mutex;

use veronica_core::SafetyEvent;

/// Append-only log of safety events for one chain.
///
/// Writers append, readers drain. The log is never included in persisted
/// SAFE_MODE state; it lives and dies with the chain.
#[derive(Debug, Default)]
pub struct ChainEventLog {
    events: Mutex<Vec<SafetyEvent>>,
}

impl ChainEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn append(&self, event: SafetyEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| {
            tracing::warn!("ChainEventLog lock poisoned, recovering");
            e.into_inner()
        });
        events.push(event);
    }

    /// Append a batch of events, preserving order.
    pub fn extend(&self, batch: impl IntoIterator<Item = SafetyEvent>) {
        let mut events = self.events.lock().unwrap_or_else(|e| {
            tracing::warn!("ChainEventLog lock poisoned, recovering");
            e.into_inner()
        });
        events.extend(batch);
    }

    /// Remove and return all logged events.
    #[must_use]
    pub fn drain(&self) -> Vec<SafetyEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| {
            tracing::warn!("ChainEventLog lock poisoned, recovering");
            e.into_inner()
        });
        std::mem::take(&mut *events)
    }

    /// Clone the current contents without draining.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SafetyEvent> {
        let events = self.events.lock().unwrap_or_else(|e| {
            tracing::warn!("ChainEventLog lock poisoned, recovering");
            e.into_inner()
        });
        events.clone()
    }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veronica_core::Decision;

    #[test]
    fn test_append_and_drain() {
        let log = ChainEventLog::new();
        log.append(SafetyEvent::new("a", Decision::Halt, "h", "r"));
        log.append(SafetyEvent::new("b", Decision::Allow, "h", "r"));
        assert_eq!(log.len(), 2);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event_type, "a");
        assert!(log.is_empty());
    }

    #[test]
    fn test_snapshot_does_not_drain() {
        let log = ChainEventLog::new();
        log.append(SafetyEvent::new("a", Decision::Halt, "h", "r"));
        assert_eq!(log.snapshot().len(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_extend_preserves_order() {
        let log = ChainEventLog::new();
        log.extend(vec![
            SafetyEvent::new("first", Decision::Allow, "h", "r"),
            SafetyEvent::new("second", Decision::Allow, "h", "r"),
        ]);
        let events = log.drain();
        assert_eq!(events[0].event_type, "first");
        assert_eq!(events[1].event_type, "second");
    }
}
