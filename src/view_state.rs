//! Latest-call-wins holder for aggregation results.
//!
//! Aggregation calls are never cancelled, so a slow call can finish after a
//! newer one. Callers take a [`Ticket`] before starting a call and hand it
//! back with the result; results from superseded tickets are dropped.
//!
//! The holder also tracks whether the newest call is still running, so a
//! periodic caller can wait for it instead of superseding it.

use std::sync::Mutex;
use tracing::debug;

/// Marks one aggregation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug)]
struct State<T> {
    generation: u64,
    pending: bool,
    current: Option<T>,
}

/// Keeps only the result of the most recently started call.
#[derive(Debug)]
pub struct LatestOnly<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for LatestOnly<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                generation: 0,
                pending: false,
                current: None,
            }),
        }
    }
}

impl<T: Clone> LatestOnly<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a new call, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        let mut state = self.lock();
        state.generation += 1;
        state.pending = true;
        Ticket(state.generation)
    }

    /// Whether the newest call has neither completed nor been abandoned.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Store `value` if `ticket` is still the newest. Returns whether it was kept.
    pub fn complete(&self, ticket: Ticket, value: T) -> bool {
        let mut state = self.lock();
        if ticket.0 != state.generation {
            debug!(
                "Discarding result of call {} (latest is {})",
                ticket.0, state.generation
            );
            return false;
        }
        state.current = Some(value);
        state.pending = false;
        true
    }

    /// Settle `ticket` without a value. Returns whether it was the newest.
    pub fn abandon(&self, ticket: Ticket) -> bool {
        let mut state = self.lock();
        if ticket.0 != state.generation {
            return false;
        }
        state.pending = false;
        true
    }

    /// The last accepted value.
    pub fn current(&self) -> Option<T> {
        self.lock().current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_result_is_kept() {
        let latest = LatestOnly::new();
        let ticket = latest.begin();
        assert!(latest.complete(ticket, "first"));
        assert_eq!(latest.current(), Some("first"));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let latest = LatestOnly::new();
        let slow = latest.begin();
        let fast = latest.begin();

        assert!(latest.complete(fast, "fresh"));
        assert!(!latest.complete(slow, "stale"));
        assert_eq!(latest.current(), Some("fresh"));
    }

    #[test]
    fn test_superseded_before_any_result() {
        let latest: LatestOnly<u32> = LatestOnly::new();
        let old = latest.begin();
        let _new = latest.begin();
        assert!(!latest.complete(old, 1));
        assert_eq!(latest.current(), None);
    }

    #[test]
    fn test_pending_until_settled() {
        let latest: LatestOnly<u32> = LatestOnly::new();
        assert!(!latest.is_pending());

        let ticket = latest.begin();
        assert!(latest.is_pending());
        assert!(latest.complete(ticket, 7));
        assert!(!latest.is_pending());

        let failed = latest.begin();
        assert!(latest.abandon(failed));
        assert!(!latest.is_pending());
        assert_eq!(latest.current(), Some(7));
    }

    #[test]
    fn test_slow_call_still_lands_when_callers_wait() {
        // A periodic caller that skips ticks while a call is pending never
        // supersedes it, however long it takes.
        let latest = LatestOnly::new();
        let slow = latest.begin();
        for _ in 0..3 {
            if !latest.is_pending() {
                latest.begin();
            }
        }
        assert!(latest.complete(slow, "slow"));
        assert_eq!(latest.current(), Some("slow"));
    }

    #[test]
    fn test_abandoning_stale_ticket_keeps_newer_pending() {
        let latest: LatestOnly<u32> = LatestOnly::new();
        let old = latest.begin();
        let _new = latest.begin();
        assert!(!latest.abandon(old));
        assert!(latest.is_pending());
    }
}
