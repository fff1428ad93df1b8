//! Trailing-edge debounce for coalescing bursts of state changes.
//!
//! Log events can arrive hundreds of times per second during a build;
//! display adapters should re-render once per quiet period instead.
//! Debouncing only affects when a refresh happens, never what it shows:
//! the refresh after the last event always reads the current state.

use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Timer-reset-on-event debounce state.
///
/// Pure bookkeeping over caller-supplied instants, usable from any
/// scheduling context. Every recorded event pushes the single pending
/// deadline out by one quiet period; the emit is due once the deadline
/// passes.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Notes an input event, rescheduling the pending emit.
    pub fn record_event(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    /// True when a quiet period has elapsed since the last recorded event.
    pub fn should_emit(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// The instant the pending emit becomes due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Marks the pending emit as delivered.
    pub fn settle(&mut self) {
        self.deadline = None;
    }
}

/// Outcome of waiting for a coalesced change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceOutcome {
    /// At least one change arrived and the quiet period elapsed after the
    /// last one.
    Settled,
    /// The channel closed before any change arrived.
    Closed,
}

/// Waits for the next burst of change notifications on `rx` and resolves
/// one quiet period after the burst's last event.
///
/// A sender that goes away mid-burst settles immediately: the last observed
/// change is final. Intended for store revision channels
/// ([`crate::store::BuildStateStore::subscribe_changes`]): on `Settled`,
/// read the store and render.
pub async fn next_coalesced(rx: &mut watch::Receiver<u64>, quiet: Duration) -> CoalesceOutcome {
    if rx.changed().await.is_err() {
        return CoalesceOutcome::Closed;
    }
    loop {
        match tokio::time::timeout(quiet, rx.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => return CoalesceOutcome::Settled,
            Err(_) => return CoalesceOutcome::Settled,
        }
    }
}
