//! Deadline bookkeeping for the engine
//!
//! The engine owns no clock. Each timer is an [`Instant`] deadline; the
//! driver sleeps until [`Timers::next_deadline`] and hands expired timers
//! back to the engine.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Shared debounce for container and grid size changes
    ResizeDebounce,
    /// Delay between replay completion and the final fit
    FitSettle,
    /// Delay between Ready and the initial prompt
    PromptSettle,
}

#[derive(Debug, Default)]
pub struct Timers {
    armed: Vec<(TimerKind, Instant)>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `after` from `now`, replacing any earlier deadline
    pub fn arm(&mut self, kind: TimerKind, now: Instant, after: Duration) {
        self.cancel(kind);
        self.armed.push((kind, now + after));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.armed.retain(|(k, _)| *k != kind);
    }

    pub fn clear(&mut self) {
        self.armed.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.iter().any(|(k, _)| *k == kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.iter().map(|(_, at)| *at).min()
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn take_expired(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(TimerKind, Instant)> = Vec::new();
        self.armed.retain(|&(kind, at)| {
            if at <= now {
                due.push((kind, at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(kind, _)| kind).collect()
    }
}
