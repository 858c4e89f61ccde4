//! Typing indicator state machines.
//!
//! [`LocalTyping`] drives outbound typing signals from keystrokes: the
//! Idle→Typing edge emits `typing_start` immediately, a single trailing
//! deadline emits `typing_stop` after the idle window, and blur / send /
//! room switch force the stop early. [`RemoteTyping`] aggregates inbound
//! indicators per display name with a TTL safety net against dropped stop
//! signals.
//!
//! Both machines are pure: they take `now` explicitly and own no timers.
//! The driver sleeps until [`LocalTyping::deadline`] /
//! [`RemoteTyping::next_expiry`] and calls the `tick` methods when the
//! deadline elapses.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Local debounce state machine for the user's own typing signals.
///
/// Idle ⇄ Typing. The Typing state is exactly "a deadline is armed"; every
/// keystroke replaces the deadline atomically, so there is never more than
/// one pending stop.
#[derive(Debug)]
pub(crate) struct LocalTyping {
    idle_after: Duration,
    deadline: Option<Instant>,
}

impl LocalTyping {
    pub(crate) fn new(idle_after: Duration) -> Self {
        Self {
            idle_after,
            deadline: None,
        }
    }

    /// Record a keystroke. Returns `true` when this keystroke crossed the
    /// Idle→Typing edge and a `typing_start` signal must be emitted.
    pub(crate) fn keystroke(&mut self, now: Instant) -> bool {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(now + self.idle_after);
        was_idle
    }

    /// Force the machine back to Idle (blur, send, room switch, teardown).
    /// Returns `true` when a `typing_stop` signal must be emitted.
    pub(crate) fn force_stop(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// The instant at which the trailing stop fires, if currently Typing.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Advance the machine. Returns `true` when the idle window elapsed and
    /// a `typing_stop` signal must be emitted.
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Aggregated set of remote participants currently typing in the active room.
///
/// Every name expires `ttl` after its most recent `typing_start`, even when
/// the matching stop signal never arrives.
#[derive(Debug)]
pub(crate) struct RemoteTyping {
    ttl: Duration,
    entries: HashMap<String, Instant>,
}

impl RemoteTyping {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Apply an inbound indicator. Returns `true` when the visible set
    /// changed. A refresh of an already-typing name extends its expiry but
    /// reports no change.
    pub(crate) fn apply(&mut self, name: &str, is_typing: bool, now: Instant) -> bool {
        if is_typing {
            self.entries
                .insert(name.to_string(), now + self.ttl)
                .is_none()
        } else {
            self.entries.remove(name).is_some()
        }
    }

    /// Drop names whose TTL elapsed. Returns `true` when the set changed.
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        self.entries.len() != before
    }

    /// The earliest pending expiry, if any name is typing.
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.entries.values().min().copied()
    }

    /// Drop every name (room switch, teardown). Returns `true` when the set
    /// was non-empty.
    pub(crate) fn clear(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }

    /// Currently typing display names, sorted for stable presentation.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
