//! Connection lifecycle primitives: status, reconnect backoff, and the
//! lifecycle guard.
//!
//! The session driver owns all transitions; these types only describe the
//! policy. Status values are broadcast through a `watch` channel so
//! dependent components observe transitions without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection status of the chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport; the session has not started or has been torn down.
    #[default]
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Transport established and identity announced.
    Connected,
    /// Transport lost; automatic reconnection in progress.
    Reconnecting,
    /// Reconnection exhausted its retry budget. Only an explicit
    /// `reconnect()` leaves this state.
    Failed,
}

impl ConnectionStatus {
    /// True when signals can currently be carried over the transport.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Exponential backoff policy for reconnection attempts.
///
/// The delay before retry `n` (zero-based) is `min(base * 2^n, cap)`. After
/// `max_attempts` consecutive failures the session stops retrying and
/// surfaces a persistent failure.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Delay before the first scheduled retry.
    pub base: Duration,
    /// Ceiling applied to the computed delay.
    pub cap: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// True once `failures` consecutive failures have exhausted the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// One-way alive flag gating every asynchronous continuation.
///
/// Cloned into the client handle and the driver. Once [`retire`] is called
/// no further state mutation, timer effect, or signal emission is applied —
/// late-arriving results are discarded silently.
///
/// [`retire`]: LifecycleGuard::retire
#[derive(Debug, Clone)]
pub struct LifecycleGuard {
    alive: Arc<AtomicBool>,
}

impl LifecycleGuard {
    /// Create a guard in the alive state.
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the owning session is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Begin teardown. Idempotent; there is no way back.
    pub fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}
