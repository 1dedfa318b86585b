//! Rate-limit cooldown controller
//!
//! A single fixed suspension window armed by an upstream rate-limit signal.
//! While active, poll ticks are no-ops; the poller schedules exactly one
//! retry at the expiry instant. No exponential growth: a fresh signal
//! re-arms the same 5-minute window.

use tokio::time::{Duration, Instant};

/// Fixed suspension window after a rate-limit signal
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default)]
pub struct CooldownController {
    until: Option<Instant>,
}

impl CooldownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the window from now; returns the expiry instant for scheduling
    /// the single retry
    pub fn arm(&mut self) -> Instant {
        let until = Instant::now() + COOLDOWN_WINDOW;
        self.until = Some(until);
        until
    }

    /// Expiry instant if the window is still open
    pub fn active_until(&self) -> Option<Instant> {
        self.until.filter(|t| *t > Instant::now())
    }

    pub fn is_active(&self) -> bool {
        self.active_until().is_some()
    }

    /// Time left in the window, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.active_until().map(|t| t - Instant::now())
    }
}
