//! Silence window tracking.
//!
//! Interactive prompts usually stop mid-line and then nothing else arrives.
//! The tracker measures how long the child has been quiet and hands out at
//! most one "classify now" signal per quiet period, so a buffer that was
//! already judged is not re-examined (and re-announced) on every wakeup.

use std::time::{Duration, Instant};

/// Last-activity timestamp plus the once-per-window check latch.
#[derive(Debug, Clone)]
pub struct SilenceTracker {
    last_activity: Instant,
    checked: bool,
}

impl SilenceTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            checked: false,
        }
    }

    /// Record output (or an injected reply) and open a fresh window.
    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.checked = false;
    }

    /// True exactly once per silence window, when the child has been quiet
    /// for at least `threshold` and there is pending output to look at.
    ///
    /// A `true` result latches the window; later calls return `false` until
    /// [`note_activity`](Self::note_activity) is called again.
    pub fn should_check(&mut self, now: Instant, threshold: Duration, has_pending: bool) -> bool {
        if self.checked || !has_pending {
            return false;
        }
        if now.saturating_duration_since(self.last_activity) < threshold {
            return false;
        }
        self.checked = true;
        true
    }

    /// When the next check becomes due, or `None` if no check can fire in
    /// this window.
    pub fn check_due(&self, threshold: Duration, has_pending: bool) -> Option<Instant> {
        if self.checked || !has_pending {
            return None;
        }
        Some(self.last_activity + threshold)
    }

    /// How long the child has been quiet as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}
