//! Sliding-window rate limit for non-urgent saves.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Allows at most `max_per_second` acquisitions in any one-second window.
#[derive(Debug)]
pub struct SaveThrottle {
    max_per_second: usize,
    recent: VecDeque<Instant>,
}

impl SaveThrottle {
    /// A limit of zero disables throttling.
    pub fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second,
            recent: VecDeque::with_capacity(max_per_second),
        }
    }

    /// Takes a slot if one is free at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.max_per_second == 0 {
            return true;
        }
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        if self.recent.len() < self.max_per_second {
            self.recent.push_back(now);
            true
        } else {
            false
        }
    }

    /// Slots still free in the window ending at `now`.
    pub fn available(&self, now: Instant) -> usize {
        if self.max_per_second == 0 {
            return usize::MAX;
        }
        let used = self
            .recent
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < WINDOW)
            .count();
        self.max_per_second.saturating_sub(used)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
