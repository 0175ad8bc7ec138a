/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Millisecond clocks and polling timers.
//!
//! Timers never block; composites ask "has it elapsed?" from inside
//! `is_done()`.  The clock is injected so the same state tree can run against
//! wall time on the robot and against a hand-driven clock in tests and
//! simulation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic time in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock, counting from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Release);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

/// Elapsed-time check against a [`Clock`].
#[derive(Debug, Clone, Default)]
pub struct Timer {
    started_at_ms: Option<u64>,
    duration_ms: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)starts the timer at the clock's current time.
    pub fn start(&mut self, duration_ms: u64, clock: &dyn Clock) {
        self.duration_ms = duration_ms;
        self.started_at_ms = Some(clock.now_ms());
    }

    pub fn reset(&mut self) {
        self.started_at_ms = None;
    }

    pub fn is_started(&self) -> bool {
        self.started_at_ms.is_some()
    }

    /// `true` once started and at least `duration_ms` have elapsed.
    pub fn is_done(&self, clock: &dyn Clock) -> bool {
        self.started_at_ms
            .is_some_and(|start| clock.now_ms().saturating_sub(start) >= self.duration_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_timer_is_never_done() {
        let clock = ManualClock::new(10_000);
        let timer = Timer::new();
        assert!(!timer.is_started());
        assert!(!timer.is_done(&clock));
    }

    #[test]
    fn timer_done_exactly_at_duration() {
        let clock = ManualClock::new(100);
        let mut timer = Timer::new();
        timer.start(500, &clock);

        clock.set(599);
        assert!(!timer.is_done(&clock));
        clock.set(600);
        assert!(timer.is_done(&clock));
    }

    #[test]
    fn reset_clears_started_flag() {
        let clock = ManualClock::new(0);
        let mut timer = Timer::new();
        timer.start(0, &clock);
        assert!(timer.is_done(&clock));

        timer.reset();
        assert!(!timer.is_started());
        assert!(!timer.is_done(&clock));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(5);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 15);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
