/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed-rate tick driver.
//!
//! A [`ScheduledService`] is a synchronous, frame-based component.  The
//! [`ServiceRunner`] owns one service and drives it on a tokio task:
//!
//! ```text
//!  start_up ──ok──► Running ──tick──► run_one_iteration ──► … ──shutdown──► shut_down
//!     │                                   │
//!     └─err──► Failed                     └─err──► logged, next tick proceeds
//! ```
//!
//! Each iteration runs on the blocking pool.  An in-progress flag guarantees
//! that at most one iteration of a service is in flight; a tick requested
//! while the previous one is still running is skipped, never queued.

pub mod states;

pub use states::{FmsMode, FmsSource, SharedFms, StatesService};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Frame timing for one service.
#[derive(Debug, Clone)]
pub struct Scheduler {
    initial_delay: Duration,
    period: Duration,
    started_at: Option<Instant>,
    last_run: Option<Instant>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            period,
            started_at: None,
            last_run: None,
        }
    }

    /// `rate_hz` frames per second; zero is treated as one.
    pub fn from_rate_hz(rate_hz: u32) -> Self {
        Self::new(Duration::from_secs(1) / rate_hz.max(1))
    }

    /// Delay between [`start`](Self::start) and the first frame.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arms the initial delay.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.last_run = None;
    }

    /// Records that a frame began at `now`.
    pub fn mark_run(&mut self, now: Instant) {
        self.started_at = None;
        self.last_run = Some(now);
    }

    /// When the next frame is due.
    pub fn next_run(&self, now: Instant) -> Instant {
        match (self.started_at, self.last_run) {
            (Some(started), _) => started + self.initial_delay,
            (None, Some(last)) => last + self.period,
            (None, None) => now,
        }
    }

    pub fn until_next_run(&self, now: Instant) -> Duration {
        self.next_run(now).saturating_duration_since(now)
    }

    pub fn should_run(&self, now: Instant) -> bool {
        self.next_run(now) <= now
    }
}

// ── Service contract ──────────────────────────────────────────────────────────

/// A frame-based component driven by a [`ServiceRunner`].
pub trait ScheduledService: Send {
    fn name(&self) -> &str;

    /// One-off preparation.  An error here stops the runner for good.
    fn start_up(&mut self) -> Result<()>;

    /// One frame.  An error is logged and the next frame runs as usual.
    fn run_one_iteration(&mut self) -> Result<()>;

    fn shut_down(&mut self) -> Result<()> {
        Ok(())
    }

    fn scheduler(&self) -> Scheduler;
}

/// Lifecycle of a [`ServiceRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    AwaitingStart,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::AwaitingStart => "AWAITING_START",
            ServiceState::Starting => "STARTING",
            ServiceState::Running => "RUNNING",
            ServiceState::Stopping => "STOPPING",
            ServiceState::Stopped => "STOPPED",
            ServiceState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Result of a single [`ServiceRunner::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The iteration completed in the given time.
    Ran(Duration),
    /// Another iteration was still in flight.
    Skipped,
    /// The iteration returned an error (already logged).
    Failed,
}

// ── ServiceRunner ─────────────────────────────────────────────────────────────

/// Drives one [`ScheduledService`].
pub struct ServiceRunner<S> {
    name: String,
    period: Duration,
    service: Mutex<S>,
    state: Mutex<ServiceState>,
    in_progress: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl<S: ScheduledService + 'static> ServiceRunner<S> {
    pub fn new(service: S) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            name: service.name().to_string(),
            period: service.scheduler().period(),
            service: Mutex::new(service),
            state: Mutex::new(ServiceState::AwaitingStart),
            in_progress: AtomicBool::new(false),
            shutdown,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn set_state(&self, state: ServiceState) {
        debug!(service = %self.name, state = %state, "service state");
        *self.state.lock() = state;
    }

    /// Runs the service's `start_up`.
    ///
    /// # Errors
    /// The start-up error, after the runner has moved to
    /// [`ServiceState::Failed`].
    pub fn start_up(&self) -> Result<()> {
        self.set_state(ServiceState::Starting);
        match self.service.lock().start_up() {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                info!(service = %self.name, "service started");
                Ok(())
            }
            Err(e) => {
                error!(service = %self.name, "{} has failed in a STARTING state: {:#}", self.name, e);
                self.set_state(ServiceState::Failed);
                Err(e).with_context(|| format!("{} failed to start", self.name))
            }
        }
    }

    /// Runs one iteration unless one is already in flight.
    pub fn tick(&self) -> TickOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(service = %self.name, "previous frame still running, skipping tick");
            return TickOutcome::Skipped;
        }

        let started = Instant::now();
        let result = self.service.lock().run_one_iteration();
        let elapsed = started.elapsed();
        self.in_progress.store(false, Ordering::Release);

        if elapsed > self.period {
            debug!(
                service = %self.name,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                "frame overrun"
            );
        }

        match result {
            Ok(()) => TickOutcome::Ran(elapsed),
            Err(e) => {
                error!(service = %self.name, "{} has failed in a RUNNING state: {:#}", self.name, e);
                TickOutcome::Failed
            }
        }
    }

    /// Asks [`run`](Self::run) to stop after the current frame.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Starts the service and ticks it at its scheduler's rate until
    /// shutdown is requested or `max_ticks` frames have been attempted.
    ///
    /// # Errors
    /// Start-up failure, or a panic inside an iteration.
    pub async fn run(self: Arc<Self>, max_ticks: Option<u64>) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.start_up())
            .await
            .context("start-up task panicked")??;

        let mut scheduler = self.service.lock().scheduler();
        scheduler.start(Instant::now());
        let mut ticks: u64 = 0;

        loop {
            let wait = scheduler.until_next_run(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                info!(service = %self.name, "shutdown requested");
                break;
            }

            scheduler.mark_run(Instant::now());
            let runner = self.clone();
            let outcome = tokio::task::spawn_blocking(move || runner.tick())
                .await
                .context("service iteration panicked")?;
            if outcome == TickOutcome::Skipped {
                warn!(service = %self.name, "tick skipped");
            }

            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                info!(service = %self.name, ticks, "tick limit reached");
                break;
            }
        }

        self.shut_down();
        Ok(())
    }

    fn shut_down(&self) {
        self.set_state(ServiceState::Stopping);
        if let Err(e) = self.service.lock().shut_down() {
            error!(service = %self.name, "{} has failed in a STOPPING state: {:#}", self.name, e);
        }
        self.set_state(ServiceState::Stopped);
        info!(service = %self.name, "service stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
