/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority-based subsystem arbitration.
//!
//! [`StateMachine`] decides, once per tick, which states own the robot's
//! subsystems.  States compete through priority buckets; the winners (the
//! *primary* set) are expanded into the sub-states that actually run, and
//! lifecycle calls are issued for everything that started or stopped.
//!
//! # Tick outline
//!
//! | Step | What happens |
//! |---|---|
//! | do-not-interrupt | last tick's primary states in this bucket keep their subsystems while not done |
//! | numeric levels | highest level first; newly ready states claim before running ones at the same level |
//! | default | whatever is left goes to fallback states |
//! | expansion | primaries plus their sub-states; leaves consume from a fresh pool |
//! | hold | last tick's leaves whose subsystems nobody took keep running |
//! | diff | dispose stopped states, then initialize started ones, in declared order |
//! | update | every active state, in activation order |
//!
//! Subsystem claims are all-or-nothing: a state either gets every subsystem
//! it declares or none of them.
//!
//! The machine is single-threaded by contract.  The tick driver guarantees
//! that only one `update()`/`dispose()` runs at a time, so nothing here locks.

pub mod error;
pub mod priority;

pub use error::ArbiterError;
pub use priority::PriorityPlan;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{SchedulingConfig, StatesConfig};
use crate::oracle::Oracle;
use crate::state::{BehaviorFactory, StateDirectory, StateId, StateView};
use crate::values::{DiagnosticsSink, ACTIVE_STATES_KEY};

// ── StateMachine ──────────────────────────────────────────────────────────────

/// Owns the state tree and the active sets carried from tick to tick.
pub struct StateMachine {
    directory: StateDirectory,
    plan: PriorityPlan,
    diagnostics: Arc<dyn DiagnosticsSink>,
    /// Every running state, in activation order.
    active: Vec<StateId>,
    /// The states arbitration picked directly last tick.
    primary: Vec<StateId>,
}

impl StateMachine {
    pub fn new(
        directory: StateDirectory,
        plan: PriorityPlan,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            directory,
            plan,
            diagnostics,
            active: Vec::new(),
            primary: Vec::new(),
        }
    }

    /// Builds every scheduled state into `directory` and resolves the plan.
    ///
    /// # Errors
    /// [`ArbiterError::Config`] if any scheduled state (or child) cannot be
    /// built.
    pub fn build(
        scheduling: &SchedulingConfig,
        states: &StatesConfig,
        factory: &dyn BehaviorFactory,
        mut directory: StateDirectory,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, ArbiterError> {
        let plan = PriorityPlan::resolve(scheduling, &mut directory, states, factory)?;
        Ok(Self::new(directory, plan, diagnostics))
    }

    /// Entering Autonomous or Teleop.
    ///
    /// The plan is fixed at construction and the active sets deliberately
    /// survive a mode switch (see [`dispose`](Self::dispose)), so this only
    /// reports what is about to be arbitrated.
    pub fn initialize(&mut self) {
        debug!(
            states = self.directory.len(),
            levels = self.plan.levels().len(),
            active = %self.directory.describe(&self.active),
            "state machine initialized"
        );
    }

    /// Runs one arbitration tick.
    ///
    /// # Errors
    /// [`ArbiterError::Oracle`] if the oracle fails.  Nothing has been
    /// disposed, initialized or updated when that happens, and the active
    /// sets are those of the previous tick.
    pub fn update(&mut self, oracle: &mut dyn Oracle) -> Result<(), ArbiterError> {
        let primary = self.arbitrate(oracle)?;
        let next = self.expand(&primary);

        let described = self.directory.describe(&next);
        debug!(active = %described, "active states");
        self.diagnostics.publish_string(ACTIVE_STATES_KEY, described);

        let declared: Vec<StateId> = self.directory.ids().collect();
        for &id in &declared {
            if self.active.contains(&id) && !next.contains(&id) {
                trace!(state = %self.directory.name(id), "dispose");
                self.directory.dispose(id);
            }
        }
        for &id in &declared {
            if next.contains(&id) && !self.active.contains(&id) {
                trace!(state = %self.directory.name(id), "initialize");
                self.directory.initialize(id);
            }
        }

        self.active = next;
        self.primary = primary;

        for &id in &self.active {
            self.directory.update(id);
        }
        Ok(())
    }

    /// Leaving a mode: disposes everything that is running, forgets both
    /// active sets, then immediately runs one more tick so do-not-interrupt
    /// and default states are re-established before the next mode starts.
    pub fn dispose(&mut self, oracle: &mut dyn Oracle) -> Result<(), ArbiterError> {
        debug!(active = %self.directory.describe(&self.active), "disposing active states");
        for &id in &self.active {
            self.directory.dispose(id);
        }
        self.active.clear();
        self.primary.clear();
        self.update(oracle)
    }

    /// States running after the last tick, in activation order.
    pub fn current_active_states(&self) -> &[StateId] {
        &self.active
    }

    /// Names of [`current_active_states`](Self::current_active_states).
    pub fn active_state_names(&self) -> Vec<&str> {
        self.active.iter().map(|id| self.directory.name(*id)).collect()
    }

    /// States arbitration picked directly last tick.
    pub fn primary_states(&self) -> &[StateId] {
        &self.primary
    }

    pub fn directory(&self) -> &StateDirectory {
        &self.directory
    }

    // ── Arbitration passes ────────────────────────────────────────────────────

    /// Picks this tick's primary states.
    fn arbitrate(&mut self, oracle: &mut dyn Oracle) -> Result<Vec<StateId>, ArbiterError> {
        let Self {
            directory,
            plan,
            active,
            primary: previous_primary,
            ..
        } = self;

        let mut available = plan.subsystem_pool();
        let mut primary = Vec::new();

        for &id in plan.do_not_interrupt() {
            if available.is_empty() {
                break;
            }
            let done = if previous_primary.contains(&id) {
                ask_done(oracle, directory, id)?
            } else {
                true
            };
            if active.contains(&id) && !done && claim(directory, id, &mut available) {
                push_unique(&mut primary, id);
            }
        }

        for (level, ids) in plan.levels() {
            let mut still_running = Vec::new();
            for &id in ids {
                if available.is_empty() {
                    break;
                }
                let name = directory.name(id);
                let ready = oracle
                    .is_ready(name)
                    .map_err(|source| ArbiterError::oracle(name, source))?;
                let running = active.contains(&id);
                let done = if previous_primary.contains(&id) {
                    ask_done(oracle, directory, id)?
                } else {
                    true
                };

                if !running && ready && claim(directory, id, &mut available) {
                    trace!(state = %directory.name(id), level, "granted");
                    push_unique(&mut primary, id);
                } else if running && !done {
                    still_running.push(id);
                }
            }
            for id in still_running {
                if claim(directory, id, &mut available) {
                    trace!(state = %directory.name(id), level, "kept");
                    push_unique(&mut primary, id);
                }
            }
        }

        for &id in plan.default_states() {
            if available.is_empty() {
                break;
            }
            if claim(directory, id, &mut available) {
                push_unique(&mut primary, id);
            }
        }

        Ok(primary)
    }

    /// Primary states plus their sub-states, plus held leaves.
    fn expand(&self, primary: &[StateId]) -> Vec<StateId> {
        let directory = &self.directory;
        let mut next = primary.to_vec();

        let mut pool = self.plan.subsystem_pool();
        for &id in primary {
            for sub in directory.sub_states(id) {
                push_unique(&mut next, sub);
                if directory.is_leaf(sub) {
                    claim(directory, sub, &mut pool);
                }
            }
        }

        for &id in &self.active {
            if directory.is_leaf(id) && claim(directory, id, &mut pool) {
                trace!(state = %directory.name(id), "held");
                push_unique(&mut next, id);
            }
        }
        next
    }
}

/// Takes every subsystem `id` needs out of `available`, or none of them.
fn claim(directory: &StateDirectory, id: StateId, available: &mut BTreeSet<String>) -> bool {
    let needed = directory.subsystems(id);
    if !needed.iter().all(|s| available.contains(s)) {
        return false;
    }
    for subsystem in &needed {
        available.remove(subsystem);
    }
    true
}

fn ask_done(
    oracle: &mut dyn Oracle,
    directory: &mut StateDirectory,
    id: StateId,
) -> Result<bool, ArbiterError> {
    let name = directory.name(id).to_string();
    let mut view = StateView::new(directory, id);
    oracle
        .is_done(&name, &mut view)
        .map_err(|source| ArbiterError::oracle(&name, source))
}

fn push_unique(set: &mut Vec<StateId>, id: StateId) {
    if !set.contains(&id) {
        set.push(id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
