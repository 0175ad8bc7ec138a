/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority buckets resolved to state handles.
//!
//! Resolution happens once, when the machine is built: every scheduled name
//! is looked up (and constructed) in the directory, so a bad name fails
//! start-up instead of a tick.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{ConfigError, PriorityLabel, SchedulingConfig, StatesConfig};
use crate::state::{BehaviorFactory, StateDirectory, StateId};

/// The arbitration order for one robot.
#[derive(Debug, Clone, Default)]
pub struct PriorityPlan {
    subsystems: Vec<String>,
    do_not_interrupt: Vec<StateId>,
    /// Numeric levels, highest number first.
    levels: Vec<(i64, Vec<StateId>)>,
    default: Vec<StateId>,
}

impl PriorityPlan {
    /// Builds every scheduled state and resolves the buckets.
    ///
    /// States are constructed in scheduling declaration order, which becomes
    /// their declared order in the directory.
    pub fn resolve(
        scheduling: &SchedulingConfig,
        directory: &mut StateDirectory,
        states: &StatesConfig,
        factory: &dyn BehaviorFactory,
    ) -> Result<Self, ConfigError> {
        for name in scheduling.state_names() {
            directory.get_or_create(&name, states, factory)?;
        }

        let lookup = |names: &[String]| -> Result<Vec<StateId>, ConfigError> {
            names
                .iter()
                .map(|name| {
                    directory
                        .get(name)
                        .ok_or_else(|| ConfigError::UnknownState { state: name.clone() })
                })
                .collect()
        };

        let mut plan = Self {
            subsystems: scheduling.subsystems.clone(),
            ..Self::default()
        };
        for (label, names) in &scheduling.states_by_priority {
            let ids = lookup(names)?;
            match label {
                PriorityLabel::DoNotInterrupt => plan.do_not_interrupt.extend(ids),
                PriorityLabel::Default => plan.default.extend(ids),
                PriorityLabel::Level(level) => match plan.levels.iter_mut().find(|(l, _)| l == level) {
                    Some((_, existing)) => existing.extend(ids),
                    None => plan.levels.push((*level, ids)),
                },
            }
        }
        // Stable sort: equal levels never occur after the merge above.
        plan.levels.sort_by(|a, b| b.0.cmp(&a.0));

        debug!(
            subsystems = plan.subsystems.len(),
            do_not_interrupt = plan.do_not_interrupt.len(),
            levels = ?plan.levels.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            default = plan.default.len(),
            "priority plan resolved"
        );
        Ok(plan)
    }

    /// A fresh pool of every configured subsystem.
    pub fn subsystem_pool(&self) -> BTreeSet<String> {
        self.subsystems.iter().cloned().collect()
    }

    pub fn subsystems(&self) -> &[String] {
        &self.subsystems
    }

    pub fn do_not_interrupt(&self) -> &[StateId] {
        &self.do_not_interrupt
    }

    pub fn levels(&self) -> &[(i64, Vec<StateId>)] {
        &self.levels
    }

    pub fn default_states(&self) -> &[StateId] {
        &self.default
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
