/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Name → state registry and the recursive state operations.
//!
//! The directory is an arena: every state lives in `nodes` for the life of
//! the process and composites point at their children by [`StateId`].
//! [`get_or_create`](StateDirectory::get_or_create) memoises construction, so
//! a state referenced from several composites (or from several priority
//! buckets) is the same object everywhere.
//!
//! Insertion order is the *declared order* of states: children are inserted
//! before the composite that contains them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::behavior::{BehaviorFactory, SharedBehavior};
use super::timer::{Clock, Timer};
use super::{
    DoneForTimeState, ParallelState, SequencerState, SingleState, State, StateId, TimedState,
};
use crate::config::{ConfigError, StateConfig, StatesConfig};

struct StateNode {
    name: String,
    state: State,
}

/// Owns every constructed state and shared behaviour.
pub struct StateDirectory {
    nodes: Vec<StateNode>,
    by_name: HashMap<String, StateId>,
    behaviors: HashMap<String, SharedBehavior>,
    clock: Arc<dyn Clock>,
}

impl StateDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            behaviors: HashMap::new(),
            clock,
        }
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    /// Returns the state called `name`, constructing it (and, recursively,
    /// its children) on first use.
    ///
    /// # Errors
    /// Any [`ConfigError`] met while building the tree.  States built before
    /// the failure stay registered; the caller is expected to abort.
    pub fn get_or_create(
        &mut self,
        name: &str,
        states: &StatesConfig,
        factory: &dyn BehaviorFactory,
    ) -> Result<StateId, ConfigError> {
        let mut path = Vec::new();
        self.create(name, states, factory, &mut path)
    }

    fn create(
        &mut self,
        name: &str,
        states: &StatesConfig,
        factory: &dyn BehaviorFactory,
        path: &mut Vec<String>,
    ) -> Result<StateId, ConfigError> {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }
        if let Some(pos) = path.iter().position(|p| p == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ConfigError::CyclicState {
                state: name.to_string(),
                path: cycle,
            });
        }

        let config = states.get(name).ok_or_else(|| ConfigError::UnknownState {
            state: name.to_string(),
        })?;
        trace!(state = %name, kind = config.kind(), "creating state");

        path.push(name.to_string());
        let state = match config {
            StateConfig::Single(cfg) => {
                let behavior = match self.behaviors.get(&cfg.behavior) {
                    Some(shared) => shared.clone(),
                    None => {
                        let created = factory
                            .create(&cfg.behavior, &cfg.behavior_config)
                            .ok_or_else(|| ConfigError::UnknownBehavior {
                                state: name.to_string(),
                                behavior: cfg.behavior.clone(),
                            })?;
                        let shared: SharedBehavior = Arc::new(Mutex::new(created));
                        self.behaviors.insert(cfg.behavior.clone(), shared.clone());
                        shared
                    }
                };
                State::Single(SingleState {
                    behavior_name: cfg.behavior.clone(),
                    behavior,
                    behavior_config: cfg.behavior_config.clone(),
                })
            }
            StateConfig::Sequencer(cfg) => {
                if cfg.sequence.is_empty() {
                    return Err(ConfigError::EmptySequence {
                        state: name.to_string(),
                    });
                }
                let steps = self.create_all(&cfg.sequence, states, factory, path)?;
                State::Sequencer(SequencerState::new(steps))
            }
            StateConfig::Parallel(cfg) => {
                let foreground = self.create_all(&cfg.foreground_states, states, factory, path)?;
                let background = self.create_all(&cfg.background_states, states, factory, path)?;
                State::Parallel(ParallelState {
                    foreground: unique(foreground),
                    background: unique(background),
                })
            }
            StateConfig::Timed(cfg) => State::Timed(TimedState {
                child: self.create(&cfg.state, states, factory, path)?,
                timeout_ms: cfg.timeout,
                timer: Timer::new(),
            }),
            StateConfig::DoneForTime(cfg) => State::DoneForTime(DoneForTimeState {
                child: self.create(&cfg.state, states, factory, path)?,
                state_timeout_ms: cfg.state_timeout,
                max_timeout_ms: cfg.max_timeout(),
                settle_timer: Timer::new(),
                max_timer: Timer::new(),
            }),
        };
        path.pop();

        Ok(self.register(name, state))
    }

    /// One id per entry, in order.  Repeated names yield repeated ids.
    fn create_all(
        &mut self,
        names: &[String],
        states: &StatesConfig,
        factory: &dyn BehaviorFactory,
        path: &mut Vec<String>,
    ) -> Result<Vec<StateId>, ConfigError> {
        names
            .iter()
            .map(|name| self.create(name, states, factory, path))
            .collect()
    }

    fn register(&mut self, name: &str, state: State) -> StateId {
        let id = StateId(self.nodes.len());
        debug!(state = %name, kind = state.kind(), id = id.0, "registered state");
        self.nodes.push(StateNode {
            name: name.to_string(),
            state,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// The shared behaviour registered under `name`, if any state uses it.
    pub fn behavior(&self, name: &str) -> Option<&SharedBehavior> {
        self.behaviors.get(name)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn name(&self, id: StateId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.nodes[id.0].state
    }

    pub fn is_leaf(&self, id: StateId) -> bool {
        self.state(id).is_leaf()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every state id in declared order.
    pub fn ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.nodes.len()).map(StateId)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// `[a, b, c]` rendering of a list of states.
    pub fn describe(&self, ids: &[StateId]) -> String {
        let names: Vec<&str> = ids.iter().map(|id| self.name(*id)).collect();
        format!("[{}]", names.join(", "))
    }

    // ── Recursive queries ─────────────────────────────────────────────────────

    /// Subsystems the state needs before it may run: a leaf's behaviour set,
    /// or the union over every child of a composite (for sequences, every
    /// step, not just the current one).
    pub fn subsystems(&self, id: StateId) -> BTreeSet<String> {
        match self.state(id) {
            State::Single(s) => s.behavior.lock().subsystems().into_iter().collect(),
            other => other
                .children()
                .into_iter()
                .flat_map(|child| self.subsystems(child))
                .collect(),
        }
    }

    /// States that run when `id` runs, in a deterministic order.
    ///
    /// A leaf yields itself.  A composite yields its running children followed
    /// by their own sub-states; it never yields itself.
    pub fn sub_states(&self, id: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        match self.state(id) {
            State::Single(_) => out.push(id),
            State::Sequencer(s) => {
                let current = s.current();
                push_unique(&mut out, current);
                for sub in self.sub_states(current) {
                    push_unique(&mut out, sub);
                }
            }
            State::Parallel(p) => {
                for child in p.foreground.iter().chain(&p.background) {
                    push_unique(&mut out, *child);
                }
                for child in p.foreground.iter().chain(&p.background) {
                    for sub in self.sub_states(*child) {
                        push_unique(&mut out, sub);
                    }
                }
            }
            State::Timed(TimedState { child, .. })
            | State::DoneForTime(DoneForTimeState { child, .. }) => {
                push_unique(&mut out, *child);
                for sub in self.sub_states(*child) {
                    push_unique(&mut out, sub);
                }
            }
        }
        out
    }

    /// The state's own done rule.  Takes `&mut self` because
    /// [`DoneForTimeState`] arms and resets its settle timer here.
    pub fn is_done(&mut self, id: StateId) -> bool {
        match &self.nodes[id.0].state {
            State::Single(s) => s.behavior.lock().is_done(),
            State::Sequencer(s) => s.is_finished(),
            State::Parallel(p) => {
                let foreground = p.foreground.clone();
                foreground.into_iter().all(|child| self.is_done(child))
            }
            State::Timed(t) => {
                let child = t.child;
                if self.is_done(child) {
                    return true;
                }
                match &self.nodes[id.0].state {
                    State::Timed(t) => t.timer.is_done(&*self.clock),
                    _ => unreachable!("state variant changed during is_done"),
                }
            }
            State::DoneForTime(d) => {
                let child = d.child;
                let child_done = self.is_done(child);
                let clock = &*self.clock;
                let State::DoneForTime(d) = &mut self.nodes[id.0].state else {
                    unreachable!("state variant changed during is_done");
                };
                if child_done {
                    if !d.settle_timer.is_started() {
                        d.settle_timer.start(d.state_timeout_ms, clock);
                    }
                } else if d.settle_timer.is_started() {
                    d.settle_timer.reset();
                }
                d.settle_timer.is_done(clock) || d.max_timer.is_done(clock)
            }
        }
    }

    // ── Lifecycle dispatch ────────────────────────────────────────────────────

    pub fn initialize(&mut self, id: StateId) {
        let clock = &*self.clock;
        let StateNode { name, state } = &mut self.nodes[id.0];
        match state {
            State::Single(s) => s.behavior.lock().initialize(name, &s.behavior_config),
            State::Sequencer(_) => debug!(state = %name, "Entering sequencer state"),
            State::Parallel(_) => debug!(state = %name, "Entering parallel state"),
            State::Timed(t) => {
                debug!(state = %name, timeout_ms = t.timeout_ms, "Entering timed state");
                t.timer.start(t.timeout_ms, clock);
            }
            State::DoneForTime(d) => {
                debug!(state = %name, "Entering done-for-time state");
                if let Some(max) = d.max_timeout_ms {
                    d.max_timer.start(max, clock);
                }
            }
        }
    }

    /// Per-tick work.  Only leaves and sequencers do anything here: a
    /// sequencer advances past a finished step.
    pub fn update(&mut self, id: StateId) {
        let (current, finished) = match &self.nodes[id.0].state {
            State::Single(s) => {
                s.behavior.lock().update();
                return;
            }
            State::Sequencer(s) => (s.current(), s.is_finished()),
            _ => return,
        };
        if finished || !self.is_done(current) {
            return;
        }
        let StateNode { name, state } = &mut self.nodes[id.0];
        if let State::Sequencer(s) = state {
            s.index += 1;
            trace!(state = %name, step = s.index, of = s.steps.len(), "sequence advanced");
        }
    }

    pub fn dispose(&mut self, id: StateId) {
        let StateNode { name, state } = &mut self.nodes[id.0];
        match state {
            State::Single(s) => s.behavior.lock().dispose(),
            State::Sequencer(s) => {
                trace!(state = %name, "Leaving sequencer state");
                s.index = 0;
            }
            State::Parallel(_) => trace!(state = %name, "Leaving parallel state"),
            State::Timed(t) => {
                trace!(state = %name, "Leaving timed state");
                t.timer.reset();
            }
            State::DoneForTime(d) => {
                trace!(state = %name, "Leaving done-for-time state");
                d.settle_timer.reset();
            }
        }
    }
}

/// Parallel children are sets; a sequence keeps its repeats.
fn unique(ids: Vec<StateId>) -> Vec<StateId> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        push_unique(&mut out, id);
    }
    out
}

fn push_unique(out: &mut Vec<StateId>, id: StateId) {
    if !out.contains(&id) {
        out.push(id);
    }
}

// ── StateView ─────────────────────────────────────────────────────────────────

/// A borrowed state handed to an [`Oracle`](crate::oracle::Oracle) so it can
/// consult the built-in done rule before overriding it.
pub struct StateView<'a> {
    directory: &'a mut StateDirectory,
    id: StateId,
}

impl<'a> StateView<'a> {
    pub fn new(directory: &'a mut StateDirectory, id: StateId) -> Self {
        Self { directory, id }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.directory.name(self.id)
    }

    pub fn subsystems(&self) -> BTreeSet<String> {
        self.directory.subsystems(self.id)
    }

    /// The state's intrinsic done-ness.
    pub fn is_done(&mut self) -> bool {
        self.directory.is_done(self.id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
