/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Composable states.
//!
//! A state is a named unit of behaviour that owns zero or more subsystems and
//! can report done-ness.  Five variants exist:
//!
//! | Variant | Sub-states | Subsystems | Done when |
//! |---|---|---|---|
//! | [`SingleState`] | itself | its behaviour's | behaviour says so |
//! | [`SequencerState`] | current step (recursive) | every step's | past the last step |
//! | [`ParallelState`] | all children (recursive) | all children's | all foreground done |
//! | [`TimedState`] | child (recursive) | child's | child done or timeout |
//! | [`DoneForTimeState`] | child (recursive) | child's | child done for settle time, or max timeout |
//!
//! Composites reference their children by [`StateId`], a stable index into
//! the [`StateDirectory`] arena that owns every state for the life of the
//! process.  All recursive queries (`sub_states`, `subsystems`, `is_done`)
//! and lifecycle dispatch live on the directory.

pub mod behavior;
pub mod directory;
pub mod timer;

pub use behavior::{Behavior, BehaviorFactory, BehaviorFactoryChain, SharedBehavior};
pub use directory::{StateDirectory, StateView};
pub use timer::{Clock, ManualClock, SystemClock, Timer};

use crate::config::BehaviorConfig;

/// Stable handle to a state inside a [`StateDirectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Leaf state: delegates everything to a shared behaviour.
pub struct SingleState {
    pub(crate) behavior_name: String,
    pub(crate) behavior: SharedBehavior,
    pub(crate) behavior_config: BehaviorConfig,
}

impl SingleState {
    pub fn behavior_name(&self) -> &str {
        &self.behavior_name
    }

    pub fn behavior(&self) -> &SharedBehavior {
        &self.behavior
    }
}

impl std::fmt::Debug for SingleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleState")
            .field("behavior", &self.behavior_name)
            .finish_non_exhaustive()
    }
}

/// Runs its steps one after another.
#[derive(Debug)]
pub struct SequencerState {
    pub(crate) steps: Vec<StateId>,
    pub(crate) index: usize,
}

impl SequencerState {
    /// Steps are validated non-empty at construction.
    pub(crate) fn new(steps: Vec<StateId>) -> Self {
        debug_assert!(!steps.is_empty());
        Self { steps, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn steps(&self) -> &[StateId] {
        &self.steps
    }

    /// The in-flight step.  Once the sequence has finished this stays on the
    /// last step.
    pub fn current(&self) -> StateId {
        self.steps[self.index.min(self.steps.len() - 1)]
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.steps.len()
    }
}

/// Runs every child at once; only the foreground decides done-ness.
#[derive(Debug)]
pub struct ParallelState {
    pub(crate) foreground: Vec<StateId>,
    pub(crate) background: Vec<StateId>,
}

impl ParallelState {
    pub fn foreground(&self) -> &[StateId] {
        &self.foreground
    }

    pub fn background(&self) -> &[StateId] {
        &self.background
    }
}

/// Wraps a child with a hard timeout.
#[derive(Debug)]
pub struct TimedState {
    pub(crate) child: StateId,
    pub(crate) timeout_ms: u64,
    pub(crate) timer: Timer,
}

/// Wraps a child that must stay done for a settle time.
#[derive(Debug)]
pub struct DoneForTimeState {
    pub(crate) child: StateId,
    pub(crate) state_timeout_ms: u64,
    pub(crate) max_timeout_ms: Option<u64>,
    pub(crate) settle_timer: Timer,
    pub(crate) max_timer: Timer,
}

/// The closed set of state variants.
#[derive(Debug)]
pub enum State {
    Single(SingleState),
    Sequencer(SequencerState),
    Parallel(ParallelState),
    Timed(TimedState),
    DoneForTime(DoneForTimeState),
}

impl State {
    pub fn is_leaf(&self) -> bool {
        matches!(self, State::Single(_))
    }

    /// Every directly referenced child, in declaration order.
    pub fn children(&self) -> Vec<StateId> {
        match self {
            State::Single(_) => Vec::new(),
            State::Sequencer(s) => s.steps.clone(),
            State::Parallel(p) => p.foreground.iter().chain(&p.background).copied().collect(),
            State::Timed(t) => vec![t.child],
            State::DoneForTime(d) => vec![d.child],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            State::Single(_) => "single_state",
            State::Sequencer(_) => "sequencer_state",
            State::Parallel(_) => "parallel_state",
            State::Timed(_) => "timed_state",
            State::DoneForTime(_) => "done_for_time_state",
        }
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────
