/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The leaf payload of a [`SingleState`](super::SingleState).
//!
//! A behaviour is created once per behaviour *name* and then shared by every
//! single state that names it.  Its fields therefore persist across state
//! activations and can carry memory from one state to the next; only
//! `initialize`/`dispose` mark the boundaries of a single activation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BehaviorConfig;

/// Robot-specific logic driven by a leaf state.
pub trait Behavior: Send {
    /// Called each time a state using this behaviour becomes active.
    fn initialize(&mut self, state_name: &str, config: &BehaviorConfig);

    /// Called once per tick while the state is active.
    fn update(&mut self);

    /// Called when the state stops being active.
    fn dispose(&mut self);

    fn is_done(&self) -> bool;

    /// Subsystems this behaviour drives.
    fn subsystems(&self) -> Vec<String>;
}

/// One behaviour instance shared by all states that name it.
pub type SharedBehavior = Arc<Mutex<Box<dyn Behavior>>>;

/// Builds behaviours by name.
///
/// Returns `None` for names the factory does not know; the directory turns
/// that into a configuration error.
pub trait BehaviorFactory {
    fn create(&self, behavior: &str, config: &BehaviorConfig) -> Option<Box<dyn Behavior>>;
}

impl<F> BehaviorFactory for F
where
    F: Fn(&str, &BehaviorConfig) -> Option<Box<dyn Behavior>>,
{
    fn create(&self, behavior: &str, config: &BehaviorConfig) -> Option<Box<dyn Behavior>> {
        self(behavior, config)
    }
}

/// Tries each factory in turn; the first one that recognises the name wins.
///
/// Lets simulation behaviours sit behind the robot's real ones.
#[derive(Default)]
pub struct BehaviorFactoryChain {
    factories: Vec<Box<dyn BehaviorFactory>>,
}

impl BehaviorFactoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factory: impl BehaviorFactory + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }
}

impl BehaviorFactory for BehaviorFactoryChain {
    fn create(&self, behavior: &str, config: &BehaviorConfig) -> Option<Box<dyn Behavior>> {
        self.factories
            .iter()
            .find_map(|factory| factory.create(behavior, config))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
