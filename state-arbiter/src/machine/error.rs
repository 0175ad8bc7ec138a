/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Errors raised by the arbitration engine.
//!
//! Construction failures come from the configuration layer and are wrapped
//! unchanged.  Tick failures only ever come from the oracle: the engine
//! itself has no failing operation once the state tree is built.
//!
//! A failed tick leaves the previous active sets untouched, so the next tick
//! recomputes from the last good frame.

use thiserror::Error;

use crate::config::ConfigError;

/// Failure while building or ticking a [`StateMachine`](super::StateMachine).
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// A scheduled state (or one of its children) could not be built.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The oracle failed while answering `is_ready` / `is_done` for `state`.
    #[error("oracle failed for state '{state}'")]
    Oracle {
        state: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ArbiterError {
    pub(crate) fn oracle(state: &str, source: anyhow::Error) -> Self {
        Self::Oracle {
            state: state.to_string(),
            source,
        }
    }
}
