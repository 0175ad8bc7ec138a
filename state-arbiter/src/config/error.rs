/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured configuration errors.
//!
//! Every variant here is fatal for the state tree that triggered it: the
//! caller is expected to abort start-up rather than run with a partially
//! built directory.  Variants carry the offending state name so the log line
//! alone is enough to find the bad YAML entry.

use thiserror::Error;

/// Failure while turning configuration into states.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A group key in `states.yaml` is not one of the five known state types.
    #[error("state '{state}' has unknown type '{kind}' (valid: single_state, parallel_state, sequencer_state, timed_state, done_for_time_state)")]
    UnknownStateType { state: String, kind: String },

    /// A state entry is missing a required field or has a field of the wrong
    /// shape.
    #[error("invalid configuration for state '{state}': {reason}")]
    InvalidStateConfig { state: String, reason: String },

    /// The same state name appears under two type groups.
    #[error("state '{state}' is defined more than once")]
    DuplicateState { state: String },

    /// A state (or a priority bucket) refers to a name with no entry in
    /// `states.yaml`.
    #[error("no configuration exists for state '{state}'")]
    UnknownState { state: String },

    /// A composite state contains itself, directly or through its children.
    #[error("state '{state}' contains itself (cycle: {})", path.join(" -> "))]
    CyclicState { state: String, path: Vec<String> },

    /// A `sequencer_state` with an empty `sequence` list.
    #[error("sequencer state '{state}' has an empty sequence")]
    EmptySequence { state: String },

    /// No behaviour factory knows how to build the named behaviour.
    #[error("state '{state}' references unknown behavior '{behavior}'")]
    UnknownBehavior { state: String, behavior: String },

    /// A priority label that is neither `do_not_interrupt`, `default` nor a
    /// (optionally `priority_level_` prefixed) integer.
    #[error("invalid priority label '{0}' (expected do_not_interrupt, default or priority_level_<n>)")]
    InvalidPriorityLabel(String),
}
