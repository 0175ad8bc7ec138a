/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Robot and state configuration loading.
//!
//! Two YAML files feed the arbiter.  The robot file names the subsystems and
//! groups the schedulable states into priority buckets:
//!
//! ```yaml
//! general:
//!   subsystems: [drive, arm]
//!   states:
//!     sequences:
//!       priority_level_1: [auto_routine]
//!     drive:
//!       priority_level_2: [shoot]
//!       default: [drive_idle]
//!     arm:
//!       do_not_interrupt: [arm_home]
//! global_timing:
//!   frame_time_threshold_state_service: 40
//! ```
//!
//! The states file groups state definitions by their type:
//!
//! ```yaml
//! single_state:
//!   drive_idle: { behavior: hold, behavior_config: { subsystems: [drive] } }
//! sequencer_state:
//!   auto_routine: { sequence: [drive_forward, shoot] }
//! ```
//!
//! Both files are parsed once into typed structs; nothing downstream looks at
//! raw YAML again except behaviours reading their own `behavior_config`.

pub mod error;

pub use error::ConfigError;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Bucket label for states that keep their subsystems until done.
pub const DO_NOT_INTERRUPT: &str = "do_not_interrupt";

/// Bucket label for fallback states.
pub const DEFAULT: &str = "default";

/// Optional prefix on numeric bucket labels (`priority_level_3` == `3`).
const PRIORITY_LEVEL_PREFIX: &str = "priority_level_";

/// Fixed state groups that precede the per-subsystem groups.
const LEADING_STATE_GROUPS: [&str; 2] = ["sequences", "parallels"];

/// Top-level key in `states.yaml` holding per-robot overrides, which are
/// resolved before the file reaches this loader.
const VARIATIONS_KEY: &str = "variations";

/// Tick rate used when `global_timing.state_service_rate_hz` is absent.
pub const DEFAULT_STATE_SERVICE_RATE_HZ: u32 = 60;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RobotConfigFile {
    general: GeneralSection,
    #[serde(default)]
    global_timing: GlobalTimingSection,
}

#[derive(Debug, Deserialize)]
struct GeneralSection {
    #[serde(default)]
    subsystems: Vec<String>,
    /// group name → (bucket label → state names)
    #[serde(default)]
    states: HashMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalTimingSection {
    frame_time_threshold_state_service: Option<u64>,
    state_service_rate_hz: Option<u32>,
}

// ── Priority labels ───────────────────────────────────────────────────────────

/// A priority bucket label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityLabel {
    /// Running states here cannot be pre-empted until they report done.
    DoNotInterrupt,
    /// Numeric level; larger numbers are arbitrated first.
    Level(i64),
    /// Fallback states that take whatever subsystems are left.
    Default,
}

impl PriorityLabel {
    /// Parses `do_not_interrupt`, `default`, `priority_level_<n>` or `<n>`.
    pub fn parse(label: &str) -> Result<Self, ConfigError> {
        match label {
            DO_NOT_INTERRUPT => Ok(PriorityLabel::DoNotInterrupt),
            DEFAULT => Ok(PriorityLabel::Default),
            other => other
                .strip_prefix(PRIORITY_LEVEL_PREFIX)
                .unwrap_or(other)
                .parse::<i64>()
                .map(PriorityLabel::Level)
                .map_err(|_| ConfigError::InvalidPriorityLabel(label.to_string())),
        }
    }
}

impl std::fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityLabel::DoNotInterrupt => f.write_str(DO_NOT_INTERRUPT),
            PriorityLabel::Level(n) => write!(f, "{n}"),
            PriorityLabel::Default => f.write_str(DEFAULT),
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Global scheduling input: which subsystems exist and which states compete
/// for them at which priority.
#[derive(Debug, Clone, Default)]
pub struct SchedulingConfig {
    /// Every exclusive hardware resource, in declaration order.
    pub subsystems: Vec<String>,
    /// Buckets in first-seen order; names inside a bucket keep declaration
    /// order and are unique.
    pub states_by_priority: Vec<(PriorityLabel, Vec<String>)>,
}

impl SchedulingConfig {
    /// Returns the state names in `label`'s bucket (empty if absent).
    pub fn bucket(&self, label: PriorityLabel) -> &[String] {
        self.states_by_priority
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, names)| names.as_slice())
            .unwrap_or(&[])
    }

    /// Every scheduled state name, unique, in bucket declaration order.
    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, bucket) in &self.states_by_priority {
            for name in bucket {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Adds `names` to `label`'s bucket, skipping names already present.
    pub fn push_bucket(&mut self, label: PriorityLabel, names: impl IntoIterator<Item = String>) {
        let idx = match self.states_by_priority.iter().position(|(l, _)| *l == label) {
            Some(idx) => idx,
            None => {
                self.states_by_priority.push((label, Vec::new()));
                self.states_by_priority.len() - 1
            }
        };
        let bucket = &mut self.states_by_priority[idx].1;
        for name in names {
            if !bucket.contains(&name) {
                bucket.push(name);
            }
        }
    }
}

/// Frame timing knobs for the states service.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Frames slower than this many milliseconds are logged.  `None` means
    /// every frame longer than the tick period is reported.
    pub frame_time_threshold_ms: Option<u64>,
    pub state_service_rate_hz: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_time_threshold_ms: None,
            state_service_rate_hz: DEFAULT_STATE_SERVICE_RATE_HZ,
        }
    }
}

/// Parsed `robot.yaml`.
#[derive(Debug, Clone, Default)]
pub struct RobotConfig {
    pub scheduling: SchedulingConfig,
    pub timing: TimingConfig,
}

impl RobotConfig {
    /// Reads and parses `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid or a priority label is malformed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading robot configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse robot configuration: {}", path.display()))
    }

    /// Parses robot configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RobotConfigFile =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;

        let GeneralSection {
            subsystems,
            mut states,
        } = file.general;

        let group_order: Vec<String> = LEADING_STATE_GROUPS
            .iter()
            .map(|g| g.to_string())
            .chain(subsystems.iter().cloned())
            .collect();

        let mut scheduling = SchedulingConfig {
            subsystems,
            states_by_priority: Vec::new(),
        };

        for group in &group_order {
            let Some(buckets) = states.remove(group) else {
                continue;
            };
            for (label, names) in buckets {
                let label = PriorityLabel::parse(&label)?;
                debug!(group = %group, label = %label, states = ?names, "priority bucket");
                scheduling.push_bucket(label, names);
            }
        }

        let mut ignored: Vec<&String> = states.keys().collect();
        ignored.sort();
        for group in ignored {
            warn!(group = %group, "state group is neither a subsystem nor sequences/parallels, ignoring");
        }

        let timing = TimingConfig {
            frame_time_threshold_ms: file.global_timing.frame_time_threshold_state_service,
            state_service_rate_hz: file
                .global_timing
                .state_service_rate_hz
                .unwrap_or(DEFAULT_STATE_SERVICE_RATE_HZ),
        };

        info!(
            subsystems = ?scheduling.subsystems,
            buckets = scheduling.states_by_priority.len(),
            states = scheduling.state_names().len(),
            rate_hz = timing.state_service_rate_hz,
            "Robot configuration loaded"
        );

        Ok(Self { scheduling, timing })
    }
}

// ── Behaviour configuration ───────────────────────────────────────────────────

/// Free-form settings handed to a behaviour each time its state is entered.
///
/// The shape is owned by the behaviour, so it stays a YAML mapping; typed
/// access goes through [`BehaviorConfig::get`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct BehaviorConfig(serde_yaml::Mapping);

impl BehaviorConfig {
    pub fn new(mapping: serde_yaml::Mapping) -> Self {
        Self(mapping)
    }

    /// Deserializes `key` as `T`.  `Ok(None)` when the key is absent.
    ///
    /// # Errors
    /// Returns the serde error when the value exists but is not a `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_yaml::Error> {
        self.0
            .get(key)
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()
    }
}

// ── Per-state configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SingleStateConfig {
    pub behavior: String,
    #[serde(default)]
    pub behavior_config: BehaviorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SequencerStateConfig {
    pub sequence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParallelStateConfig {
    pub foreground_states: Vec<String>,
    #[serde(default)]
    pub background_states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimedStateConfig {
    pub state: String,
    /// Milliseconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DoneForTimeStateConfig {
    pub state: String,
    /// Settle time in milliseconds.
    pub state_timeout: u64,
    /// Absolute cap in milliseconds; absent or negative disables it.
    #[serde(default)]
    max_timeout: Option<i64>,
}

impl DoneForTimeStateConfig {
    pub fn new(state: impl Into<String>, state_timeout: u64, max_timeout: Option<u64>) -> Self {
        Self {
            state: state.into(),
            state_timeout,
            max_timeout: max_timeout.map(|ms| ms as i64),
        }
    }

    /// The max timeout, or `None` when disabled (`-1` / absent).
    pub fn max_timeout(&self) -> Option<u64> {
        self.max_timeout
            .and_then(|ms| if ms < 0 { None } else { Some(ms as u64) })
    }
}

/// Typed configuration for one state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateConfig {
    Single(SingleStateConfig),
    Parallel(ParallelStateConfig),
    Sequencer(SequencerStateConfig),
    Timed(TimedStateConfig),
    DoneForTime(DoneForTimeStateConfig),
}

impl StateConfig {
    /// Parses one entry of the `kind` group.
    pub fn from_yaml(name: &str, kind: &str, value: serde_yaml::Value) -> Result<Self, ConfigError> {
        fn typed<T: DeserializeOwned>(name: &str, value: serde_yaml::Value) -> Result<T, ConfigError> {
            serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidStateConfig {
                state: name.to_string(),
                reason: e.to_string(),
            })
        }

        match kind {
            "single_state" => typed(name, value).map(StateConfig::Single),
            "parallel_state" => typed(name, value).map(StateConfig::Parallel),
            "sequencer_state" => typed(name, value).map(StateConfig::Sequencer),
            "timed_state" => typed(name, value).map(StateConfig::Timed),
            "done_for_time_state" => typed(name, value).map(StateConfig::DoneForTime),
            other => Err(ConfigError::UnknownStateType {
                state: name.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    /// The `type` string as written in YAML.
    pub fn kind(&self) -> &'static str {
        match self {
            StateConfig::Single(_) => "single_state",
            StateConfig::Parallel(_) => "parallel_state",
            StateConfig::Sequencer(_) => "sequencer_state",
            StateConfig::Timed(_) => "timed_state",
            StateConfig::DoneForTime(_) => "done_for_time_state",
        }
    }
}

/// Parsed `states.yaml`: state name → typed configuration.
#[derive(Debug, Clone, Default)]
pub struct StatesConfig {
    states: HashMap<String, StateConfig>,
}

impl StatesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses `path`.
    ///
    /// # Errors
    /// I/O and YAML failures, plus any [`ConfigError`] raised while typing
    /// the entries (retrievable with `downcast_ref`).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading state configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse state configuration: {}", path.display()))
    }

    /// Parses state configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let groups: HashMap<String, Option<HashMap<String, serde_yaml::Value>>> =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;

        let mut config = Self::new();
        for (kind, entries) in groups {
            if kind == VARIATIONS_KEY {
                debug!("skipping '{}' section", VARIATIONS_KEY);
                continue;
            }
            for (name, value) in entries.unwrap_or_default() {
                let state = StateConfig::from_yaml(&name, &kind, value)?;
                config.insert(name, state)?;
            }
        }

        info!("Loaded {} state definition(s)", config.len());
        Ok(config)
    }

    /// Adds a state definition.
    ///
    /// # Errors
    /// [`ConfigError::DuplicateState`] if `name` is already defined.
    pub fn insert(&mut self, name: impl Into<String>, state: StateConfig) -> Result<(), ConfigError> {
        let name = name.into();
        if self.states.contains_key(&name) {
            return Err(ConfigError::DuplicateState { state: name });
        }
        debug!(state = %name, kind = state.kind(), "state definition");
        self.states.insert(name, state);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StateConfig> {
        self.states.get(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
