/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Hardware-free behaviours and mode logic.
//!
//! Lets the binary run a real `states.yaml` on a desk: every behaviour
//! claims the subsystems listed in its `behavior_config` and finishes after
//! `duration_ms`, and readiness is read from boolean inputs named
//! `ipb_ready_<state>`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::BehaviorConfig;
use crate::oracle::{ControlMode, ModeLogic, Oracle, StateControls};
use crate::service::FmsMode;
use crate::state::{Behavior, BehaviorFactory, Clock, StateView};
use crate::values::InputSource;

/// Prefix of the boolean input that marks a state ready.
pub const READY_PREFIX: &str = "ipb_ready_";

pub fn ready_key(state: &str) -> String {
    format!("{READY_PREFIX}{state}")
}

// ── Behaviour ─────────────────────────────────────────────────────────────────

/// Claims configured subsystems and reports done once `duration_ms` has
/// elapsed since the state was entered.  Without a duration it never
/// finishes.
pub struct SimBehavior {
    name: String,
    subsystems: Vec<String>,
    default_duration_ms: Option<u64>,
    duration_ms: Option<u64>,
    entered_at_ms: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl SimBehavior {
    pub fn new(name: &str, config: &BehaviorConfig, clock: Arc<dyn Clock>) -> Self {
        let subsystems = read_or_default(name, config, "subsystems");
        let duration_ms = read_or_default(name, config, "duration_ms");
        Self {
            name: name.to_string(),
            subsystems,
            default_duration_ms: duration_ms,
            duration_ms,
            entered_at_ms: None,
            clock,
        }
    }
}

fn read_or_default<T: serde::de::DeserializeOwned + Default>(
    behavior: &str,
    config: &BehaviorConfig,
    key: &str,
) -> T {
    match config.get(key) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!(behavior = %behavior, key, "ignoring malformed behavior config: {e}");
            T::default()
        }
    }
}

impl Behavior for SimBehavior {
    fn initialize(&mut self, state_name: &str, config: &BehaviorConfig) {
        // A state may override the duration of the shared behaviour.
        self.duration_ms = match config.get::<u64>("duration_ms") {
            Ok(Some(ms)) => Some(ms),
            _ => self.default_duration_ms,
        };
        self.entered_at_ms = Some(self.clock.now_ms());
        debug!(behavior = %self.name, state = %state_name, duration_ms = ?self.duration_ms, "sim behavior entered");
    }

    fn update(&mut self) {}

    fn dispose(&mut self) {
        self.entered_at_ms = None;
    }

    fn is_done(&self) -> bool {
        match (self.entered_at_ms, self.duration_ms) {
            (Some(entered), Some(duration)) => {
                self.clock.now_ms().saturating_sub(entered) >= duration
            }
            _ => false,
        }
    }

    fn subsystems(&self) -> Vec<String> {
        self.subsystems.clone()
    }
}

/// Builds a [`SimBehavior`] for any behaviour name.
pub struct SimBehaviorFactory {
    clock: Arc<dyn Clock>,
}

impl SimBehaviorFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl BehaviorFactory for SimBehaviorFactory {
    fn create(&self, behavior: &str, config: &BehaviorConfig) -> Option<Box<dyn Behavior>> {
        Some(Box::new(SimBehavior::new(behavior, config, self.clock.clone())))
    }
}

// ── Mode logic ────────────────────────────────────────────────────────────────

/// Ready when `ipb_ready_<state>` is set; done by the state's own rule.
pub struct SimModeLogic {
    inputs: Arc<dyn InputSource>,
}

impl SimModeLogic {
    pub fn new(inputs: Arc<dyn InputSource>) -> Self {
        Self { inputs }
    }
}

impl Oracle for SimModeLogic {
    fn is_ready(&mut self, state: &str) -> Result<bool> {
        Ok(self.inputs.boolean(&ready_key(state)))
    }

    fn is_done(&mut self, _state: &str, view: &mut StateView<'_>) -> Result<bool> {
        Ok(view.is_done())
    }
}

impl ModeLogic for SimModeLogic {}

/// Selects Autonomous or Teleop to match the field mode.
#[derive(Debug, Default)]
pub struct SimStateControls {
    pending: Option<ControlMode>,
}

impl StateControls for SimStateControls {
    fn initialize(&mut self, fms_mode: FmsMode) {
        self.pending = match fms_mode {
            FmsMode::Autonomous => Some(ControlMode::Autonomous),
            FmsMode::Teleop => Some(ControlMode::Teleop),
            FmsMode::Disabled => None,
        };
    }

    fn update(&mut self) -> Option<ControlMode> {
        self.pending.take()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SingleStateConfig, StateConfig, StatesConfig};
    use crate::state::{ManualClock, StateDirectory};
    use crate::values::SharedValues;

    fn config(yaml: &str) -> BehaviorConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn behavior_reads_subsystems_and_duration() {
        let clock = Arc::new(ManualClock::new(0));
        let mut behavior = SimBehavior::new(
            "spin",
            &config("{ subsystems: [drive, arm], duration_ms: 300 }"),
            clock.clone(),
        );
        assert_eq!(behavior.subsystems(), vec!["drive", "arm"]);
        assert!(!behavior.is_done(), "not done before entry");

        clock.set(1_000);
        behavior.initialize("spin", &BehaviorConfig::default());
        clock.set(1_299);
        assert!(!behavior.is_done());
        clock.set(1_300);
        assert!(behavior.is_done());

        behavior.dispose();
        assert!(!behavior.is_done());
    }

    #[test]
    fn state_config_overrides_duration() {
        let clock = Arc::new(ManualClock::new(0));
        let mut behavior = SimBehavior::new("spin", &config("{ duration_ms: 300 }"), clock.clone());

        behavior.initialize("spin_long", &config("{ duration_ms: 900 }"));
        clock.set(300);
        assert!(!behavior.is_done());
        clock.set(900);
        assert!(behavior.is_done());
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let clock = Arc::new(ManualClock::new(0));
        let mut behavior =
            SimBehavior::new("odd", &config("{ subsystems: 7, duration_ms: soon }"), clock.clone());
        assert!(behavior.subsystems().is_empty());
        behavior.initialize("odd", &BehaviorConfig::default());
        clock.set(u64::MAX / 2);
        assert!(!behavior.is_done(), "no duration means never done");
    }

    #[test]
    fn mode_logic_reads_ready_inputs() {
        let values = Arc::new(SharedValues::new());
        values.set_boolean(&ready_key("shoot"), true);
        let mut logic = SimModeLogic::new(values.clone());

        assert!(logic.is_ready("shoot").unwrap());
        assert!(!logic.is_ready("climb").unwrap());

        let clock = Arc::new(ManualClock::new(0));
        let mut states = StatesConfig::new();
        states
            .insert(
                "shoot",
                StateConfig::Single(SingleStateConfig {
                    behavior: "shooter".into(),
                    behavior_config: config("{ subsystems: [turret], duration_ms: 0 }"),
                }),
            )
            .unwrap();
        let factory = SimBehaviorFactory::new(clock.clone());
        let mut dir = StateDirectory::new(clock);
        let id = dir.get_or_create("shoot", &states, &factory).unwrap();
        dir.initialize(id);

        let mut view = StateView::new(&mut dir, id);
        assert!(logic.is_done("shoot", &mut view).unwrap());
    }

    #[test]
    fn demo_autonomous_routine_runs_to_completion() {
        use crate::config::RobotConfig;
        use crate::machine::StateMachine;
        use crate::oracle::RobotManager;

        let robot = RobotConfig::from_yaml_str(include_str!("../../demos/robot.yaml")).unwrap();
        let states = StatesConfig::from_yaml_str(include_str!("../../demos/states.yaml")).unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let values = Arc::new(SharedValues::new());
        values.set_boolean(&ready_key("auto_routine"), true);

        let mut machine = StateMachine::build(
            &robot.scheduling,
            &states,
            &SimBehaviorFactory::new(clock.clone()),
            StateDirectory::new(clock.clone()),
            values.clone(),
        )
        .unwrap();
        let mut manager =
            RobotManager::new(Box::new(SimStateControls::default()), ControlMode::Teleop);
        manager.register_mode_logic(
            ControlMode::Autonomous,
            Box::new(SimModeLogic::new(values.clone())),
        );
        manager.register_mode_logic(ControlMode::Teleop, Box::new(SimModeLogic::new(values.clone())));
        manager.initialize(FmsMode::Autonomous);

        let mut tick = |at_ms: u64| {
            clock.set(at_ms);
            manager.update();
            machine.update(&mut manager).unwrap();
            machine
                .active_state_names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            tick(0),
            vec!["auto_routine", "drive_forward", "drive_forward_inner"]
        );
        // the drive step finishes; the sequencer advances during this tick
        tick(1_500);
        // aim runs on the arm while the finished drive leaf is held
        assert_eq!(
            tick(1_500),
            vec!["auto_routine", "aim", "aim_inner", "drive_forward_inner"]
        );
        // aim_inner finishes at 1750 and must stay done for 500 ms
        tick(1_750);
        tick(2_250);
        assert_eq!(tick(2_250), vec!["drive_idle", "arm_hold"]);
    }

    #[test]
    fn controls_follow_fms_mode() {
        let mut controls = SimStateControls::default();
        controls.initialize(FmsMode::Autonomous);
        assert_eq!(controls.update(), Some(ControlMode::Autonomous));
        assert_eq!(controls.update(), None);
        controls.initialize(FmsMode::Disabled);
        assert_eq!(controls.update(), None);
    }
}
