/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The service that follows the field mode and drives the state machine.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{ScheduledService, Scheduler};
use crate::config::TimingConfig;
use crate::machine::StateMachine;
use crate::oracle::RobotManager;
use crate::values::{DiagnosticsSink, SharedValues};

/// Set once subsystems have been zeroed; cleared on every Autonomous entry.
pub const ROBOT_ZEROED_KEY: &str = "ipb_robot_has_been_zeroed";
/// Set by the autonomous routine when it finished.
pub const AUTO_COMPLETE_KEY: &str = "ipb_auto_complete";
/// Duration of the last states frame, in milliseconds.
pub const FRAME_TIME_KEY: &str = "ipn_frame_time_states_service";

/// Mode reported by the field management system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmsMode {
    Disabled,
    Autonomous,
    Teleop,
}

impl std::str::FromStr for FmsMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(FmsMode::Disabled),
            "autonomous" | "auto" => Ok(FmsMode::Autonomous),
            "teleop" => Ok(FmsMode::Teleop),
            other => anyhow::bail!("unknown FMS mode '{other}' (expected disabled, autonomous or teleop)"),
        }
    }
}

/// Where the current field mode comes from.
pub trait FmsSource: Send + Sync {
    fn mode(&self) -> FmsMode;
}

/// An [`FmsSource`] set by hand (dashboard, simulation, tests).
#[derive(Debug)]
pub struct SharedFms(RwLock<FmsMode>);

impl SharedFms {
    pub fn new(mode: FmsMode) -> Self {
        Self(RwLock::new(mode))
    }

    pub fn set(&self, mode: FmsMode) {
        *self.0.write() = mode;
    }
}

impl FmsSource for SharedFms {
    fn mode(&self) -> FmsMode {
        *self.0.read()
    }
}

// ── StatesService ─────────────────────────────────────────────────────────────

/// Switches the robot manager and state machine between field modes and
/// ticks them while enabled.
pub struct StatesService {
    machine: StateMachine,
    manager: RobotManager,
    fms: Arc<dyn FmsSource>,
    values: Arc<SharedValues>,
    timing: TimingConfig,
    current_mode: FmsMode,
}

impl StatesService {
    /// The field mode at construction counts as already entered.
    pub fn new(
        machine: StateMachine,
        manager: RobotManager,
        fms: Arc<dyn FmsSource>,
        values: Arc<SharedValues>,
        timing: TimingConfig,
    ) -> Self {
        let current_mode = fms.mode();
        Self {
            machine,
            manager,
            fms,
            values,
            timing,
            current_mode,
        }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn current_mode(&self) -> FmsMode {
        self.current_mode
    }

    fn enter(&mut self, next: FmsMode) -> Result<()> {
        info!(from = ?self.current_mode, to = ?next, "FMS mode change");
        match next {
            FmsMode::Autonomous => {
                self.values.set_boolean(ROBOT_ZEROED_KEY, false);
                self.manager.initialize(next);
                self.machine.initialize();
            }
            FmsMode::Teleop => {
                let zeroed = self.values.get_boolean(ROBOT_ZEROED_KEY);
                let auto_complete = self.values.get_boolean(AUTO_COMPLETE_KEY);
                if !zeroed || auto_complete {
                    self.values.set_boolean(AUTO_COMPLETE_KEY, false);
                    self.manager.dispose();
                    self.machine.dispose(&mut self.manager)?;
                    self.manager.initialize(next);
                    self.machine.initialize();
                } else {
                    debug!("continuing autonomous states into teleop");
                }
            }
            FmsMode::Disabled => {
                self.manager.dispose();
                self.machine.dispose(&mut self.manager)?;
                self.values.set_boolean(ROBOT_ZEROED_KEY, false);
            }
        }
        Ok(())
    }

    fn frame_threshold_ms(&self) -> f64 {
        match self.timing.frame_time_threshold_ms {
            Some(ms) => ms as f64,
            None => self.scheduler().period().as_secs_f64() * 1000.0,
        }
    }
}

impl ScheduledService for StatesService {
    fn name(&self) -> &str {
        "StatesService"
    }

    fn start_up(&mut self) -> Result<()> {
        self.values.set_boolean(ROBOT_ZEROED_KEY, false);
        info!(
            states = self.machine.directory().len(),
            mode = ?self.current_mode,
            "StatesService started"
        );
        Ok(())
    }

    fn run_one_iteration(&mut self) -> Result<()> {
        let frame_start = Instant::now();

        let next = self.fms.mode();
        if next != self.current_mode {
            self.enter(next)?;
        }
        self.current_mode = next;

        if next == FmsMode::Disabled {
            self.manager.disabled_update();
        } else {
            self.manager.update();
            self.machine.update(&mut self.manager)?;
        }

        let frame_ms = frame_start.elapsed().as_secs_f64() * 1000.0;
        self.values.publish_numeric(FRAME_TIME_KEY, frame_ms);
        if frame_ms > self.frame_threshold_ms() {
            debug!(frame_ms, "States Service frame time over threshold");
        }
        Ok(())
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::from_rate_hz(self.timing.state_service_rate_hz)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use crate::config::{PriorityLabel, SchedulingConfig, StatesConfig};
    use crate::oracle::{ControlMode, ModeLogic, Oracle, StateControls};
    use crate::state::testing::{leaf, ProbeFactory};
    use crate::state::{ManualClock, StateDirectory, StateView};

    struct FollowFms(Option<ControlMode>);

    impl StateControls for FollowFms {
        fn initialize(&mut self, fms_mode: FmsMode) {
            self.0 = Some(match fms_mode {
                FmsMode::Autonomous => ControlMode::Autonomous,
                _ => ControlMode::Teleop,
            });
        }
        fn update(&mut self) -> Option<ControlMode> {
            self.0.take()
        }
    }

    struct ReadySet(Arc<Mutex<HashSet<String>>>);

    impl Oracle for ReadySet {
        fn is_ready(&mut self, state: &str) -> Result<bool> {
            Ok(self.0.lock().contains(state))
        }
        fn is_done(&mut self, _: &str, view: &mut StateView<'_>) -> Result<bool> {
            Ok(view.is_done())
        }
    }

    impl ModeLogic for ReadySet {}

    struct Rig {
        service: StatesService,
        fms: Arc<SharedFms>,
        values: Arc<SharedValues>,
        factory: ProbeFactory,
        ready: Arc<Mutex<HashSet<String>>>,
    }

    fn rig(initial: FmsMode) -> Rig {
        let mut states = StatesConfig::new();
        leaf(&mut states, "drive_auto", &["drive"]);
        leaf(&mut states, "idle", &["drive"]);
        let mut scheduling = SchedulingConfig {
            subsystems: vec!["drive".into()],
            ..SchedulingConfig::default()
        };
        scheduling.push_bucket(PriorityLabel::Level(1), ["drive_auto".to_string()]);
        scheduling.push_bucket(PriorityLabel::Default, ["idle".to_string()]);

        let factory = ProbeFactory::new();
        let values = Arc::new(SharedValues::new());
        let machine = StateMachine::build(
            &scheduling,
            &states,
            &factory,
            StateDirectory::new(Arc::new(ManualClock::new(0))),
            values.clone(),
        )
        .unwrap();

        let ready: Arc<Mutex<HashSet<String>>> = Arc::default();
        let mut manager = RobotManager::new(Box::new(FollowFms(None)), ControlMode::Teleop);
        manager.register_mode_logic(ControlMode::Teleop, Box::new(ReadySet(ready.clone())));
        manager.register_mode_logic(ControlMode::Autonomous, Box::new(ReadySet(ready.clone())));

        let fms = Arc::new(SharedFms::new(initial));
        let service = StatesService::new(
            machine,
            manager,
            fms.clone(),
            values.clone(),
            TimingConfig::default(),
        );
        Rig {
            service,
            fms,
            values,
            factory,
            ready,
        }
    }

    impl Rig {
        fn active(&self) -> Vec<&str> {
            self.service.machine().active_state_names()
        }
    }

    #[test]
    fn disabled_ticks_leave_states_alone() {
        let mut r = rig(FmsMode::Disabled);
        r.service.start_up().unwrap();
        r.service.run_one_iteration().unwrap();
        r.service.run_one_iteration().unwrap();

        assert!(r.active().is_empty());
        assert!(r.factory.events().is_empty());
    }

    #[test]
    fn entering_autonomous_starts_arbitration() {
        let mut r = rig(FmsMode::Disabled);
        r.service.start_up().unwrap();
        r.values.set_boolean(ROBOT_ZEROED_KEY, true);
        r.ready.lock().insert("drive_auto".into());

        r.fms.set(FmsMode::Autonomous);
        r.service.run_one_iteration().unwrap();

        assert_eq!(r.service.current_mode(), FmsMode::Autonomous);
        assert_eq!(r.active(), vec!["drive_auto"]);
        assert!(!r.values.get_boolean(ROBOT_ZEROED_KEY));
    }

    #[test]
    fn disabling_disposes_and_reestablishes_defaults() {
        let mut r = rig(FmsMode::Disabled);
        r.ready.lock().insert("drive_auto".into());
        r.fms.set(FmsMode::Autonomous);
        r.service.run_one_iteration().unwrap();
        r.factory.clear_events();

        r.ready.lock().clear();
        r.values.set_boolean(ROBOT_ZEROED_KEY, true);
        r.fms.set(FmsMode::Disabled);
        r.service.run_one_iteration().unwrap();

        assert_eq!(r.factory.events(), vec!["dispose drive_auto", "init idle", "update idle"]);
        assert_eq!(r.active(), vec!["idle"]);
        assert!(!r.values.get_boolean(ROBOT_ZEROED_KEY));
    }

    #[test]
    fn teleop_after_zeroed_auto_keeps_running_states() {
        let mut r = rig(FmsMode::Disabled);
        r.ready.lock().insert("drive_auto".into());
        r.fms.set(FmsMode::Autonomous);
        r.service.run_one_iteration().unwrap();

        r.values.set_boolean(ROBOT_ZEROED_KEY, true);
        r.factory.clear_events();
        r.fms.set(FmsMode::Teleop);
        r.service.run_one_iteration().unwrap();

        assert_eq!(r.active(), vec!["drive_auto"]);
        assert!(!r.factory.events().iter().any(|e| e.starts_with("dispose")));
    }

    #[test]
    fn teleop_after_auto_complete_resets() {
        let mut r = rig(FmsMode::Disabled);
        r.ready.lock().insert("drive_auto".into());
        r.fms.set(FmsMode::Autonomous);
        r.service.run_one_iteration().unwrap();

        r.values.set_boolean(ROBOT_ZEROED_KEY, true);
        r.values.set_boolean(AUTO_COMPLETE_KEY, true);
        r.factory.clear_events();
        r.fms.set(FmsMode::Teleop);
        r.service.run_one_iteration().unwrap();

        assert!(!r.values.get_boolean(AUTO_COMPLETE_KEY));
        let events = r.factory.events();
        assert_eq!(events[0], "dispose drive_auto");
        assert_eq!(r.active(), vec!["drive_auto"]);
    }

    #[test]
    fn frame_time_is_published() {
        let mut r = rig(FmsMode::Disabled);
        r.values.set_numeric(FRAME_TIME_KEY, -1.0);
        r.service.run_one_iteration().unwrap();
        assert!(r.values.get_numeric(FRAME_TIME_KEY) >= 0.0);
    }

    #[test]
    fn fms_mode_parses() {
        assert_eq!("Teleop".parse::<FmsMode>().unwrap(), FmsMode::Teleop);
        assert_eq!("auto".parse::<FmsMode>().unwrap(), FmsMode::Autonomous);
        assert!("test".parse::<FmsMode>().is_err());
    }

    #[test]
    fn scheduler_uses_configured_rate() {
        let r = rig(FmsMode::Disabled);
        assert_eq!(
            r.service.scheduler().period(),
            std::time::Duration::from_secs(1) / 60
        );
    }
}
