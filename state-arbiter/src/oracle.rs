/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Readiness and done-ness decisions, and the control-mode layer that owns
//! them.
//!
//! The [`StateMachine`](crate::machine::StateMachine) never decides on its
//! own whether a state *may* start or *has* finished; it asks an [`Oracle`].
//! On the robot the oracle is a [`RobotManager`], which forwards each
//! question to the [`ModeLogic`] of the control mode currently selected by
//! the robot's [`StateControls`].

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, Result};
use tracing::{debug, error, info, warn};

use crate::service::FmsMode;
use crate::state::StateView;

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Answers the two questions the arbitration loop cannot answer itself.
pub trait Oracle {
    /// May `state` start now?
    fn is_ready(&mut self, state: &str) -> Result<bool>;

    /// Has `state` finished?  `view.is_done()` gives the state's built-in
    /// rule, so implementations only override the names they care about.
    fn is_done(&mut self, state: &str, view: &mut StateView<'_>) -> Result<bool>;
}

/// An [`Oracle`] with a lifecycle, active while its control mode is
/// selected.
pub trait ModeLogic: Oracle + Send {
    fn initialize(&mut self) {}

    /// Called once per tick before arbitration.
    fn update(&mut self) {}

    fn dispose(&mut self) {}
}

// ── Control modes ─────────────────────────────────────────────────────────────

/// A driver-facing control mode, each backed by one [`ModeLogic`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlMode {
    Autonomous,
    Teleop,
    /// Robot-specific modes (e.g. a manual override).
    Custom(String),
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Autonomous => f.write_str("AUTONOMOUS"),
            ControlMode::Teleop => f.write_str("TELEOP"),
            ControlMode::Custom(name) => f.write_str(name),
        }
    }
}

/// Robot-specific selection of the control mode (buttons, auto chooser…).
pub trait StateControls: Send {
    /// Called when the robot enters Autonomous or Teleop.
    fn initialize(&mut self, fms_mode: FmsMode);

    /// Called every enabled tick.  Returns the mode to switch to, or `None`
    /// to keep the current one.
    fn update(&mut self) -> Option<ControlMode>;

    fn dispose(&mut self) {}
}

/// Global flags and math computed once per tick for every mode.
pub trait RobotStatus: Send {
    fn initialize(&mut self) {}

    fn update(&mut self) {}

    /// Runs every tick while the robot is disabled.
    fn disabled_update(&mut self) {}

    fn dispose(&mut self) {}
}

// ── RobotManager ──────────────────────────────────────────────────────────────

/// Selects the active [`ModeLogic`] and answers oracle queries through it.
pub struct RobotManager {
    controls: Box<dyn StateControls>,
    status: Option<Box<dyn RobotStatus>>,
    logic: HashMap<ControlMode, Box<dyn ModeLogic>>,
    current: ControlMode,
    /// Mode whose logic is currently initialised, if any.
    last: Option<ControlMode>,
}

impl RobotManager {
    /// `initial` is the mode used until the controls request another one.
    pub fn new(controls: Box<dyn StateControls>, initial: ControlMode) -> Self {
        Self {
            controls,
            status: None,
            logic: HashMap::new(),
            current: initial,
            last: None,
        }
    }

    pub fn with_status(mut self, status: Box<dyn RobotStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn register_mode_logic(&mut self, mode: ControlMode, logic: Box<dyn ModeLogic>) {
        debug!(mode = %mode, "registered mode logic");
        self.logic.insert(mode, logic);
    }

    pub fn current_mode(&self) -> &ControlMode {
        &self.current
    }

    /// Switches to `mode` unless no logic is registered for it, in which
    /// case the request is logged and dropped.
    fn request_mode(&mut self, mode: ControlMode) {
        if mode == self.current {
            return;
        }
        if self.logic.contains_key(&mode) {
            debug!(from = %self.current, to = %mode, "control mode requested");
            self.current = mode;
        } else {
            error!(mode = %mode, "No mode logic specified for control mode, keeping {}", self.current);
        }
    }

    /// Entering Autonomous or Teleop: resets the status and lets the
    /// controls pick a mode.  The chosen logic is initialised on the next
    /// [`update`](Self::update).
    pub fn initialize(&mut self, fms_mode: FmsMode) {
        if let Some(status) = self.status.as_mut() {
            status.initialize();
        }
        self.controls.initialize(fms_mode);
        if let Some(mode) = self.controls.update() {
            self.request_mode(mode);
        }
    }

    pub fn update(&mut self) {
        if let Some(status) = self.status.as_mut() {
            status.update();
        }
        if let Some(mode) = self.controls.update() {
            self.request_mode(mode);
        }

        if self.last.as_ref() != Some(&self.current) {
            if let Some(previous) = self.last.take() {
                if let Some(logic) = self.logic.get_mut(&previous) {
                    debug!(mode = %previous, "disposing mode logic");
                    logic.dispose();
                }
            }
            let Some(logic) = self.logic.get_mut(&self.current) else {
                warn!(mode = %self.current, "no mode logic registered for current control mode");
                return;
            };
            debug!(mode = %self.current, "initializing mode logic");
            logic.initialize();
            self.last = Some(self.current.clone());
        }

        if let Some(logic) = self.logic.get_mut(&self.current) {
            logic.update();
        }
    }

    pub fn disabled_update(&mut self) {
        if let Some(status) = self.status.as_mut() {
            status.disabled_update();
        }
    }

    /// Leaving a mode: the current logic is disposed and forgotten so that
    /// the next enabled tick initialises it again.
    pub fn dispose(&mut self) {
        info!(mode = %self.current, "Leaving control mode");
        if let Some(status) = self.status.as_mut() {
            status.dispose();
        }
        self.controls.dispose();
        if let Some(previous) = self.last.take() {
            if let Some(logic) = self.logic.get_mut(&previous) {
                logic.dispose();
            }
        }
    }

    fn current_logic(&mut self) -> Result<&mut Box<dyn ModeLogic>> {
        let mode = &self.current;
        self.logic
            .get_mut(mode)
            .ok_or_else(|| anyhow!("no mode logic registered for control mode {mode}"))
    }
}

impl Oracle for RobotManager {
    fn is_ready(&mut self, state: &str) -> Result<bool> {
        self.current_logic()?.is_ready(state)
    }

    fn is_done(&mut self, state: &str, view: &mut StateView<'_>) -> Result<bool> {
        self.current_logic()?.is_done(state, view)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::state::testing::{leaf, ProbeFactory};
    use crate::state::{ManualClock, StateDirectory};
    use crate::config::StatesConfig;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        tag: &'static str,
        log: Log,
    }

    impl Oracle for Recording {
        fn is_ready(&mut self, state: &str) -> Result<bool> {
            Ok(state == self.tag)
        }

        fn is_done(&mut self, _: &str, view: &mut StateView<'_>) -> Result<bool> {
            Ok(view.is_done())
        }
    }

    impl ModeLogic for Recording {
        fn initialize(&mut self) {
            self.log.lock().push(format!("init {}", self.tag));
        }
        fn update(&mut self) {
            self.log.lock().push(format!("update {}", self.tag));
        }
        fn dispose(&mut self) {
            self.log.lock().push(format!("dispose {}", self.tag));
        }
    }

    /// Requests whatever mode the test last stored.
    struct Scripted {
        next: Arc<Mutex<Option<ControlMode>>>,
        log: Log,
    }

    impl StateControls for Scripted {
        fn initialize(&mut self, fms_mode: FmsMode) {
            self.log.lock().push(format!("controls init {fms_mode:?}"));
        }
        fn update(&mut self) -> Option<ControlMode> {
            self.next.lock().take()
        }
        fn dispose(&mut self) {
            self.log.lock().push("controls dispose".into());
        }
    }

    struct Fixture {
        manager: RobotManager,
        next: Arc<Mutex<Option<ControlMode>>>,
        log: Log,
    }

    fn fixture() -> Fixture {
        let log: Log = Arc::default();
        let next = Arc::new(Mutex::new(None));
        let mut manager = RobotManager::new(
            Box::new(Scripted {
                next: next.clone(),
                log: log.clone(),
            }),
            ControlMode::Teleop,
        );
        manager.register_mode_logic(
            ControlMode::Teleop,
            Box::new(Recording {
                tag: "teleop",
                log: log.clone(),
            }),
        );
        manager.register_mode_logic(
            ControlMode::Autonomous,
            Box::new(Recording {
                tag: "auto",
                log: log.clone(),
            }),
        );
        Fixture { manager, next, log }
    }

    #[test]
    fn first_update_initializes_current_logic() {
        let mut f = fixture();
        f.manager.initialize(FmsMode::Teleop);
        f.manager.update();
        f.manager.update();

        assert_eq!(
            *f.log.lock(),
            vec!["controls init Teleop", "init teleop", "update teleop", "update teleop"]
        );
    }

    #[test]
    fn switching_mode_disposes_previous_logic() {
        let mut f = fixture();
        f.manager.update();
        f.log.lock().clear();

        *f.next.lock() = Some(ControlMode::Autonomous);
        f.manager.update();

        assert_eq!(f.manager.current_mode(), &ControlMode::Autonomous);
        assert_eq!(*f.log.lock(), vec!["dispose teleop", "init auto", "update auto"]);
    }

    #[test]
    fn unmapped_mode_is_ignored() {
        let mut f = fixture();
        f.manager.update();
        f.log.lock().clear();

        *f.next.lock() = Some(ControlMode::Custom("manual".into()));
        f.manager.update();

        assert_eq!(f.manager.current_mode(), &ControlMode::Teleop);
        assert_eq!(*f.log.lock(), vec!["update teleop"]);
    }

    #[test]
    fn dispose_forgets_logic_so_it_reinitializes() {
        let mut f = fixture();
        f.manager.update();
        f.manager.dispose();
        f.manager.update();

        assert_eq!(
            *f.log.lock(),
            vec![
                "init teleop",
                "update teleop",
                "controls dispose",
                "dispose teleop",
                "init teleop",
                "update teleop"
            ]
        );
    }

    #[test]
    fn oracle_delegates_to_current_logic() {
        let mut f = fixture();
        assert!(f.manager.is_ready("teleop").unwrap());
        assert!(!f.manager.is_ready("auto").unwrap());

        *f.next.lock() = Some(ControlMode::Autonomous);
        f.manager.update();
        assert!(f.manager.is_ready("auto").unwrap());

        let mut states = StatesConfig::new();
        leaf(&mut states, "intake", &["intake"]);
        let factory = ProbeFactory::new();
        let mut dir = StateDirectory::new(Arc::new(ManualClock::new(0)));
        let id = dir.get_or_create("intake", &states, &factory).unwrap();
        factory.set_done("intake", true);
        let mut view = StateView::new(&mut dir, id);
        assert!(f.manager.is_done("intake", &mut view).unwrap());
    }

    #[test]
    fn oracle_without_logic_is_an_error() {
        let controls = Scripted {
            next: Arc::default(),
            log: Arc::default(),
        };
        let mut manager = RobotManager::new(Box::new(controls), ControlMode::Teleop);
        let err = manager.is_ready("anything").unwrap_err();
        assert!(err.to_string().contains("TELEOP"));
    }

    #[test]
    fn robot_status_follows_manager_lifecycle() {
        struct Status(Log);
        impl RobotStatus for Status {
            fn update(&mut self) {
                self.0.lock().push("status update".into());
            }
            fn disabled_update(&mut self) {
                self.0.lock().push("status disabled".into());
            }
        }

        let f = fixture();
        let log = f.log.clone();
        let mut manager = f.manager.with_status(Box::new(Status(log.clone())));
        manager.disabled_update();
        manager.update();

        let events = log.lock().clone();
        assert_eq!(events[0], "status disabled");
        assert_eq!(events[1], "status update");
    }
}
