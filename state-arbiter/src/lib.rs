/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! State Arbiter – priority-based subsystem arbitration for robots
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/         – robot.yaml / states.yaml loading, ConfigError
//! ├── state/          – State variants, arena directory, behaviours, timers
//! ├── machine/        – StateMachine arbitration, PriorityPlan, ArbiterError
//! ├── oracle.rs       – Oracle / ModeLogic / RobotManager
//! ├── values.rs       – shared key/value store, input & diagnostics seams
//! ├── service/        – fixed-rate tick driver and the StatesService
//! └── sim.rs          – hardware-free behaviours and mode logic
//! ```

pub mod config;
pub mod machine;
pub mod oracle;
pub mod service;
pub mod sim;
pub mod state;
pub mod values;
