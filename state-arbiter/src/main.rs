/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use state_arbiter::config::{RobotConfig, StatesConfig};
use state_arbiter::machine::StateMachine;
use state_arbiter::oracle::{ControlMode, RobotManager};
use state_arbiter::service::{FmsMode, ServiceRunner, SharedFms, StatesService};
use state_arbiter::sim::{ready_key, SimBehaviorFactory, SimModeLogic, SimStateControls};
use state_arbiter::state::{Clock, StateDirectory, SystemClock};
use state_arbiter::values::{SharedValues, ACTIVE_STATES_KEY};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Runs the state arbiter against simulated behaviours.
///
/// Example:
///   state-arbiter --robot-config robot.yaml --states states.yaml \
///                 --mode autonomous --ticks 300 --ready auto_routine
#[derive(Debug, Parser)]
#[command(
    name = "state-arbiter",
    about = "Priority-based subsystem arbitration – simulation runner",
    long_about = None,
)]
struct Cli {
    /// Path to the robot configuration (subsystems, priority buckets, timing).
    #[arg(short = 'r', long = "robot-config")]
    robot_config: PathBuf,

    /// Path to the states file (state definitions grouped by type).
    #[arg(short = 's', long = "states")]
    states: PathBuf,

    /// Field mode to enter after start-up.
    #[arg(short = 'm', long = "mode", default_value = "teleop")]
    mode: FmsMode,

    /// Stop after this many ticks (runs until Ctrl-C otherwise).
    #[arg(short = 't', long = "ticks")]
    ticks: Option<u64>,

    /// Override the configured states service rate.
    #[arg(long = "rate-hz")]
    rate_hz: Option<u32>,

    /// Mark a state ready (repeatable).
    #[arg(long = "ready", value_name = "STATE")]
    ready: Vec<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        robot_config = %cli.robot_config.display(),
        states       = %cli.states.display(),
        mode         = ?cli.mode,
        ticks        = ?cli.ticks,
        rate_hz      = ?cli.rate_hz,
        ready        = ?cli.ready,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("State arbiter failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let robot = RobotConfig::load_from_file(&cli.robot_config)?;
    let states = StatesConfig::load_from_file(&cli.states)?;

    let values = Arc::new(SharedValues::new());
    for name in &cli.ready {
        values.set_boolean(&ready_key(name), true);
    }

    // ── Build the state tree ──────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let factory = SimBehaviorFactory::new(clock.clone());
    let machine = StateMachine::build(
        &robot.scheduling,
        &states,
        &factory,
        StateDirectory::new(clock),
        values.clone(),
    )
    .context("Failed to build state tree")?;
    info!(states = machine.directory().len(), "State tree built");

    let mut manager = RobotManager::new(Box::new(SimStateControls::default()), ControlMode::Teleop);
    manager.register_mode_logic(ControlMode::Teleop, Box::new(SimModeLogic::new(values.clone())));
    manager.register_mode_logic(
        ControlMode::Autonomous,
        Box::new(SimModeLogic::new(values.clone())),
    );

    let mut timing = robot.timing;
    if let Some(rate_hz) = cli.rate_hz {
        timing.state_service_rate_hz = rate_hz;
    }

    // Start disabled so the first tick performs the mode transition.
    let fms = Arc::new(SharedFms::new(FmsMode::Disabled));
    let service = StatesService::new(machine, manager, fms.clone(), values.clone(), timing);
    let runner = ServiceRunner::new(service);
    fms.set(cli.mode);

    // ── Ctrl-C → graceful shutdown ────────────────────────────────────────────
    {
        let runner = runner.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    runner.request_shutdown();
                }
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            }
        });
    }

    runner.run(cli.ticks).await?;

    info!(
        active = %values.get_string(ACTIVE_STATES_KEY).unwrap_or_default(),
        "Final active states"
    );
    Ok(())
}
