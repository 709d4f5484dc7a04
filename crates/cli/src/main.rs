//! `movegate` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Load configuration**: `MotionConfig` from the JSON file named by
//!    `MOVEGATE_CONFIG` and `SimConfig` from `MOVEGATE_SIM_CONFIG`; defaults
//!    when unset.
//! 2. **Wire observability**: JSON logs, plus OTLP span export when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set (see [`telemetry`]).
//! 3. **Construct infrastructure**: the simulated robot, the demo scene, the
//!    execution template, and the job server.
//! 4. **Run**: one demo pick-and-place job. Ctrl-C requests idle, which
//!    cancels the job at its next checkpoint and returns the arm home. The
//!    job result is printed to stdout as JSON.

mod demo;
mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use motion::{JobGoal, JobServer, MotionConfig, MoveIface};
use sim::{SimConfig, SimRobot};

use crate::demo::PickPlaceDemo;
use crate::telemetry::Telemetry;

const CONFIG_VAR: &str = "MOVEGATE_CONFIG";
const SIM_CONFIG_VAR: &str = "MOVEGATE_SIM_CONFIG";

fn motion_config() -> anyhow::Result<MotionConfig> {
    match std::env::var_os(CONFIG_VAR) {
        Some(path) => MotionConfig::load(&path)
            .with_context(|| format!("loading {}", Path::new(&path).display())),
        None => Ok(MotionConfig::default()),
    }
}

fn sim_config() -> anyhow::Result<SimConfig> {
    match std::env::var_os(SIM_CONFIG_VAR) {
        Some(path) => SimConfig::load(&path)
            .with_context(|| format!("loading {}", Path::new(&path).display())),
        None => Ok(SimConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let telemetry = Telemetry::init()?;
    let outcome = run().await;
    if let Err(e) = &outcome {
        error!(error = %format!("{e:#}"), "movegate failed");
    }
    telemetry.shutdown();
    outcome
}

async fn run() -> anyhow::Result<()> {
    let config = motion_config()?;
    let sim = sim_config()?;

    let robot = SimRobot::new(&sim)?;
    let iface = Arc::new(MoveIface::new(config, robot.collaborators(), robot.scene())?);
    demo::build_scene(&iface)?;
    info!(ready = iface.robot_ready_srv().success, "Simulated robot up");

    let server = Arc::new(JobServer::new(iface, Arc::new(PickPlaceDemo::default())));
    let mut job = tokio::spawn({
        let server = server.clone();
        async move { server.run_job_action(JobGoal::new()).await }
    });

    let result = tokio::select! {
        result = &mut job => result.context("job task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, switching to idle");
            if let Err(e) = server.idle_action().await {
                error!(error = %e, "Idle failed");
            }
            job.await.context("job task panicked")?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    info!(status = ?result.status, state = ?server.state(), "Done");
    Ok(())
}
