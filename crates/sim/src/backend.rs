//! Simulated deployment hooks: a two-state gripper and trajectory retiming.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use motion::{Backend, ErrorKind, MoveError, MoveResult, Trajectory};

use crate::SimConfig;

/// Position of the simulated gripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperState {
    Open,
    Closed,
}

/// Backend for the simulated deployment.
pub struct SimBackend {
    gripper: Mutex<GripperState>,
    delay: Duration,
    speedup: f64,
    jammed: AtomicBool,
    reject: AtomicBool,
    hang: AtomicBool,
    gripper_calls: AtomicUsize,
    modify_calls: AtomicUsize,
}

impl SimBackend {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            gripper: Mutex::new(GripperState::Open),
            delay: Duration::from_millis(config.gripper_delay_ms),
            speedup: config.trajectory_speedup,
            jammed: AtomicBool::new(false),
            reject: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            gripper_calls: AtomicUsize::new(0),
            modify_calls: AtomicUsize::new(0),
        }
    }

    pub fn gripper_state(&self) -> GripperState {
        *self.gripper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A jammed gripper reports failure and does not move.
    pub fn set_jammed(&self, jammed: bool) {
        self.jammed.store(jammed, Ordering::SeqCst);
    }

    /// Makes both trajectory hooks reject everything.
    pub fn set_reject_trajectories(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Makes every hook block forever.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn gripper_calls(&self) -> usize {
        self.gripper_calls.load(Ordering::SeqCst)
    }

    pub fn modify_calls(&self) -> usize {
        self.modify_calls.load(Ordering::SeqCst)
    }

    async fn hang_if_requested(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn actuate(&self, target: GripperState) -> MoveResult {
        self.gripper_calls.fetch_add(1, Ordering::SeqCst);
        self.hang_if_requested().await;
        if self.jammed.load(Ordering::SeqCst) {
            warn!(?target, "Gripper jammed");
            return Err(MoveError::new(ErrorKind::GripperFailed, "gripper jammed"));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.gripper.lock().unwrap_or_else(PoisonError::into_inner) = target;
        debug!(?target, "Gripper actuated");
        Ok(())
    }

    async fn retime(&self, trajectory: &mut Trajectory) -> bool {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        self.hang_if_requested().await;
        if self.reject.load(Ordering::SeqCst) {
            debug!("Trajectory rejected by backend");
            return false;
        }
        trajectory.scale_time(self.speedup)
    }
}

#[async_trait]
impl Backend for SimBackend {
    async fn close_gripper(&self) -> MoveResult {
        self.actuate(GripperState::Closed).await
    }

    async fn open_gripper(&self) -> MoveResult {
        self.actuate(GripperState::Open).await
    }

    async fn modify_ptp_trajectory(&self, trajectory: &mut Trajectory) -> bool {
        self.retime(trajectory).await
    }

    async fn modify_lin_trajectory(&self, trajectory: &mut Trajectory) -> bool {
        self.retime(trajectory).await
    }
}
