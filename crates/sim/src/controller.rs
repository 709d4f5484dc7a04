//! Simulated trajectory controller.
//!
//! Plays trajectories back against a wall clock (scaled by
//! [`SimConfig::time_scale`](crate::SimConfig)) and publishes the joint state
//! after every waypoint. Fault injection switches let tests exercise the
//! failure paths of the execution template.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use motion::{
    Controller, ErrorKind, JointValues, MoveError, MoveResult, RobotState, StateSource, Timestamp,
    Trajectory,
};

use crate::arm::JOINTS;
use crate::SimConfig;

#[derive(Debug, Clone)]
struct Published {
    joints: JointValues,
    velocities: Vec<f64>,
    at: Timestamp,
}

impl Published {
    fn now(joints: JointValues, velocities: Vec<f64>) -> Self {
        Self {
            joints,
            velocities,
            at: Timestamp::now(),
        }
    }
}

/// Controller for the simulated arm.
pub struct SimController {
    state: Mutex<Published>,
    time_scale: f64,
    executions: AtomicUsize,
    fail_next: AtomicBool,
    frozen: Mutex<Option<Published>>,
    dropped: AtomicBool,
}

impl SimController {
    /// Creates a controller resting at the zero configuration.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            state: Mutex::new(Published::now(JointValues::zeros(JOINTS), vec![0.0; JOINTS])),
            time_scale: config.time_scale,
            executions: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            frozen: Mutex::new(None),
            dropped: AtomicBool::new(false),
        }
    }

    /// Teleports the arm to `joints` at rest.
    pub fn set_joints(&self, joints: JointValues) {
        let velocities = vec![0.0; joints.len()];
        self.publish(Published::now(joints, velocities));
    }

    /// Makes the next execution fail with a controller fault.
    pub fn inject_fault(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Freezes the published state: it stops updating and is reported as
    /// cached, so it goes stale.
    pub fn set_stale(&self, stale: bool) {
        let mut frozen = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
        *frozen = stale.then(|| self.published());
    }

    /// Stops publishing any state at all.
    pub fn set_dropped(&self, dropped: bool) {
        self.dropped.store(dropped, Ordering::SeqCst);
    }

    /// Number of trajectories accepted for execution.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// The joint positions the arm is actually at, regardless of what is
    /// being published.
    pub fn joints(&self) -> JointValues {
        self.published().joints
    }

    fn published(&self) -> Published {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, state: Published) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[async_trait]
impl Controller for SimController {
    fn current_state(&self) -> Option<RobotState> {
        if self.dropped.load(Ordering::SeqCst) {
            return None;
        }
        let frozen = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = frozen.as_ref() {
            return Some(RobotState::captured(
                state.joints.clone(),
                state.velocities.clone(),
                state.at,
                StateSource::Cached,
            ));
        }
        drop(frozen);
        // The live stream keeps publishing while the arm rests.
        let state = self.published();
        Some(RobotState::live(state.joints, state.velocities))
    }

    async fn execute(&self, trajectory: Trajectory) -> MoveResult {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            warn!("Injected controller fault");
            return Err(MoveError::new(
                ErrorKind::ExecutionFailed,
                "controller fault: drives disabled",
            ));
        }
        if let Some(bad) = trajectory.waypoints().iter().find(|w| w.positions.len() != JOINTS) {
            return Err(MoveError::new(
                ErrorKind::ExecutionFailed,
                format!("waypoint has {} joints, arm has {JOINTS}", bad.positions.len()),
            ));
        }

        let waypoints = trajectory.into_waypoints();
        let count = waypoints.len();
        let mut elapsed = std::time::Duration::ZERO;
        for waypoint in waypoints {
            let wait = waypoint.time_from_start.saturating_sub(elapsed);
            elapsed = waypoint.time_from_start;
            if self.time_scale > 0.0 && !wait.is_zero() {
                tokio::time::sleep(wait.mul_f64(self.time_scale)).await;
            }
            let velocities = if waypoint.velocities.len() == JOINTS {
                waypoint.velocities
            } else {
                vec![0.0; JOINTS]
            };
            self.publish(Published::now(waypoint.positions, velocities));
        }

        let at_rest = self.published().joints;
        self.set_joints(at_rest);
        debug!(waypoints = count, "Trajectory executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use motion::Waypoint;

    use super::*;

    fn controller() -> SimController {
        SimController::new(&SimConfig::deterministic(1))
    }

    fn trajectory(to: f64) -> Trajectory {
        Trajectory::new(vec![
            Waypoint::new(JointValues::zeros(JOINTS), Duration::ZERO),
            Waypoint::new(
                JointValues::new(vec![to, 0.0, 0.0, 0.0, 0.0, 0.0]),
                Duration::from_millis(100),
            ),
        ])
    }

    #[tokio::test]
    async fn execution_ends_at_the_last_waypoint_at_rest() {
        let controller = controller();
        controller.execute(trajectory(0.2)).await.unwrap();

        let state = controller.current_state().unwrap();
        assert_eq!(state.joints()[0], 0.2);
        assert!(state.velocities().iter().all(|v| *v == 0.0));
        assert_eq!(state.source(), StateSource::Live);
        assert_eq!(controller.executions(), 1);
    }

    #[tokio::test]
    async fn injected_fault_fails_once() {
        let controller = controller();
        controller.inject_fault();

        let err = controller.execute(trajectory(0.2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert_eq!(controller.joints()[0], 0.0);
        controller.execute(trajectory(0.2)).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_joint_count_is_rejected() {
        let controller = controller();
        let bad = Trajectory::new(vec![Waypoint::new(
            JointValues::zeros(3),
            Duration::ZERO,
        )]);
        let err = controller.execute(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    }

    #[tokio::test]
    async fn stale_state_is_cached_and_stops_updating() {
        let controller = controller();
        controller.set_stale(true);
        controller.execute(trajectory(0.3)).await.unwrap();

        let state = controller.current_state().unwrap();
        assert_eq!(state.source(), StateSource::Cached);
        assert_eq!(state.joints()[0], 0.0);
        assert_eq!(controller.joints()[0], 0.3);

        controller.set_stale(false);
        assert_eq!(controller.current_state().unwrap().joints()[0], 0.3);
    }

    #[test]
    fn dropped_state_is_absent() {
        let controller = controller();
        controller.set_dropped(true);
        assert!(controller.current_state().is_none());
    }
}
