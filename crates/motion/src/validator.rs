//! Trajectory validation.
//!
//! Every planned trajectory passes two stages before it may be executed:
//!
//! 1. **Structural checks** ([`check_structure`]): enough waypoints, one
//!    finite position per joint at every waypoint, no joint jump between
//!    consecutive waypoints (or from the current state to the first waypoint)
//!    larger than the configured threshold, and strictly increasing time.
//!    A jump larger than the threshold is a planning artefact (for example an
//!    IK branch flip), not a motion the hardware should attempt.
//! 2. **Backend hook** (`modify_ptp_trajectory` / `modify_lin_trajectory`):
//!    the deployment may rewrite timing or reject the trajectory.
//!
//! A trajectory that fails stage 1 never reaches the hook. Whatever the hook
//! approves is passed on unchanged; the validator does not second-guess it.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    Backend, ErrorKind, JointValues, MoveError, MoveResult, Trajectory, TrajectoryKind,
    ValidatorConfig,
};

/// Runs the structural checks on `trajectory`.
///
/// `start` is the configuration the robot is in when execution begins; the
/// first waypoint must not jump away from it either.
pub fn check_structure(
    config: &ValidatorConfig,
    trajectory: &Trajectory,
    start: &JointValues,
) -> MoveResult {
    if trajectory.len() < config.min_waypoints {
        return Err(invalid(format!(
            "trajectory has {} waypoints, at least {} required",
            trajectory.len(),
            config.min_waypoints
        )));
    }

    let mut previous_positions = start;
    let mut previous_time: Option<Duration> = None;
    for (index, waypoint) in trajectory.waypoints().iter().enumerate() {
        if waypoint.positions.len() != start.len() {
            return Err(invalid(format!(
                "waypoint {index} has {} joints, expected {}",
                waypoint.positions.len(),
                start.len()
            )));
        }
        if !waypoint.positions.is_finite() || waypoint.velocities.iter().any(|v| !v.is_finite()) {
            return Err(invalid(format!("waypoint {index} has non-finite values")));
        }

        let jump = previous_positions
            .max_abs_delta(&waypoint.positions)
            .unwrap_or(f64::INFINITY);
        if jump > config.max_joint_jump {
            return Err(invalid(format!(
                "joint jump of {jump:.4} rad before waypoint {index} exceeds {:.4} rad",
                config.max_joint_jump
            )));
        }

        if let Some(previous) = previous_time {
            if waypoint.time_from_start <= previous {
                return Err(invalid(format!(
                    "time_from_start of waypoint {index} ({:?}) does not increase",
                    waypoint.time_from_start
                )));
            }
        }

        previous_positions = &waypoint.positions;
        previous_time = Some(waypoint.time_from_start);
    }
    Ok(())
}

/// Validates planned trajectories and hands them to the backend hooks.
pub struct TrajectoryValidator<'a> {
    config: &'a ValidatorConfig,
    backend: &'a dyn Backend,
    hook_timeout: Duration,
}

impl<'a> TrajectoryValidator<'a> {
    /// Creates a validator bound to a backend.
    pub fn new(config: &'a ValidatorConfig, backend: &'a dyn Backend, hook_timeout: Duration) -> Self {
        Self {
            config,
            backend,
            hook_timeout,
        }
    }

    /// Runs the structural checks, then the backend hook for `kind`.
    ///
    /// On success `trajectory` holds whatever the hook rewrote it to.
    pub async fn check_trajectory(
        &self,
        trajectory: &mut Trajectory,
        kind: TrajectoryKind,
        start: &JointValues,
    ) -> MoveResult {
        check_structure(self.config, trajectory, start)?;
        debug!(
            waypoints = trajectory.len(),
            duration_ms = trajectory.duration().as_millis() as u64,
            ?kind,
            "Trajectory passed structural checks"
        );

        let hook = async {
            match kind {
                TrajectoryKind::Ptp => self.backend.modify_ptp_trajectory(trajectory).await,
                TrajectoryKind::Linear => self.backend.modify_lin_trajectory(trajectory).await,
            }
        };
        match tokio::time::timeout(self.hook_timeout, hook).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(invalid(format!(
                "backend rejected the {kind:?} trajectory"
            ))),
            Err(_) => {
                warn!(?kind, timeout_ms = self.hook_timeout.as_millis() as u64, "Trajectory hook timed out");
                Err(invalid(format!(
                    "backend {kind:?} trajectory hook did not answer within {:?}",
                    self.hook_timeout
                )))
            }
        }
    }
}

fn invalid(message: String) -> MoveError {
    MoveError::new(ErrorKind::TrajectoryInvalid, message)
}
