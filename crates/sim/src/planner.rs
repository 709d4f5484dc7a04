//! Straight-line planning for the simulated arm.
//!
//! Joint goals are reached by interpolating in joint space; linear goals by
//! interpolating the end-effector pose (lerp + slerp) and solving IK at every
//! step, seeded from the previous step. Every planned waypoint after the start
//! is collision-checked against the scene. Timing is derived from the joint
//! velocity limit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use motion::{
    CartesianPath, CollisionChecker, ErrorKind, JointValues, Kinematics, LinearPlanOptions,
    MoveError, MoveResult, Planner, PlanningScene, Pose, RobotState, Trajectory, Waypoint,
};

use crate::{SimArm, SimCollisionChecker, SimConfig};

/// Orientation change (radians) between linear path points.
const ANGULAR_STEP: f64 = 0.02;

/// Spacing of waypoints when time parametrisation is not requested.
const UNTIMED_SPACING: Duration = Duration::from_millis(10);

/// Shortest interval between consecutive waypoints.
const MIN_SPACING: Duration = Duration::from_millis(1);

/// Planner for [`SimArm`].
pub struct SimPlanner {
    arm: Arc<SimArm>,
    checker: Arc<SimCollisionChecker>,
    step: f64,
    max_velocity: f64,
}

impl SimPlanner {
    /// Creates a planner using `arm` and `checker`.
    pub fn new(arm: Arc<SimArm>, checker: Arc<SimCollisionChecker>, config: &SimConfig) -> Self {
        Self {
            arm,
            checker,
            step: config.planner_step,
            max_velocity: config.max_joint_velocity,
        }
    }

    /// Largest joint change allowed between two Cartesian path points before
    /// the path is considered to flip IK branches.
    fn cartesian_jump_limit(&self) -> f64 {
        self.step * 4.0
    }

    fn first_collision(&self, scene: &PlanningScene, joints: &JointValues) -> Option<String> {
        let contacts = self.checker.contacts(scene, joints);
        scene
            .disallowed(&contacts)
            .first()
            .map(|c| format!("{} / {}", c.a, c.b))
    }

    fn timed(&self, path: Vec<JointValues>) -> Trajectory {
        let mut waypoints: Vec<Waypoint> = Vec::with_capacity(path.len());
        let mut elapsed = Duration::ZERO;
        for positions in path {
            let Some(previous) = waypoints.last() else {
                waypoints.push(Waypoint {
                    velocities: vec![0.0; positions.len()],
                    positions,
                    time_from_start: Duration::ZERO,
                });
                continue;
            };
            let delta = previous.positions.max_abs_delta(&positions).unwrap_or(0.0);
            let dt = Duration::from_secs_f64(delta / self.max_velocity).max(MIN_SPACING);
            elapsed += dt;
            let velocities = positions
                .as_slice()
                .iter()
                .zip(previous.positions.as_slice())
                .map(|(q, p)| (q - p) / dt.as_secs_f64())
                .collect();
            waypoints.push(Waypoint {
                positions,
                velocities,
                time_from_start: elapsed,
            });
        }
        if let Some(last) = waypoints.last_mut() {
            last.velocities.iter_mut().for_each(|v| *v = 0.0);
        }
        Trajectory::new(waypoints)
    }

    fn untimed(path: Vec<JointValues>) -> Trajectory {
        Trajectory::new(
            path.into_iter()
                .enumerate()
                .map(|(i, positions)| Waypoint::new(positions, UNTIMED_SPACING * i as u32))
                .collect(),
        )
    }
}

#[async_trait]
impl Planner for SimPlanner {
    async fn plan_joints(
        &self,
        scene: &PlanningScene,
        start: &RobotState,
        goal: &JointValues,
    ) -> MoveResult<Trajectory> {
        let from = start.joints();
        let delta = from.max_abs_delta(goal).ok_or_else(|| {
            MoveError::new(
                ErrorKind::PlanningFailed,
                format!("goal has {} joints, start has {}", goal.len(), from.len()),
            )
        })?;
        let steps = ((delta / self.step).ceil() as usize).max(1);

        let mut path = Vec::with_capacity(steps + 1);
        path.push(from.clone());
        for k in 1..=steps {
            let t = k as f64 / steps as f64;
            let joints = JointValues::new(
                from.as_slice()
                    .iter()
                    .zip(goal.as_slice())
                    .map(|(a, b)| a + (b - a) * t)
                    .collect(),
            );
            if let Some(pair) = self.first_collision(scene, &joints) {
                return Err(MoveError::new(
                    ErrorKind::PlanningFailed,
                    format!("path collides at step {k} of {steps}: {pair}"),
                ));
            }
            path.push(joints);
        }
        debug!(waypoints = path.len(), "Joint path planned");
        Ok(self.timed(path))
    }

    async fn plan_linear(
        &self,
        scene: &PlanningScene,
        start: &RobotState,
        goal: &Pose,
        options: LinearPlanOptions,
    ) -> MoveResult<CartesianPath> {
        let from = self.arm.forward(start.joints())?;
        let segments = (from.distance_to(goal) / options.eef_step)
            .ceil()
            .max((from.angle_to(goal) / ANGULAR_STEP).ceil())
            .max(1.0) as usize;

        let mut path = vec![start.joints().clone()];
        for k in 1..=segments {
            let pose = from.interpolate(goal, k as f64 / segments as f64);
            let Some(previous) = path.last() else { break };
            let Some(joints) = self.arm.inverse_near(&pose, previous) else {
                debug!(step = k, "Linear path stopped: no IK solution");
                break;
            };
            let jump = previous.max_abs_delta(&joints).unwrap_or(f64::INFINITY);
            if jump > self.cartesian_jump_limit() {
                debug!(step = k, jump, "Linear path stopped: IK branch flip");
                break;
            }
            if let Some(pair) = self.first_collision(scene, &joints) {
                debug!(step = k, %pair, "Linear path stopped: collision");
                break;
            }
            path.push(joints);
        }

        let fraction = (path.len() - 1) as f64 / segments as f64;
        debug!(segments, fraction, "Linear path planned");
        let trajectory = if options.time_parametrization {
            self.timed(path)
        } else {
            Self::untimed(path)
        };
        Ok(CartesianPath {
            trajectory,
            fraction,
        })
    }
}
