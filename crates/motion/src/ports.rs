//! Port traits for the collaborators of the motion pipeline.
//!
//! The pipeline defines *what* it needs; infrastructure crates (the `sim`
//! crate, a hardware driver) define *how* to supply it. Every port is
//! `Send + Sync` so it can be injected as an `Arc<dyn …>` and shared between
//! the execution template and long-running jobs.
//!
//! | Port | Role |
//! |------|------|
//! | [`Kinematics`] | Robot model: joint limits, forward/inverse kinematics, random samples |
//! | [`CollisionChecker`] | Raw contacts of a configuration against a scene |
//! | [`Planner`] | Joint-space and Cartesian trajectory planning |
//! | [`Controller`] | Live robot state and trajectory execution |
//! | [`Backend`] | Deployment-specific hooks: gripper, trajectory post-processing |

use async_trait::async_trait;

use crate::{
    CartesianPath, Contact, JointLimit, JointName, JointValues, LinkName, MoveResult,
    PlanningScene, Pose, RobotState, Trajectory,
};

/// Robot model queries.
///
/// Implementations are expected to be cheap and synchronous.
pub trait Kinematics: Send + Sync {
    /// Names of the actuated joints, in joint-vector order.
    fn joint_names(&self) -> &[JointName];

    /// Position limits of the actuated joints, in joint-vector order.
    fn joint_limits(&self) -> &[JointLimit];

    /// Names of the robot links, as used by the collision matrix.
    fn link_names(&self) -> &[LinkName];

    /// World pose of `link` at configuration `joints`.
    fn link_pose(&self, joints: &JointValues, link: &LinkName) -> MoveResult<Pose>;

    /// End-effector pose at configuration `joints`.
    fn forward(&self, joints: &JointValues) -> MoveResult<Pose>;

    /// A configuration reaching `pose`, searched from `seed`.
    ///
    /// Returns `None` when no solution within the joint limits exists.
    fn inverse(&self, pose: &Pose, seed: &JointValues) -> Option<JointValues>;

    /// A uniformly random configuration within the joint limits.
    fn random_joint_values(&self) -> JointValues;
}

/// Geometric collision queries.
pub trait CollisionChecker: Send + Sync {
    /// All contacts of the robot at `joints` with itself, world objects, and
    /// attached objects in `scene`, *before* the allowed-collision matrix is
    /// applied.
    fn contacts(&self, scene: &PlanningScene, joints: &JointValues) -> Vec<Contact>;
}

/// Options for a linear (Cartesian) planning request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPlanOptions {
    /// Maximum end-effector travel between interpolated path points (metres).
    pub eef_step: f64,
    /// Whether the returned trajectory must be time-parametrised.
    pub time_parametrization: bool,
}

/// The path-planning engine.
///
/// Failures are reported as [`crate::ErrorKind::PlanningFailed`].
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plans a joint-space trajectory from `start` to `goal`.
    async fn plan_joints(
        &self,
        scene: &PlanningScene,
        start: &RobotState,
        goal: &JointValues,
    ) -> MoveResult<Trajectory>;

    /// Plans a straight-line Cartesian path from `start` to `goal`.
    ///
    /// The returned [`CartesianPath::fraction`] reports how much of the path
    /// could be followed; the caller decides whether a partial path is acceptable.
    async fn plan_linear(
        &self,
        scene: &PlanningScene,
        start: &RobotState,
        goal: &Pose,
        options: LinearPlanOptions,
    ) -> MoveResult<CartesianPath>;
}

/// The manipulator controller.
#[async_trait]
pub trait Controller: Send + Sync {
    /// The most recent robot state, or `None` if none was ever received.
    fn current_state(&self) -> Option<RobotState>;

    /// Executes `trajectory` to completion. The trajectory is consumed.
    ///
    /// Failures are reported as [`crate::ErrorKind::ExecutionFailed`].
    async fn execute(&self, trajectory: Trajectory) -> MoveResult;
}

/// Deployment-specific capabilities (simulation or real hardware).
///
/// Every method must be total and must not block indefinitely; the execution
/// template bounds each call by the configured hook timeout and treats a
/// timeout as failure.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Closes the gripper.
    async fn close_gripper(&self) -> MoveResult;

    /// Opens the gripper.
    async fn open_gripper(&self) -> MoveResult;

    /// Rewrites a PTP trajectory for the deployment. `false` rejects it.
    async fn modify_ptp_trajectory(&self, trajectory: &mut Trajectory) -> bool;

    /// Rewrites a linear trajectory for the deployment. `false` rejects it.
    async fn modify_lin_trajectory(&self, trajectory: &mut Trajectory) -> bool;
}
