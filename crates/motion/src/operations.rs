//! The concrete move operations run inside a controlled execution.
//!
//! A [`Motion`] exists only while the single-flight lock is held: it borrows
//! the planning scene mutably from the lock guard and carries the robot state
//! the pre-checks captured. After every executed trajectory the state is
//! refreshed, so compound operations (pick-and-place) always plan from where
//! the robot actually is.

use tracing::{debug, info, instrument};

use crate::guards::{
    joints_goal_in_collision, joints_goal_too_close, pose_goal_in_collision, pose_goal_too_close,
};
use crate::iface::{Collaborators, MoveIface};
use crate::service::{MoveOutcome, MoveRequest, PickPlaceRequest, RandomMoveOutcome};
use crate::validator::TrajectoryValidator;
use crate::{
    ErrorKind, JointValues, LinearPlanOptions, MotionConfig, MoveError, MoveResult, ObjectId,
    PlanningScene, Pose, RobotState, TooClosePolicy, Trajectory, TrajectoryKind,
};

pub(crate) struct Motion<'a> {
    iface: &'a MoveIface,
    scene: &'a mut PlanningScene,
    start: RobotState,
}

impl<'a> Motion<'a> {
    pub(crate) fn new(iface: &'a MoveIface, scene: &'a mut PlanningScene, start: RobotState) -> Self {
        Self { iface, scene, start }
    }

    fn config(&self) -> &'a MotionConfig {
        self.iface.config()
    }

    fn ports(&self) -> &'a Collaborators {
        self.iface.ports()
    }

    pub(crate) async fn dispatch(&mut self, request: MoveRequest) -> MoveResult<MoveOutcome> {
        let policy = self.config().guards.too_close_policy;
        match request {
            MoveRequest::Ptp(r) => self.move_ptp(&r.pose, policy).await?,
            MoveRequest::Lin(r) => self.move_lin(&r.pose, policy).await?,
            MoveRequest::Joints(r) => self.move_joints(&r.joints, policy).await?,
            MoveRequest::Random(_) => return self.move_random().await.map(MoveOutcome::Random),
            MoveRequest::PickPlace(r) => self.pick_place(&r).await?,
            MoveRequest::Home => self.reset_to_home().await?,
        }
        Ok(MoveOutcome::Done)
    }

    // -----------------------------------------------------------------------
    // Move operations
    // -----------------------------------------------------------------------

    #[instrument(skip_all)]
    async fn move_ptp(&mut self, pose: &Pose, policy: TooClosePolicy) -> MoveResult {
        require_finite_pose(pose)?;
        let kinematics = &self.ports().kinematics;
        let current = kinematics.forward(self.start.joints())?;
        let guards = &self.config().guards;
        if pose_goal_too_close(&current, pose, guards.linear_epsilon, guards.angular_epsilon) {
            return too_close(policy, "pose");
        }

        let (in_collision, solution) = pose_goal_in_collision(
            kinematics.as_ref(),
            self.ports().checker.as_ref(),
            self.scene,
            pose,
            self.start.joints(),
        )?;
        if in_collision {
            return Err(MoveError::new(
                ErrorKind::GoalInCollision,
                "goal pose is in collision",
            ));
        }
        self.run_ptp_trajectory(&solution).await
    }

    #[instrument(skip_all)]
    async fn move_lin(&mut self, pose: &Pose, policy: TooClosePolicy) -> MoveResult {
        require_finite_pose(pose)?;
        let ports = self.ports();
        let current = ports.kinematics.forward(self.start.joints())?;
        let guards = &self.config().guards;
        if pose_goal_too_close(&current, pose, guards.linear_epsilon, guards.angular_epsilon) {
            return too_close(policy, "pose");
        }

        let (in_collision, _) = pose_goal_in_collision(
            ports.kinematics.as_ref(),
            ports.checker.as_ref(),
            self.scene,
            pose,
            self.start.joints(),
        )?;
        if in_collision {
            return Err(MoveError::new(
                ErrorKind::GoalInCollision,
                "goal pose is in collision",
            ));
        }
        self.run_linear_trajectory(pose).await
    }

    #[instrument(skip_all)]
    async fn move_joints(&mut self, joints: &JointValues, policy: TooClosePolicy) -> MoveResult {
        self.require_valid_joints(joints)?;
        let epsilon = self.config().guards.joint_epsilon;
        if joints_goal_too_close(self.start.joints(), joints, epsilon) {
            return too_close(policy, "joint");
        }
        if joints_goal_in_collision(self.ports().checker.as_ref(), self.scene, joints) {
            return Err(MoveError::new(
                ErrorKind::GoalInCollision,
                "goal configuration is in collision",
            ));
        }
        self.run_ptp_trajectory(joints).await
    }

    #[instrument(skip_all)]
    async fn move_random(&mut self) -> MoveResult<RandomMoveOutcome> {
        let ports = self.ports();
        let config = self.config();
        let attempts = config.random.attempts;

        let mut chosen = None;
        for attempt in 1..=attempts {
            let candidate = ports.kinematics.random_joint_values();
            if joints_goal_too_close(self.start.joints(), &candidate, config.guards.joint_epsilon) {
                continue;
            }
            if joints_goal_in_collision(ports.checker.as_ref(), self.scene, &candidate) {
                continue;
            }
            debug!(attempt, joints = %candidate, "Random goal found");
            chosen = Some(candidate);
            break;
        }
        let joints = chosen.ok_or_else(|| {
            MoveError::new(
                ErrorKind::NoRandomPosition,
                format!("no collision-free random configuration in {attempts} attempts"),
            )
        })?;

        self.run_ptp_trajectory(&joints).await?;
        let pose = ports.kinematics.forward(&joints)?;
        Ok(RandomMoveOutcome { joints, pose })
    }

    #[instrument(skip_all, fields(gripper_close = request.gripper_close))]
    async fn pick_place(&mut self, request: &PickPlaceRequest) -> MoveResult {
        if !self.config().end_effector.gripper_attached {
            return Err(MoveError::new(
                ErrorKind::InvalidInput,
                "pick and place needs a gripper",
            ));
        }
        require_finite_pose(&request.pose_above)?;
        require_finite_pose(&request.pose_grip)?;

        // Opening while placing would drop the held object above the target.
        if request.gripper_close {
            self.open_gripper().await?;
        }
        self.move_ptp(&request.pose_above, TooClosePolicy::Succeed).await?;
        self.move_lin(&request.pose_grip, TooClosePolicy::Succeed).await?;
        if request.gripper_close {
            self.close_gripper(request.object.as_ref()).await?;
        } else {
            self.open_gripper().await?;
        }
        self.move_lin(&request.pose_above, TooClosePolicy::Succeed).await
    }

    #[instrument(skip_all)]
    async fn reset_to_home(&mut self) -> MoveResult {
        self.open_gripper().await?;
        let home = self.config().home.clone();
        self.move_joints(&home, TooClosePolicy::Succeed).await
    }

    // -----------------------------------------------------------------------
    // Gripper
    // -----------------------------------------------------------------------

    /// Opens the gripper and releases every attached object into the world.
    async fn open_gripper(&mut self) -> MoveResult {
        if !self.config().end_effector.gripper_attached {
            return Ok(());
        }
        let backend = &self.ports().backend;
        self.bounded_gripper_call("open", backend.open_gripper()).await?;

        let attached: Vec<ObjectId> = self
            .scene
            .attached_objects()
            .map(|a| a.object.id.clone())
            .collect();
        for id in &attached {
            self.detach_grasp_object(id)?;
        }
        Ok(())
    }

    /// Closes the gripper and attaches `object`, if named, to the end effector.
    async fn close_gripper(&mut self, object: Option<&ObjectId>) -> MoveResult {
        if !self.config().end_effector.gripper_attached {
            return Ok(());
        }
        let backend = &self.ports().backend;
        self.bounded_gripper_call("close", backend.close_gripper()).await?;
        if let Some(id) = object {
            self.attach_grasp_object(id)?;
        }
        Ok(())
    }

    async fn bounded_gripper_call(
        &self,
        action: &str,
        call: impl std::future::Future<Output = MoveResult>,
    ) -> MoveResult {
        let timeout = self.config().backend.hook_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(())) => {
                info!(action, "Gripper actuated");
                Ok(())
            }
            Ok(Err(e)) => Err(MoveError::critical(
                ErrorKind::GripperFailed,
                format!("gripper {action} failed: {}", e.message()),
            )),
            Err(_) => Err(MoveError::critical(
                ErrorKind::GripperFailed,
                format!("gripper {action} did not complete within {timeout:?}"),
            )),
        }
    }

    pub(crate) fn attach_grasp_object(&mut self, id: &ObjectId) -> MoveResult {
        let end_effector = &self.config().end_effector;
        let link = end_effector.link.as_ref().ok_or_else(|| {
            MoveError::new(ErrorKind::InvalidInput, "no end-effector link configured")
        })?;
        let link_pose = self
            .ports()
            .kinematics
            .link_pose(self.start.joints(), link)?;
        self.scene
            .attach_object(id, link, &end_effector.touch_links, &link_pose)?;
        info!(object = %id, %link, "Object attached");
        Ok(())
    }

    pub(crate) fn detach_grasp_object(&mut self, id: &ObjectId) -> MoveResult {
        let attached = self.scene.attached_object(id).ok_or_else(|| {
            MoveError::new(
                ErrorKind::InvalidInput,
                format!("object '{id}' is not attached"),
            )
        })?;
        let link = attached.link.clone();
        let link_pose = self
            .ports()
            .kinematics
            .link_pose(self.start.joints(), &link)?;
        self.scene.detach_object(id, &link_pose)?;
        info!(object = %id, %link, "Object detached");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plan, validate, execute
    // -----------------------------------------------------------------------

    async fn run_ptp_trajectory(&mut self, goal: &JointValues) -> MoveResult {
        let mut trajectory = self
            .ports()
            .planner
            .plan_joints(self.scene, &self.start, goal)
            .await?;
        self.validate(&mut trajectory, TrajectoryKind::Ptp).await?;
        self.execute(trajectory).await
    }

    async fn run_linear_trajectory(&mut self, goal: &Pose) -> MoveResult {
        let linear = &self.config().linear;
        let options = LinearPlanOptions {
            eef_step: linear.eef_step,
            time_parametrization: linear.time_parametrization,
        };
        let path = self
            .ports()
            .planner
            .plan_linear(self.scene, &self.start, goal, options)
            .await?;
        if path.fraction < 1.0 {
            return Err(MoveError::new(
                ErrorKind::PartialPathPlanned,
                format!(
                    "only {:.1}% of the linear path could be planned",
                    path.fraction * 100.0
                ),
            ));
        }
        let mut trajectory = path.trajectory;
        self.validate(&mut trajectory, TrajectoryKind::Linear).await?;
        self.execute(trajectory).await
    }

    async fn validate(&self, trajectory: &mut Trajectory, kind: TrajectoryKind) -> MoveResult {
        let config = self.config();
        TrajectoryValidator::new(
            &config.validator,
            self.ports().backend.as_ref(),
            config.backend.hook_timeout(),
        )
        .check_trajectory(trajectory, kind, self.start.joints())
        .await
    }

    /// Executes `trajectory` and refreshes the start state from the controller.
    async fn execute(&mut self, trajectory: Trajectory) -> MoveResult {
        let waypoints = trajectory.len();
        let duration = trajectory.duration();
        self.iface
            .ports()
            .controller
            .execute(trajectory)
            .await
            .map_err(MoveError::escalate)?;
        info!(waypoints, duration_ms = duration.as_millis() as u64, "Trajectory executed");

        self.start = self
            .iface
            .wait_for_current_robot_state()
            .await
            .map_err(|e| {
                MoveError::critical(
                    ErrorKind::ExecutionFailed,
                    format!("no robot state after execution: {}", e.message()),
                )
            })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Input checks
    // -----------------------------------------------------------------------

    fn require_valid_joints(&self, joints: &JointValues) -> MoveResult {
        let limits = self.ports().kinematics.joint_limits();
        if joints.len() != limits.len() {
            return Err(MoveError::new(
                ErrorKind::InvalidInput,
                format!("expected {} joint values, got {}", limits.len(), joints.len()),
            ));
        }
        if !joints.is_finite() {
            return Err(MoveError::new(
                ErrorKind::InvalidInput,
                "joint values must be finite",
            ));
        }
        for (index, (value, limit)) in joints.as_slice().iter().zip(limits).enumerate() {
            if !limit.contains(*value) {
                return Err(MoveError::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "joint {index} value {value:.4} outside [{:.4}, {:.4}]",
                        limit.min, limit.max
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn require_finite_pose(pose: &Pose) -> MoveResult {
    if pose.is_finite() {
        Ok(())
    } else {
        Err(MoveError::new(
            ErrorKind::InvalidInput,
            "goal pose must be finite",
        ))
    }
}

fn too_close(policy: TooClosePolicy, what: &str) -> MoveResult {
    match policy {
        TooClosePolicy::Succeed => {
            info!("{what} goal already reached, skipping motion");
            Ok(())
        }
        TooClosePolicy::Reject => Err(MoveError::new(
            ErrorKind::GoalTooClose,
            format!("{what} goal is too close to the current state"),
        )),
    }
}
