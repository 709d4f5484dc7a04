//! The controlled movement execution template.
//!
//! [`MoveIface`] is the single entry point for motion. Every move request,
//! whatever its kind, runs through [`MoveIface::controlled_movement_execution`]:
//!
//! 1. **Pre-checks** (`before_movement_checks`): the process must be allowed
//!    to move, no other controlled execution may be in flight, a fresh live
//!    robot state must be available, and the planning scene must be ready.
//! 2. **Dispatch** to the concrete operation (see `operations.rs`), which runs
//!    the guards, plans, validates, and executes.
//! 3. **Severity handling** (`handle_failure_severity`): recoverable failures
//!    are reported to the caller; critical failures trigger
//!    [`MoveIface::abort_due_to_critical_failure`], after which every further
//!    motion request fails with `not_allowed_to_move` until [`MoveIface::reset`].
//! 4. **Response**: the payload is populated only on success.
//!
//! ## Single flight
//!
//! The planning scene lives inside an async mutex. Pre-checks acquire it with
//! `try_lock`, so a second request arriving while one is in flight is
//! rejected with a recoverable `busy` instead of waiting or interleaving.
//! Holding the guard is also the only way to mutate the scene, which keeps
//! scene mutation and motion mutually exclusive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, instrument, warn};

use crate::operations::Motion;
use crate::service::{
    GetJointValuesResponse, GetPoseResponse, MoveJointsRequest, MoveLinRequest, MoveOutcome,
    MovePtpRequest, MoveRandomRequest, MoveRequest, MoveResponse, PickPlaceRequest,
    RandomMoveOutcome, TriggerResponse,
};
use crate::{
    Backend, Body, CollisionChecker, CollisionObject, ConfigError, Controller, ErrorKind,
    Kinematics, MotionConfig, MoveError, MoveResult, ObjectId, Planner, PlanningScene,
    RequestId, RobotState, Timestamp,
};

/// The collaborator ports a [`MoveIface`] is built from.
#[derive(Clone)]
pub struct Collaborators {
    /// Robot model.
    pub kinematics: Arc<dyn Kinematics>,
    /// Geometric collision queries.
    pub checker: Arc<dyn CollisionChecker>,
    /// Path planning engine.
    pub planner: Arc<dyn Planner>,
    /// Manipulator controller.
    pub controller: Arc<dyn Controller>,
    /// Deployment hooks.
    pub backend: Arc<dyn Backend>,
}

/// Safety-gated motion interface.
pub struct MoveIface {
    config: MotionConfig,
    ports: Collaborators,
    scene: Mutex<PlanningScene>,
    allowed_to_move: AtomicBool,
}

impl std::fmt::Debug for MoveIface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveIface")
            .field("allowed_to_move", &self.is_allowed_to_move())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl MoveIface {
    /// Creates the interface. Fails if `config` does not validate.
    pub fn new(
        config: MotionConfig,
        ports: Collaborators,
        scene: PlanningScene,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ports,
            scene: Mutex::new(scene),
            allowed_to_move: AtomicBool::new(true),
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub(crate) fn ports(&self) -> &Collaborators {
        &self.ports
    }

    /// Returns `false` once a critical failure has aborted the process.
    pub fn is_allowed_to_move(&self) -> bool {
        self.allowed_to_move.load(Ordering::SeqCst)
    }

    /// Returns `true` while a controlled execution or scene mutation holds the lock.
    pub fn is_busy(&self) -> bool {
        self.scene.try_lock().is_err()
    }

    // -----------------------------------------------------------------------
    // Robot state
    // -----------------------------------------------------------------------

    /// Returns the current robot state if it is live and fresh.
    pub fn current_robot_state(&self) -> MoveResult<RobotState> {
        let state = self.ports.controller.current_state().ok_or_else(|| {
            MoveError::new(ErrorKind::StateUnavailable, "no robot state received yet")
        })?;
        if !state.is_fresh(self.config.state.max_age(), Timestamp::now()) {
            return Err(MoveError::new(
                ErrorKind::StateUnavailable,
                format!(
                    "robot state from {} ({:?}) is stale",
                    state.captured_at(),
                    state.source()
                ),
            ));
        }
        Ok(state)
    }

    /// Polls for a fresh robot state for up to the configured wait timeout.
    pub async fn wait_for_current_robot_state(&self) -> MoveResult<RobotState> {
        let deadline = tokio::time::Instant::now() + self.config.state.wait_timeout();
        loop {
            match self.current_robot_state() {
                Ok(state) => return Ok(state),
                Err(e) if tokio::time::Instant::now() >= deadline => return Err(e),
                Err(_) => tokio::time::sleep(self.config.state.poll_interval()).await,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Controlled execution
    // -----------------------------------------------------------------------

    fn before_movement_checks(
        &self,
        service: &str,
    ) -> MoveResult<(MutexGuard<'_, PlanningScene>, RobotState)> {
        self.ensure_allowed_to_move(service)?;
        let scene = self.scene.try_lock().map_err(|_| {
            MoveError::new(
                ErrorKind::Busy,
                format!("'{service}' refused: another motion is in flight"),
            )
        })?;
        // The previous holder may have aborted just before releasing the lock.
        self.ensure_allowed_to_move(service)?;
        let state = self.current_robot_state()?;
        if !scene.is_ready(&self.config.required_collision_links) {
            return Err(MoveError::new(
                ErrorKind::StateUnavailable,
                "planning scene is missing required collision links",
            ));
        }
        Ok((scene, state))
    }

    fn ensure_allowed_to_move(&self, service: &str) -> MoveResult {
        if self.is_allowed_to_move() {
            return Ok(());
        }
        Err(MoveError::critical(
            ErrorKind::NotAllowedToMove,
            format!("'{service}' refused: motion disabled after a critical failure"),
        ))
    }

    fn handle_failure_severity(&self, service: &str, failure: &MoveError) {
        if failure.is_critical() {
            self.abort_due_to_critical_failure(failure);
        } else {
            warn!(
                service,
                kind = %failure.kind(),
                message = failure.message(),
                "Motion request failed"
            );
        }
    }

    /// Disables all further motion until [`MoveIface::reset`].
    pub fn abort_due_to_critical_failure(&self, failure: &MoveError) {
        if self.allowed_to_move.swap(false, Ordering::SeqCst) {
            error!(
                kind = %failure.kind(),
                message = failure.message(),
                "Critical failure, refusing all further motion until reset"
            );
        }
    }

    /// Re-enables motion after an abort. This is the external operator reset.
    pub fn reset(&self) {
        if !self.allowed_to_move.swap(true, Ordering::SeqCst) {
            info!("Motion re-enabled by operator reset");
        }
    }

    /// Runs the controlled execution for `request` and returns the raw result.
    ///
    /// Severity handling has already happened when this returns.
    #[instrument(
        name = "controlled_execution",
        skip_all,
        fields(service = request.service_name(), request_id = %RequestId::new_random())
    )]
    pub async fn execute(&self, request: MoveRequest) -> MoveResult<MoveOutcome> {
        let service = request.service_name();
        let (mut scene, start) = match self.before_movement_checks(service) {
            Ok(checked) => checked,
            Err(failure) => {
                self.handle_failure_severity(service, &failure);
                return Err(failure);
            }
        };
        let result = Motion::new(self, &mut scene, start).dispatch(request).await;

        // Severity is settled while the scene is still locked, so the next
        // request to take the lock already sees an abort.
        match &result {
            Ok(_) => info!(service, "Motion request succeeded"),
            Err(failure) => self.handle_failure_severity(service, failure),
        }
        drop(scene);
        result
    }

    /// Runs the controlled execution for `request` and builds the response.
    pub async fn controlled_movement_execution(
        &self,
        request: MoveRequest,
    ) -> MoveResponse<MoveOutcome> {
        MoveResponse::from_result(self.execute(request).await)
    }

    // -----------------------------------------------------------------------
    // Service entry points
    // -----------------------------------------------------------------------

    /// `move_ptp` service.
    pub async fn move_ptp_srv(&self, request: MovePtpRequest) -> MoveResponse {
        done(self.controlled_movement_execution(MoveRequest::Ptp(request)).await)
    }

    /// `move_lin` service.
    pub async fn move_lin_srv(&self, request: MoveLinRequest) -> MoveResponse {
        done(self.controlled_movement_execution(MoveRequest::Lin(request)).await)
    }

    /// `move_joints` service.
    pub async fn move_joints_srv(&self, request: MoveJointsRequest) -> MoveResponse {
        done(self.controlled_movement_execution(MoveRequest::Joints(request)).await)
    }

    /// `move_random` service.
    pub async fn move_random_srv(
        &self,
        request: MoveRandomRequest,
    ) -> MoveResponse<RandomMoveOutcome> {
        self.controlled_movement_execution(MoveRequest::Random(request))
            .await
            .and_then_payload(|outcome| match outcome {
                MoveOutcome::Random(random) => Some(random),
                MoveOutcome::Done => None,
            })
    }

    /// `pick_place` service.
    pub async fn pick_place_srv(&self, request: PickPlaceRequest) -> MoveResponse {
        done(self.controlled_movement_execution(MoveRequest::PickPlace(request)).await)
    }

    /// Opens the gripper and moves to the configured home configuration.
    pub async fn reset_to_home(&self) -> MoveResult {
        self.execute(MoveRequest::Home).await.map(|_| ())
    }

    /// The idle behaviour run by the job state machine's idle action.
    pub async fn idle(&self) -> MoveResult {
        self.reset_to_home().await
    }

    /// `robot_ready` probe: ready iff not aborted and a fresh state is available.
    pub fn robot_ready_srv(&self) -> TriggerResponse {
        if !self.is_allowed_to_move() {
            return TriggerResponse {
                success: false,
                message: "motion disabled after a critical failure".to_string(),
            };
        }
        match self.current_robot_state() {
            Ok(_) => TriggerResponse {
                success: true,
                message: String::new(),
            },
            Err(e) => TriggerResponse {
                success: false,
                message: e.message().to_string(),
            },
        }
    }

    /// `get_current_pose` query. Never takes the motion lock.
    pub async fn get_current_pose_srv(&self) -> GetPoseResponse {
        let pose = match self.wait_for_current_robot_state().await {
            Ok(state) => self.ports.kinematics.forward(state.joints()).ok(),
            Err(_) => None,
        };
        GetPoseResponse {
            success: pose.is_some(),
            pose,
        }
    }

    /// `get_current_joint_values` query. Never takes the motion lock.
    pub async fn get_current_joint_values_srv(&self) -> GetJointValuesResponse {
        let joints = self
            .wait_for_current_robot_state()
            .await
            .ok()
            .map(|state| state.joints().clone());
        GetJointValuesResponse {
            success: joints.is_some(),
            joints,
        }
    }

    // -----------------------------------------------------------------------
    // Scene management
    // -----------------------------------------------------------------------

    fn lock_scene(&self, what: &str) -> MoveResult<MutexGuard<'_, PlanningScene>> {
        self.scene.try_lock().map_err(|_| {
            MoveError::new(
                ErrorKind::Busy,
                format!("cannot {what} while a motion is in flight"),
            )
        })
    }

    /// Returns a copy of the planning scene.
    pub fn scene_snapshot(&self) -> MoveResult<PlanningScene> {
        Ok(self.lock_scene("read the planning scene")?.clone())
    }

    /// Exempts a body pair from collision checking.
    pub fn disable_collision(&self, a: impl Into<Body>, b: impl Into<Body>) -> MoveResult {
        let (a, b) = (a.into(), b.into());
        info!(%a, %b, "Disabling collision check");
        self.lock_scene("disable a collision pair")?
            .allow_collision(a, b);
        Ok(())
    }

    /// Removes a collision exemption.
    pub fn enable_collision(&self, a: impl Into<Body>, b: impl Into<Body>) -> MoveResult {
        let (a, b) = (a.into(), b.into());
        info!(%a, %b, "Enabling collision check");
        self.lock_scene("enable a collision pair")?
            .disallow_collision(a, b);
        Ok(())
    }

    /// Adds or replaces a world collision object.
    pub fn add_collision_object(&self, object: CollisionObject) -> MoveResult {
        info!(object = %object.id, "Adding collision object");
        self.lock_scene("add a collision object")?
            .add_object(object)
            .map(|_| ())
    }

    /// Removes a world collision object.
    pub fn remove_collision_object(&self, id: &ObjectId) -> MoveResult {
        info!(object = %id, "Removing collision object");
        self.lock_scene("remove a collision object")?
            .remove_object(id)
            .map(|_| ())
    }

    /// Attaches a world object to the end-effector link at its current pose.
    pub fn attach_grasp_object(&self, id: &ObjectId) -> MoveResult {
        let state = self.current_robot_state()?;
        let mut scene = self.lock_scene("attach an object")?;
        Motion::new(self, &mut scene, state).attach_grasp_object(id)
    }

    /// Detaches an attached object, leaving it where the end effector holds it.
    pub fn detach_grasp_object(&self, id: &ObjectId) -> MoveResult {
        let state = self.current_robot_state()?;
        let mut scene = self.lock_scene("detach an object")?;
        Motion::new(self, &mut scene, state).detach_grasp_object(id)
    }
}

fn done(response: MoveResponse<MoveOutcome>) -> MoveResponse {
    response.and_then_payload(|outcome| match outcome {
        MoveOutcome::Done => Some(()),
        MoveOutcome::Random(_) => None,
    })
}
