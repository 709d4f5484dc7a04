//! Transport-agnostic service surface.
//!
//! Requests and responses exchanged with the (external) transport layer. A
//! transport maps each service name to the matching [`crate::MoveIface`]
//! method; this module only fixes the names and the shapes.
//!
//! Every move response carries `success`, the [`ErrorCode`], and a message.
//! The payload is populated only on success.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, ErrorKind, JointValues, MoveError, MoveResult, ObjectId, Pose};

/// Fixed service and action names.
pub mod names {
    /// Action switching the robot to idle (cancels a running job, resets to home).
    pub const IDLE_JOB: &str = "job_idle";
    /// Action running the externally supplied job.
    pub const RUN_JOB: &str = "job_env";
    /// Readiness probe.
    pub const ROBOT_READY: &str = "robot_ready";
    /// Point-to-point move to a pose.
    pub const MOVE_PTP: &str = "move_ptp";
    /// Linear move to a pose.
    pub const MOVE_LIN: &str = "move_lin";
    /// Joint-space move.
    pub const MOVE_JOINTS: &str = "move_joints";
    /// Move to a random collision-free configuration.
    pub const MOVE_RANDOM: &str = "move_random";
    /// Pick or place sequence.
    pub const PICK_PLACE: &str = "pick_place";
    /// Current end-effector pose query.
    pub const GET_POSE: &str = "get_current_pose";
    /// Current joint values query.
    pub const GET_JOINT_VALUES: &str = "get_current_joint_values";
    /// Internal reset-to-home motion.
    pub const RESET_TO_HOME: &str = "reset_to_home";
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Point-to-point move to an end-effector pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePtpRequest {
    /// Target pose.
    pub pose: Pose,
}

/// Straight-line move to an end-effector pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveLinRequest {
    /// Target pose.
    pub pose: Pose,
}

/// Joint-space move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveJointsRequest {
    /// Target configuration; one value per joint.
    pub joints: JointValues,
}

/// Move to a random collision-free configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveRandomRequest {}

/// Pick (close the gripper) or place (open it) at `pose_grip`, approaching
/// and retreating through `pose_above`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickPlaceRequest {
    /// Approach and retreat pose.
    pub pose_above: Pose,
    /// Grasp or release pose.
    pub pose_grip: Pose,
    /// `true` to pick (close), `false` to place (open).
    pub gripper_close: bool,
    /// Scene object to attach when picking.
    #[serde(default)]
    pub object: Option<ObjectId>,
}

/// A move request of any kind, dispatched by the controlled execution template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveRequest {
    /// See [`MovePtpRequest`].
    Ptp(MovePtpRequest),
    /// See [`MoveLinRequest`].
    Lin(MoveLinRequest),
    /// See [`MoveJointsRequest`].
    Joints(MoveJointsRequest),
    /// See [`MoveRandomRequest`].
    Random(MoveRandomRequest),
    /// See [`PickPlaceRequest`].
    PickPlace(PickPlaceRequest),
    /// Open the gripper and return to the configured home configuration.
    Home,
}

impl MoveRequest {
    /// Service name used for logging and spans.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Ptp(_) => names::MOVE_PTP,
            Self::Lin(_) => names::MOVE_LIN,
            Self::Joints(_) => names::MOVE_JOINTS,
            Self::Random(_) => names::MOVE_RANDOM,
            Self::PickPlace(_) => names::PICK_PLACE,
            Self::Home => names::RESET_TO_HOME,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Configuration reached by a random move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomMoveOutcome {
    /// The joint configuration moved to.
    pub joints: JointValues,
    /// End-effector pose at that configuration.
    pub pose: Pose,
}

/// Payload of a successful controlled execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The motion completed (or was already at its goal).
    Done,
    /// A random move completed.
    Random(RandomMoveOutcome),
}

/// Response to a move service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResponse<T = ()> {
    /// `true` if the motion completed.
    pub success: bool,
    /// Outcome code; [`ErrorCode::Success`] iff `success`.
    pub error_code: ErrorCode,
    /// Human-readable failure description (empty on success).
    pub message: String,
    /// Result data, present only on success.
    pub payload: Option<T>,
}

impl<T> MoveResponse<T> {
    /// Builds a response from an operation result.
    pub fn from_result(result: MoveResult<T>) -> Self {
        match result {
            Ok(payload) => Self {
                success: true,
                error_code: ErrorCode::Success,
                message: String::new(),
                payload: Some(payload),
            },
            Err(error) => Self {
                success: false,
                error_code: error.code(),
                message: error.message().to_string(),
                payload: None,
            },
        }
    }

    /// Converts the payload; a successful response whose payload does not
    /// convert becomes an internal-error response.
    pub fn and_then_payload<U>(self, f: impl FnOnce(T) -> Option<U>) -> MoveResponse<U> {
        match self.payload.map(f) {
            Some(Some(payload)) => MoveResponse {
                success: self.success,
                error_code: self.error_code,
                message: self.message,
                payload: Some(payload),
            },
            // The motion itself already ran through severity handling, so this
            // mismatch must not claim a critical failure the process never acted on.
            Some(None) => MoveResponse::from_result(Err(MoveError::recoverable(
                ErrorKind::InternalError,
                "operation produced an unexpected payload",
            ))),
            None => MoveResponse {
                success: self.success,
                error_code: self.error_code,
                message: self.message,
                payload: None,
            },
        }
    }

    /// Converts the response back into a result.
    pub fn into_result(self) -> MoveResult<Option<T>> {
        match self.error_code {
            ErrorCode::Success => Ok(self.payload),
            ErrorCode::Failure { kind, severity } => Err(match severity {
                crate::Severity::Critical => MoveError::critical(kind, self.message),
                crate::Severity::Recoverable => MoveError::recoverable(kind, self.message),
            }),
        }
    }
}

/// Response to a pose query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPoseResponse {
    /// `true` if a state was available.
    pub success: bool,
    /// Current end-effector pose.
    pub pose: Option<Pose>,
}

/// Response to a joint-values query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetJointValuesResponse {
    /// `true` if a state was available.
    pub success: bool,
    /// Current joint values.
    pub joints: Option<JointValues>,
}

/// Response to the readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// `true` if the robot accepts motion requests.
    pub success: bool,
    /// Reason when not ready.
    pub message: String,
}
