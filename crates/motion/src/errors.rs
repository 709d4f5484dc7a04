//! Error-code and severity types for the motion pipeline.
//!
//! [`ErrorCode`] is the tri-state outcome every pipeline operation reports:
//! success, a recoverable failure, or a critical failure. [`MoveError`] is the
//! error half of [`MoveResult`]; it carries a failure kind, its severity, and
//! a human-readable message.
//!
//! [`Severity`] is a cross-cutting concern: guards, the validator, and the
//! collaborator ports only *construct* errors. The controlled execution
//! template is the single place that reads the severity and decides between
//! reporting the failure and aborting all further motion.
//!
//! [`ConfigError`] covers configuration loading and validation, which happens
//! before any motion is possible.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How far a failure reaches beyond the request that produced it.
///
/// ## Rules
///
/// - `Recoverable`: the request failed but the robot is known to be safe; the
///   process stays ready for new requests.
/// - `Critical`: the robot state can no longer be trusted. All further motion
///   is refused until an operator resets the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The request failed; the process remains ready.
    Recoverable,
    /// The process must stop accepting motion until reset.
    Critical,
}

impl Severity {
    /// Returns the snake-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure kinds
// ---------------------------------------------------------------------------

/// Why an operation failed.
///
/// Every kind has a default [`Severity`] (see [`ErrorKind::default_severity`]);
/// code that knows better may construct a [`MoveError`] with an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The goal is within the degenerate-motion epsilon of the start and the
    /// configured policy rejects such requests.
    GoalTooClose,
    /// The goal configuration collides on a link pair the allowed-collision
    /// matrix does not exempt.
    GoalInCollision,
    /// A planned trajectory failed structural validation or was rejected by
    /// the backend hook.
    TrajectoryInvalid,
    /// The robot state is missing, cached, or too old, or the collision scene
    /// is not ready.
    StateUnavailable,
    /// The planning engine could not produce a trajectory.
    PlanningFailed,
    /// A linear path could only be planned for part of the distance.
    PartialPathPlanned,
    /// No inverse-kinematics solution exists for the requested pose.
    NoIkSolution,
    /// The request itself is malformed (wrong joint count, out of limits,
    /// non-finite values).
    InvalidInput,
    /// No collision-free random configuration was found.
    NoRandomPosition,
    /// Another controlled execution or job is already in flight.
    Busy,
    /// A job observed its cancellation token at a checkpoint.
    Cancelled,
    /// Trajectory execution failed on the controller.
    ExecutionFailed,
    /// The gripper did not complete an open or close operation.
    GripperFailed,
    /// The process has aborted after a critical failure and refuses motion.
    NotAllowedToMove,
    /// An invariant inside the service itself was violated.
    InternalError,
}

impl ErrorKind {
    /// Returns the severity a failure of this kind carries unless the code
    /// constructing it says otherwise.
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::ExecutionFailed
            | Self::GripperFailed
            | Self::NotAllowedToMove
            | Self::InternalError => Severity::Critical,
            Self::GoalTooClose
            | Self::GoalInCollision
            | Self::TrajectoryInvalid
            | Self::StateUnavailable
            | Self::PlanningFailed
            | Self::PartialPathPlanned
            | Self::NoIkSolution
            | Self::InvalidInput
            | Self::NoRandomPosition
            | Self::Busy
            | Self::Cancelled => Severity::Recoverable,
        }
    }

    /// Returns the snake-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoalTooClose => "goal_too_close",
            Self::GoalInCollision => "goal_in_collision",
            Self::TrajectoryInvalid => "trajectory_invalid",
            Self::StateUnavailable => "state_unavailable",
            Self::PlanningFailed => "planning_failed",
            Self::PartialPathPlanned => "partial_path_planned",
            Self::NoIkSolution => "no_ik_solution",
            Self::InvalidInput => "invalid_input",
            Self::NoRandomPosition => "no_random_position",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::ExecutionFailed => "execution_failed",
            Self::GripperFailed => "gripper_failed",
            Self::NotAllowedToMove => "not_allowed_to_move",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// The outcome of a pipeline operation as reported to callers.
///
/// Success is the single distinguished [`ErrorCode::Success`] value and has no
/// severity; only failures carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ErrorCode {
    /// The operation completed.
    Success,
    /// The operation failed.
    Failure {
        /// Why it failed.
        kind: ErrorKind,
        /// How far the failure reaches.
        severity: Severity,
    },
}

impl ErrorCode {
    /// Creates a failure code with the kind's default severity.
    pub const fn failure(kind: ErrorKind) -> Self {
        Self::Failure {
            kind,
            severity: kind.default_severity(),
        }
    }

    /// Returns the code describing `result`.
    pub fn of<T>(result: &MoveResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.code(),
        }
    }

    /// Returns `true` for [`ErrorCode::Success`].
    pub const fn succeeded(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` for any failure.
    pub const fn failed(self) -> bool {
        !self.succeeded()
    }

    /// Returns `true` for a failure with [`Severity::Critical`].
    pub const fn is_critical(self) -> bool {
        matches!(
            self,
            Self::Failure {
                severity: Severity::Critical,
                ..
            }
        )
    }

    /// Returns the failure kind, or `None` on success.
    pub const fn kind(self) -> Option<ErrorKind> {
        match self {
            Self::Success => None,
            Self::Failure { kind, .. } => Some(kind),
        }
    }

    /// Returns the failure severity, or `None` on success.
    pub const fn severity(self) -> Option<Severity> {
        match self {
            Self::Success => None,
            Self::Failure { severity, .. } => Some(severity),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure { kind, severity } => write!(f, "{kind} ({severity})"),
        }
    }
}

// ---------------------------------------------------------------------------
// MoveError
// ---------------------------------------------------------------------------

/// A failed pipeline operation.
///
/// Constructed as close to the cause as possible and propagated by value with
/// `?`. Nothing in the pipeline panics on a motion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} ({severity}): {message}")]
pub struct MoveError {
    kind: ErrorKind,
    severity: Severity,
    message: String,
}

impl MoveError {
    /// Creates an error with the kind's default severity.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
        }
    }

    /// Creates an error with [`Severity::Critical`] regardless of kind.
    pub fn critical(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    /// Creates an error with [`Severity::Recoverable`] regardless of kind.
    pub fn recoverable(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Recoverable,
            message: message.into(),
        }
    }

    /// Returns the same failure with [`Severity::Critical`].
    #[must_use]
    pub fn escalate(mut self) -> Self {
        self.severity = Severity::Critical;
        self
    }

    /// Returns the failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the failure severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if this failure mandates an abort.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Returns the wire-level [`ErrorCode`] for this failure.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Failure {
            kind: self.kind,
            severity: self.severity,
        }
    }
}

/// Result type returned by every fallible pipeline operation.
pub type MoveResult<T = ()> = Result<T, MoveError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors produced while loading or validating [`crate::MotionConfig`].
///
/// Produced at start-up; the service never runs with an invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration file '{}': {source}", path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::MotionConfig`].
    #[error("Failed to parse configuration file '{}': {source}", path.display())]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value violates its constraint.
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
