//! Safety-gated motion execution for a robot arm.
//!
//! Every motion request passes through one controlled execution sequence:
//! pre-checks, proximity and collision guards, planning, trajectory
//! validation, execution, and a post-check. Failures are classified as
//! recoverable (the request failed, the robot is known-safe) or critical (the
//! robot state is no longer trustworthy); a critical failure disables all
//! further motion until an operator reset.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! Kinematics, collision checking, planning, the controller, and the
//! deployment hooks are port traits in [`ports`]; the `sim` crate and hardware
//! drivers implement them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`errors`] | `ErrorKind`, `Severity`, `ErrorCode`, `MoveError`, `ConfigError` |
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `LinkName`, `ObjectId`, `JointName`) |
//! | [`types`] | Joint values, poses, robot state, trajectories, timestamps |
//! | [`config`] | Deployment-tunable thresholds and timeouts |
//! | [`scene`] | Planning scene and allowed-collision matrix |
//! | [`ports`] | Collaborator port traits |
//! | [`guards`] | Too-close and in-collision goal predicates |
//! | [`validator`] | Structural trajectory checks and backend hook invocation |
//! | [`iface`] | The controlled execution template (`MoveIface`) |
//! | [`job`] | Job / idle state machine |
//! | [`service`] | Transport-agnostic requests, responses, and service names |

pub mod config;
pub mod errors;
pub mod guards;
pub mod identifiers;
pub mod iface;
pub mod job;
pub mod ports;
pub mod scene;
pub mod service;
pub mod types;
pub mod validator;

mod operations;

#[cfg(test)]
mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    BackendConfig, EndEffectorConfig, GuardConfig, JobConfig, LinearConfig, MotionConfig,
    RandomConfig, StateConfig, TooClosePolicy, ValidatorConfig,
};
pub use errors::{ConfigError, ErrorCode, ErrorKind, MoveError, MoveResult, Severity};
pub use identifiers::{JointName, LinkName, ObjectId, RequestId};
pub use iface::{Collaborators, MoveIface};
pub use job::{
    CancelToken, Job, JobContext, JobGoal, JobResult, JobServer, JobStatus, JobTask, ServerState,
};
pub use ports::{Backend, CollisionChecker, Controller, Kinematics, LinearPlanOptions, Planner};
pub use scene::{
    AllowedCollisionMatrix, AttachedObject, Body, CollisionObject, Contact, PlanningScene, Shape,
};
pub use types::{
    CartesianPath, JointLimit, JointValues, Pose, RobotState, StateSource, Timestamp, Trajectory,
    TrajectoryKind, Waypoint,
};
pub use validator::{check_structure, TrajectoryValidator};
