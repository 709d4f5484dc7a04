//! Simulated manipulator for the `motion` crate.
//!
//! Implements every `motion` port against a six-joint arm model so the full
//! execution pipeline can run without hardware:
//!
//! - [`SimArm`]: forward kinematics and damped least-squares IK (`Kinematics`)
//! - [`SimCollisionChecker`]: capsule links against spheres and boxes
//! - [`SimPlanner`]: collision-checked joint and Cartesian interpolation
//! - [`SimController`]: wall-clock playback with fault injection
//! - [`SimBackend`]: a two-state gripper and trajectory retiming hooks
//!
//! [`SimConfig::deterministic`] gives instant execution and a fixed RNG seed
//! for reproducible tests.

pub mod arm;
pub mod backend;
pub mod collision;
pub mod config;
pub mod controller;
pub mod error;
pub mod planner;
pub mod robot;

pub use arm::SimArm;
pub use backend::{GripperState, SimBackend};
pub use collision::SimCollisionChecker;
pub use config::{IkConfig, SimConfig};
pub use controller::SimController;
pub use error::SimError;
pub use planner::SimPlanner;
pub use robot::SimRobot;
