//! Configuration of the simulated arm, planner, controller, and gripper.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Damped least-squares IK parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IkConfig {
    /// Iterations per attempt.
    pub iterations: usize,
    /// Random restarts after the seeded attempt fails.
    pub restarts: usize,
    /// Damping factor λ.
    pub damping: f64,
    /// Position tolerance (metres).
    pub position_tolerance: f64,
    /// Orientation tolerance (radians).
    pub orientation_tolerance: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            iterations: 150,
            restarts: 12,
            damping: 0.05,
            position_tolerance: 1e-5,
            orientation_tolerance: 1e-4,
        }
    }
}

/// Configuration for the simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Length of each link along its local z axis (metres).
    pub link_lengths: [f64; 6],
    /// Collision capsule radius of each link (metres).
    pub link_radii: [f64; 6],
    /// `[min, max]` position limit of each joint (radians).
    pub joint_limits: [[f64; 2]; 6],
    /// Maximum joint speed used to time trajectories (rad/s).
    pub max_joint_velocity: f64,
    /// Largest joint step between planned waypoints (radians).
    pub planner_step: f64,
    /// Inverse kinematics parameters.
    pub ik: IkConfig,
    /// Factor applied to trajectory durations while executing (0 = instant).
    pub time_scale: f64,
    /// Gripper actuation time in milliseconds.
    pub gripper_delay_ms: u64,
    /// Time factor the trajectory hooks apply (`< 1.0` speeds motions up).
    pub trajectory_speedup: f64,
    /// RNG seed for deterministic mode. None = random.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            link_lengths: [0.3, 0.35, 0.3, 0.05, 0.08, 0.06],
            link_radii: [0.06, 0.05, 0.045, 0.04, 0.035, 0.03],
            joint_limits: [
                [-3.1, 3.1],
                [-2.0, 2.0],
                [-2.6, 2.6],
                [-3.1, 3.1],
                [-2.2, 2.2],
                [-3.1, 3.1],
            ],
            max_joint_velocity: 1.0,
            planner_step: 0.05,
            ik: IkConfig::default(),
            time_scale: 1.0,
            gripper_delay_ms: 200,
            trajectory_speedup: 1.0,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Reads, parses, and validates a JSON simulation config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| SimError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its constraint.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.link_lengths.iter().any(|l| !(l.is_finite() && *l >= 0.0)) {
            return Err(invalid("link_lengths", "must be finite and non-negative"));
        }
        if self.link_radii.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(invalid("link_radii", "must be finite and positive"));
        }
        if self
            .joint_limits
            .iter()
            .any(|[min, max]| !(min.is_finite() && max.is_finite() && min < max))
        {
            return Err(invalid("joint_limits", "each limit needs finite min < max"));
        }
        for (field, value) in [
            ("max_joint_velocity", self.max_joint_velocity),
            ("planner_step", self.planner_step),
            ("trajectory_speedup", self.trajectory_speedup),
            ("ik.damping", self.ik.damping),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "must be finite and positive"));
            }
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            return Err(invalid("time_scale", "must be finite and non-negative"));
        }
        if self.ik.iterations == 0 {
            return Err(invalid("ik.iterations", "must be non-zero"));
        }
        Ok(())
    }

    /// Settings for fast, reproducible tests: instant execution, fixed seed.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            time_scale: 0.0,
            gripper_delay_ms: 0,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> SimError {
    SimError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}
