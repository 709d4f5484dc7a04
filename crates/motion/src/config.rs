//! Deployment-tunable configuration for the motion pipeline.
//!
//! Every epsilon, threshold, and timeout used by the guards, the validator,
//! and the execution template lives here; none is hardcoded in the logic.
//! All fields have defaults so a configuration file only needs to name what
//! it overrides.
//!
//! Configuration is JSON:
//!
//! ```json
//! {
//!   "guards": { "joint_epsilon": 0.001 },
//!   "validator": { "max_joint_jump": 0.3 },
//!   "home": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, JointValues, LinkName};

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// What a move operation does with a goal that is too close to the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TooClosePolicy {
    /// Report success without planning; the robot is already there.
    #[default]
    Succeed,
    /// Report a recoverable `goal_too_close` failure.
    Reject,
}

/// Thresholds for the proximity guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Per-joint delta (radians) below which a joint goal is degenerate.
    pub joint_epsilon: f64,
    /// Translation distance (metres) below which a pose goal may be degenerate.
    pub linear_epsilon: f64,
    /// Rotation angle (radians) below which a pose goal may be degenerate.
    pub angular_epsilon: f64,
    /// Outcome reported for degenerate goals.
    pub too_close_policy: TooClosePolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            joint_epsilon: 1e-3,
            linear_epsilon: 1e-4,
            angular_epsilon: 1e-3,
            too_close_policy: TooClosePolicy::Succeed,
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Structural limits enforced on every planned trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Largest allowed change (radians) of any joint between consecutive waypoints.
    pub max_joint_jump: f64,
    /// Fewest waypoints a trajectory may have.
    pub min_waypoints: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_joint_jump: 0.3,
            min_waypoints: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Robot state freshness
// ---------------------------------------------------------------------------

/// How old a robot state may be and how long to wait for a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Maximum age of a live state before it counts as stale.
    pub max_age_ms: u64,
    /// How long `current_robot_state(wait = true)` polls for a fresh state.
    pub wait_timeout_ms: u64,
    /// Interval between polls while waiting.
    pub poll_interval_ms: u64,
}

impl StateConfig {
    /// Returns [`StateConfig::max_age_ms`] as a [`Duration`].
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Returns [`StateConfig::wait_timeout_ms`] as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Returns [`StateConfig::poll_interval_ms`] as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 500,
            wait_timeout_ms: 2_000,
            poll_interval_ms: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend, linear planning, random moves, jobs
// ---------------------------------------------------------------------------

/// Bounds on calls into the backend hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Upper bound for any single hook call; exceeding it counts as failure.
    pub hook_timeout_ms: u64,
}

impl BackendConfig {
    /// Returns [`BackendConfig::hook_timeout_ms`] as a [`Duration`].
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            hook_timeout_ms: 5_000,
        }
    }
}

/// Options passed to the planner for linear moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearConfig {
    /// Maximum end-effector travel (metres) between interpolated path points.
    pub eef_step: f64,
    /// Whether the planner should time-parametrise the Cartesian path.
    pub time_parametrization: bool,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            eef_step: 0.005,
            time_parametrization: true,
        }
    }
}

/// Random-move sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomConfig {
    /// Number of random configurations drawn before giving up.
    pub attempts: u32,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self { attempts: 50 }
    }
}

/// End-effector description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndEffectorConfig {
    /// Whether a gripper is mounted. Without one, gripper operations are no-ops
    /// and pick-and-place is refused.
    pub gripper_attached: bool,
    /// Link grasped objects are attached to.
    pub link: Option<LinkName>,
    /// Links allowed to touch an attached object.
    pub touch_links: Vec<LinkName>,
}

impl Default for EndEffectorConfig {
    fn default() -> Self {
        Self {
            gripper_attached: true,
            link: LinkName::new("link_6"),
            touch_links: Vec::new(),
        }
    }
}

/// Job state machine timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// How long `idle_action` waits for a cancelled job to reach a checkpoint.
    pub cancel_timeout_ms: u64,
}

impl JobConfig {
    /// Returns [`JobConfig::cancel_timeout_ms`] as a [`Duration`].
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete configuration of the motion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    /// Proximity guard thresholds.
    pub guards: GuardConfig,
    /// Trajectory validator limits.
    pub validator: ValidatorConfig,
    /// Robot state freshness.
    pub state: StateConfig,
    /// Backend hook bounds.
    pub backend: BackendConfig,
    /// Linear planning options.
    pub linear: LinearConfig,
    /// Random-move sampling.
    pub random: RandomConfig,
    /// End-effector description.
    pub end_effector: EndEffectorConfig,
    /// Job state machine timing.
    pub job: JobConfig,
    /// Joint target for `reset_to_home`.
    pub home: JointValues,
    /// Links that must be present in the planning scene before motion is allowed.
    pub required_collision_links: Vec<LinkName>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            guards: GuardConfig::default(),
            validator: ValidatorConfig::default(),
            state: StateConfig::default(),
            backend: BackendConfig::default(),
            linear: LinearConfig::default(),
            random: RandomConfig::default(),
            end_effector: EndEffectorConfig::default(),
            job: JobConfig::default(),
            home: JointValues::zeros(6),
            required_collision_links: Vec::new(),
        }
    }
}

impl MotionConfig {
    /// Reads, parses, and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("guards.joint_epsilon", self.guards.joint_epsilon)?;
        positive("guards.linear_epsilon", self.guards.linear_epsilon)?;
        positive("guards.angular_epsilon", self.guards.angular_epsilon)?;
        positive("validator.max_joint_jump", self.validator.max_joint_jump)?;
        positive("linear.eef_step", self.linear.eef_step)?;

        if self.validator.min_waypoints < 2 {
            return Err(ConfigError::Invalid {
                field: "validator.min_waypoints",
                reason: format!("must be at least 2, got {}", self.validator.min_waypoints),
            });
        }
        nonzero("state.max_age_ms", self.state.max_age_ms)?;
        nonzero("state.poll_interval_ms", self.state.poll_interval_ms)?;
        nonzero("backend.hook_timeout_ms", self.backend.hook_timeout_ms)?;
        nonzero("random.attempts", u64::from(self.random.attempts))?;

        if !self.home.is_finite() {
            return Err(ConfigError::Invalid {
                field: "home",
                reason: "joint values must be finite".to_string(),
            });
        }
        if self.end_effector.gripper_attached && self.end_effector.link.is_none() {
            return Err(ConfigError::Invalid {
                field: "end_effector.link",
                reason: "required when a gripper is attached".to_string(),
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive finite number, got {value}"),
        })
    }
}

fn nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        MotionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "guards": {{ "joint_epsilon": 0.01 }}, "required_collision_links": ["table"] }}"#
        )
        .unwrap();

        let config = MotionConfig::load(file.path()).unwrap();
        assert_eq!(config.guards.joint_epsilon, 0.01);
        assert_eq!(config.guards.linear_epsilon, GuardConfig::default().linear_epsilon);
        assert_eq!(config.required_collision_links, vec![LinkName::new("table").unwrap()]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "guards": {{ "joint_eps": 0.01 }} }}"#).unwrap();
        assert!(matches!(
            MotionConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MotionConfig::load(dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn non_positive_thresholds_are_invalid() {
        let mut config = MotionConfig::default();
        config.validator.max_joint_jump = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "validator.max_joint_jump", .. })
        ));

        let mut config = MotionConfig::default();
        config.guards.angular_epsilon = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = MotionConfig::default();
        config.validator.min_waypoints = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn gripper_requires_an_end_effector_link() {
        let mut config = MotionConfig::default();
        config.end_effector.link = None;
        assert!(config.validate().is_err());
        config.end_effector.gripper_attached = false;
        config.validate().unwrap();
    }
}
