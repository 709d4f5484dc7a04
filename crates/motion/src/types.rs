//! Shared value types for the motion domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (joint vectors are compared
//! element-wise, poses are rigid transforms, trajectories are ordered in
//! time) and participate in the guard and validator computations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Joint space
// ---------------------------------------------------------------------------

/// A joint-space configuration: one position per actuated joint, in radians.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointValues(Vec<f64>);

impl JointValues {
    /// Creates a configuration from raw joint positions.
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Creates the all-zero configuration for `joints` joints.
    pub fn zeros(joints: usize) -> Self {
        Self(vec![0.0; joints])
    }

    /// Returns the joint positions as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Returns the number of joints.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the configuration has no joints.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if every position is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Returns the largest absolute per-joint difference to `other`.
    ///
    /// Returns `None` when the two configurations have different lengths.
    pub fn max_abs_delta(&self, other: &JointValues) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }

    /// Consumes the configuration and returns the raw positions.
    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for JointValues {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl std::ops::Index<usize> for JointValues {
    type Output = f64;
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl std::fmt::Display for JointValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.4}")?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------

/// Position limits of one joint, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
}

impl JointLimit {
    /// Creates a limit, returning `None` unless `min <= max` and both are finite.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Option<Self> {
        if min.is_finite() && max.is_finite() && min <= max {
            Some(Self { min, max })
        } else {
            None
        }
    }

    /// Returns `true` if `value` lies within the limit.
    pub fn contains(self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Clamps `value` into the limit.
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Cartesian space
// ---------------------------------------------------------------------------

/// End-effector pose in the robot base frame (metres, unit quaternion).
///
/// Wraps [`nalgebra::Isometry3<f64>`], which stores translation as a vector
/// and rotation as a unit quaternion, so orientation comparisons are free of
/// Euler-angle singularities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose(Isometry3<f64>);

impl Pose {
    /// Creates a pose from an isometry.
    pub fn new(isometry: Isometry3<f64>) -> Self {
        Self(isometry)
    }

    /// Creates a pose with identity orientation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self(Isometry3::translation(x, y, z))
    }

    /// Creates a pose from a position and roll/pitch/yaw angles (radians).
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self(Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        ))
    }

    /// Returns the underlying isometry.
    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.0
    }

    /// Returns the position vector.
    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    /// Returns the orientation.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.0.rotation
    }

    /// Returns `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.0.translation.vector.iter().all(|v| v.is_finite())
            && self.0.rotation.coords.iter().all(|v| v.is_finite())
    }

    /// Returns the straight-line distance between the two positions.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.translation() - other.translation()).norm()
    }

    /// Returns the rotation angle (radians, in `[0, π]`) between the two orientations.
    pub fn angle_to(&self, other: &Pose) -> f64 {
        self.0.rotation.angle_to(&other.0.rotation)
    }

    /// Returns the pose interpolated at `t ∈ [0, 1]` towards `other`.
    ///
    /// Position is interpolated linearly and orientation by slerp.
    pub fn interpolate(&self, other: &Pose, t: f64) -> Pose {
        Pose(self.0.lerp_slerp(&other.0, t))
    }
}

impl From<Isometry3<f64>> for Pose {
    fn from(isometry: Isometry3<f64>) -> Self {
        Self(isometry)
    }
}

// ---------------------------------------------------------------------------
// Robot state
// ---------------------------------------------------------------------------

/// Where a [`RobotState`] snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    /// Read from the live joint-state stream of the controller.
    Live,
    /// Served from a cache that is no longer being refreshed.
    Cached,
}

/// An immutable snapshot of the manipulator's joint state.
///
/// Owned by the operation that requested it; never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    joints: JointValues,
    velocities: Vec<f64>,
    captured_at: Timestamp,
    source: StateSource,
}

impl RobotState {
    /// Creates a snapshot captured now from the live stream.
    pub fn live(joints: JointValues, velocities: Vec<f64>) -> Self {
        Self::captured(joints, velocities, Timestamp::now(), StateSource::Live)
    }

    /// Creates a snapshot with explicit capture metadata.
    pub fn captured(
        joints: JointValues,
        velocities: Vec<f64>,
        captured_at: Timestamp,
        source: StateSource,
    ) -> Self {
        Self {
            joints,
            velocities,
            captured_at,
            source,
        }
    }

    /// Returns the joint positions.
    pub fn joints(&self) -> &JointValues {
        &self.joints
    }

    /// Returns the joint velocities (may be empty if the source does not report them).
    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    /// Returns when the snapshot was captured.
    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Returns where the snapshot came from.
    pub fn source(&self) -> StateSource {
        self.source
    }

    /// Returns `true` if the snapshot is live and no older than `max_age` at `now`.
    pub fn is_fresh(&self, max_age: Duration, now: Timestamp) -> bool {
        self.source == StateSource::Live && now.duration_since(self.captured_at) <= max_age
    }
}

// ---------------------------------------------------------------------------
// Trajectories
// ---------------------------------------------------------------------------

/// Which kind of motion produced a trajectory; selects the backend hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryKind {
    /// Joint-space point-to-point motion.
    Ptp,
    /// Straight-line Cartesian motion.
    Linear,
}

/// One timed point of a [`Trajectory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Joint positions at this point.
    pub positions: JointValues,
    /// Joint velocities at this point (empty if not parametrised).
    pub velocities: Vec<f64>,
    /// Time offset from the start of the trajectory.
    pub time_from_start: Duration,
}

impl Waypoint {
    /// Creates a waypoint without velocity information.
    pub fn new(positions: JointValues, time_from_start: Duration) -> Self {
        Self {
            positions,
            velocities: Vec::new(),
            time_from_start,
        }
    }
}

/// An ordered sequence of timed joint-space waypoints.
///
/// Produced by planning, optionally rewritten by a backend hook, and consumed
/// exactly once by execution. It is deliberately not `Clone`.
#[derive(Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Creates a trajectory from waypoints in execution order.
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    /// Returns the waypoints in execution order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Returns mutable access to the waypoints (for backend hooks).
    pub fn waypoints_mut(&mut self) -> &mut [Waypoint] {
        &mut self.waypoints
    }

    /// Returns the number of waypoints.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Returns `true` if the trajectory has no waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Returns the final waypoint, if any.
    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    /// Returns the time offset of the final waypoint.
    pub fn duration(&self) -> Duration {
        self.last().map_or(Duration::ZERO, |w| w.time_from_start)
    }

    /// Rescales timing by `factor` (`< 1.0` speeds the motion up).
    ///
    /// Time offsets are multiplied and velocities divided by `factor`.
    /// Non-positive or non-finite factors leave the trajectory unchanged and
    /// return `false`.
    pub fn scale_time(&mut self, factor: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) {
            return false;
        }
        for waypoint in &mut self.waypoints {
            waypoint.time_from_start = waypoint.time_from_start.mul_f64(factor);
            for v in &mut waypoint.velocities {
                *v /= factor;
            }
        }
        true
    }

    /// Consumes the trajectory and returns its waypoints.
    pub fn into_waypoints(self) -> Vec<Waypoint> {
        self.waypoints
    }
}

/// Result of a linear (Cartesian) planning request.
#[derive(Debug)]
pub struct CartesianPath {
    /// The joint-space trajectory following the path as far as it was planned.
    pub trajectory: Trajectory,
    /// Fraction of the requested path (`[0.0, 1.0]`) that could be planned.
    pub fraction: f64,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the time elapsed from `earlier` to `self`.
    ///
    /// Saturates to zero when `earlier` lies in the future.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
