//! Six-joint serial arm model.
//!
//! Joint axes, from base to flange: z, y, y, z, y, z. Every link extends
//! along its local z axis, so the zero configuration is a vertical column
//! with the tool pointing up. Link `link_i` spans from joint `i` to joint
//! `i + 1`; its frame sits at the far end, and the frame of `link_6` is the
//! tool tip.

use std::sync::{Mutex, PoisonError};

use nalgebra::{Isometry3, Matrix6, Translation3, Unit, UnitQuaternion, Vector3, Vector6};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use motion::{
    ErrorKind, JointLimit, JointName, JointValues, Kinematics, LinkName, MoveError, MoveResult,
    PlanningScene, Pose,
};

use crate::config::IkConfig;
use crate::{SimConfig, SimError};

/// Number of actuated joints.
pub const JOINTS: usize = 6;

const JACOBIAN_STEP: f64 = 1e-6;

fn axis(joint: usize) -> Unit<Vector3<f64>> {
    match joint {
        1 | 2 | 4 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    }
}

/// Frames at the end of each link; index 0 is the base.
pub type Frames = [Isometry3<f64>; JOINTS + 1];

/// Kinematic model of the simulated arm.
pub struct SimArm {
    lengths: [f64; JOINTS],
    joints: Vec<JointName>,
    limits: Vec<JointLimit>,
    links: Vec<LinkName>,
    ik: IkConfig,
    rng: Mutex<StdRng>,
}

impl SimArm {
    /// Builds the arm described by `config`.
    pub fn new(config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let limits = config
            .joint_limits
            .iter()
            .map(|[min, max]| JointLimit::new(*min, *max))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SimError::InvalidConfig {
                field: "joint_limits",
                reason: "each limit needs finite min < max".to_string(),
            })?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            lengths: config.link_lengths,
            joints: numbered("joint", |n| JointName::new(n))?,
            limits,
            links: numbered("link", |n| LinkName::new(n))?,
            ik: config.ik.clone(),
            rng: Mutex::new(rng),
        })
    }

    /// Returns the index of `link`, if it belongs to the arm.
    pub fn link_index(&self, link: &LinkName) -> Option<usize> {
        self.links.iter().position(|l| l == link)
    }

    /// A planning scene for this arm with contacts between links at most two
    /// joints apart allowed; those always touch at the shared joints.
    pub fn default_scene(&self) -> PlanningScene {
        let mut scene = PlanningScene::new(self.links.iter().cloned());
        for i in 0..JOINTS {
            for j in (i + 1)..JOINTS.min(i + 3) {
                scene.allow_collision(self.links[i].clone(), self.links[j].clone());
            }
        }
        scene
    }

    /// Computes the link frames for `joints`.
    pub fn frames(&self, joints: &JointValues) -> MoveResult<Frames> {
        let q = as_array(joints)?;
        Ok(self.chain(&q))
    }

    fn chain(&self, q: &[f64; JOINTS]) -> Frames {
        let mut frames = [Isometry3::identity(); JOINTS + 1];
        for i in 0..JOINTS {
            let rotation = UnitQuaternion::from_axis_angle(&axis(i), q[i]);
            let offset = Translation3::new(0.0, 0.0, self.lengths[i]);
            frames[i + 1] = frames[i]
                * Isometry3::from_parts(Translation3::identity(), rotation)
                * Isometry3::from_parts(offset, UnitQuaternion::identity());
        }
        frames
    }

    fn tip(&self, q: &[f64; JOINTS]) -> Isometry3<f64> {
        self.chain(q)[JOINTS]
    }

    fn jacobian(&self, q: &[f64; JOINTS], current: &Isometry3<f64>) -> Matrix6<f64> {
        let mut jacobian = Matrix6::zeros();
        for i in 0..JOINTS {
            let mut nudged = *q;
            nudged[i] += JACOBIAN_STEP;
            let column = pose_error(&self.tip(&nudged), current) / JACOBIAN_STEP;
            jacobian.set_column(i, &column);
        }
        jacobian
    }

    /// One damped least-squares descent from `seed`.
    fn solve(&self, target: &Isometry3<f64>, seed: &[f64; JOINTS]) -> Option<JointValues> {
        let mut q = *seed;
        for (value, limit) in q.iter_mut().zip(&self.limits) {
            *value = limit.clamp(*value);
        }
        let damping = Matrix6::identity() * self.ik.damping.powi(2);

        for _ in 0..self.ik.iterations {
            let current = self.tip(&q);
            let error = pose_error(target, &current);
            if error.fixed_rows::<3>(0).norm() < self.ik.position_tolerance
                && error.fixed_rows::<3>(3).norm() < self.ik.orientation_tolerance
            {
                return Some(JointValues::new(q.to_vec()));
            }
            let jacobian = self.jacobian(&q, &current);
            let step = (jacobian * jacobian.transpose() + damping).lu().solve(&error)?;
            let dq = jacobian.transpose() * step;
            for (i, (value, limit)) in q.iter_mut().zip(&self.limits).enumerate() {
                *value = limit.clamp(*value + dq[i]);
            }
        }
        None
    }

    /// Solves IK from `seed` only, without random restarts.
    ///
    /// Used where continuity with the seed matters more than finding any
    /// solution, such as following a Cartesian path.
    pub fn inverse_near(&self, pose: &Pose, seed: &JointValues) -> Option<JointValues> {
        self.solve(pose.isometry(), &as_array(seed).ok()?)
    }
}

impl Kinematics for SimArm {
    fn joint_names(&self) -> &[JointName] {
        &self.joints
    }

    fn joint_limits(&self) -> &[JointLimit] {
        &self.limits
    }

    fn link_names(&self) -> &[LinkName] {
        &self.links
    }

    fn link_pose(&self, joints: &JointValues, link: &LinkName) -> MoveResult<Pose> {
        let index = self
            .link_index(link)
            .ok_or_else(|| SimError::UnknownLink(link.to_string()))?;
        Ok(Pose::new(self.frames(joints)?[index + 1]))
    }

    fn forward(&self, joints: &JointValues) -> MoveResult<Pose> {
        Ok(Pose::new(self.frames(joints)?[JOINTS]))
    }

    fn inverse(&self, pose: &Pose, seed: &JointValues) -> Option<JointValues> {
        let target = pose.isometry();
        let seed = as_array(seed).unwrap_or([0.0; JOINTS]);
        if let Some(solution) = self.solve(target, &seed) {
            return Some(solution);
        }
        (0..self.ik.restarts).find_map(|_| {
            let restart = as_array(&self.random_joint_values()).ok()?;
            self.solve(target, &restart)
        })
    }

    fn random_joint_values(&self) -> JointValues {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        JointValues::new(
            self.limits
                .iter()
                .map(|l| rng.gen_range(l.min..=l.max))
                .collect(),
        )
    }
}

/// Twist taking `from` to `to`: translation difference and rotation vector.
fn pose_error(to: &Isometry3<f64>, from: &Isometry3<f64>) -> Vector6<f64> {
    let dp = to.translation.vector - from.translation.vector;
    let dr = (to.rotation * from.rotation.inverse()).scaled_axis();
    Vector6::new(dp.x, dp.y, dp.z, dr.x, dr.y, dr.z)
}

fn as_array(joints: &JointValues) -> MoveResult<[f64; JOINTS]> {
    joints.as_slice().try_into().map_err(|_| {
        MoveError::new(
            ErrorKind::InvalidInput,
            format!("expected {JOINTS} joint values, got {}", joints.len()),
        )
    })
}

fn numbered<T>(prefix: &str, make: impl Fn(String) -> Option<T>) -> Result<Vec<T>, SimError> {
    (1..=JOINTS)
        .map(|i| make(format!("{prefix}_{i}")))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SimError::InvalidConfig {
            field: "link_lengths",
            reason: format!("could not name the {prefix}s"),
        })
}
