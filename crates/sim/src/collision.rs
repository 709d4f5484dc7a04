//! Geometric collision checking for the simulated arm.
//!
//! Links are capsules around the segment between consecutive joints.
//! Obstacles are spheres or boxes; attached objects are placed at their
//! link's current frame. Distances use signed distance functions, so a shape
//! resting exactly on another (a cube on a table) is touching but not in
//! contact. Capsule/box and box/box queries are sampled rather than exact,
//! which is adequate at simulation link sizes.

use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::warn;

use motion::{
    Body, CollisionChecker, Contact, JointValues, Kinematics, ObjectId, PlanningScene, Shape,
};

use crate::arm::{SimArm, JOINTS};
use crate::SimConfig;

/// Penetration below this depth (metres) is treated as touching.
const CONTACT_MARGIN: f64 = 1e-4;

/// Points sampled along a capsule axis for box queries.
const SEGMENT_SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy)]
struct Capsule {
    a: Vector3<f64>,
    b: Vector3<f64>,
    radius: f64,
}

struct Placed<'a> {
    id: &'a ObjectId,
    shape: Shape,
    pose: Isometry3<f64>,
}

/// Collision checker for [`SimArm`].
pub struct SimCollisionChecker {
    arm: Arc<SimArm>,
    radii: [f64; JOINTS],
}

impl SimCollisionChecker {
    /// Creates a checker for `arm` with the capsule radii from `config`.
    pub fn new(arm: Arc<SimArm>, config: &SimConfig) -> Self {
        Self {
            arm,
            radii: config.link_radii,
        }
    }

    fn link(&self, index: usize) -> Body {
        Body::Link(self.arm.link_names()[index].clone())
    }
}

impl CollisionChecker for SimCollisionChecker {
    fn contacts(&self, scene: &PlanningScene, joints: &JointValues) -> Vec<Contact> {
        let frames = match self.arm.frames(joints) {
            Ok(frames) => frames,
            Err(e) => {
                // Fail closed: an unevaluable configuration counts as colliding.
                warn!(error = %e, "Cannot evaluate collisions");
                return vec![Contact::new(self.link(0), self.link(JOINTS - 1), f64::INFINITY)];
            }
        };
        let capsules: Vec<Capsule> = (0..JOINTS)
            .map(|i| Capsule {
                a: frames[i].translation.vector,
                b: frames[i + 1].translation.vector,
                radius: self.radii[i],
            })
            .collect();

        let mut contacts = Vec::new();
        for i in 0..JOINTS {
            for j in (i + 1)..JOINTS {
                let distance = segment_segment_distance(&capsules[i], &capsules[j])
                    - capsules[i].radius
                    - capsules[j].radius;
                push_contact(&mut contacts, self.link(i), self.link(j), distance);
            }
        }

        let world: Vec<Placed<'_>> = scene
            .world_objects()
            .map(|o| Placed {
                id: &o.id,
                shape: o.shape,
                pose: *o.pose.isometry(),
            })
            .collect();
        let attached: Vec<Placed<'_>> = scene
            .attached_objects()
            .filter_map(|a| {
                let index = self.arm.link_index(&a.link)?;
                Some(Placed {
                    id: &a.object.id,
                    shape: a.object.shape,
                    pose: frames[index + 1] * a.object.pose.isometry(),
                })
            })
            .collect();

        for object in world.iter().chain(&attached) {
            for (i, capsule) in capsules.iter().enumerate() {
                let distance = capsule_shape_distance(capsule, &object.shape, &object.pose);
                push_contact(&mut contacts, self.link(i), object.id.clone(), distance);
            }
        }
        for carried in &attached {
            for obstacle in &world {
                let distance = shape_shape_distance(carried, obstacle);
                push_contact(&mut contacts, carried.id.clone(), obstacle.id.clone(), distance);
            }
        }
        contacts
    }
}

fn push_contact(
    contacts: &mut Vec<Contact>,
    a: impl Into<Body>,
    b: impl Into<Body>,
    distance: f64,
) {
    if -distance > CONTACT_MARGIN {
        contacts.push(Contact::new(a, b, -distance));
    }
}

// ---------------------------------------------------------------------------
// Distance queries
// ---------------------------------------------------------------------------

fn segment_point_distance(a: &Vector3<f64>, b: &Vector3<f64>, p: &Vector3<f64>) -> f64 {
    let ab = b - a;
    let length2 = ab.norm_squared();
    let t = if length2 > 0.0 {
        ((p - a).dot(&ab) / length2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (a + ab * t - p).norm()
}

/// Closest distance between two capsule axes.
fn segment_segment_distance(s: &Capsule, t: &Capsule) -> f64 {
    let d1 = s.b - s.a;
    let d2 = t.b - t.a;
    let r = s.a - t.a;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    let (sc, tc) = if a <= f64::EPSILON && e <= f64::EPSILON {
        (0.0, 0.0)
    } else if a <= f64::EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= f64::EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut sc = if denom > f64::EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut tc = (b * sc + f) / e;
            if tc < 0.0 {
                tc = 0.0;
                sc = (-c / a).clamp(0.0, 1.0);
            } else if tc > 1.0 {
                tc = 1.0;
                sc = ((b - c) / a).clamp(0.0, 1.0);
            }
            (sc, tc)
        }
    };
    ((s.a + d1 * sc) - (t.a + d2 * tc)).norm()
}

/// Signed distance from `p` to a box; negative inside.
fn box_signed_distance(pose: &Isometry3<f64>, half: &[f64; 3], p: &Vector3<f64>) -> f64 {
    let local = pose.inverse_transform_point(&Point3::from(*p));
    let q = Vector3::new(
        local.x.abs() - half[0],
        local.y.abs() - half[1],
        local.z.abs() - half[2],
    );
    let outside = Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0)).norm();
    let inside = q.x.max(q.y).max(q.z).min(0.0);
    outside + inside
}

fn shape_signed_distance(shape: &Shape, pose: &Isometry3<f64>, p: &Vector3<f64>) -> f64 {
    match shape {
        Shape::Sphere { radius } => (p - pose.translation.vector).norm() - radius,
        Shape::Cuboid { half_extents } => box_signed_distance(pose, half_extents, p),
    }
}

fn capsule_shape_distance(capsule: &Capsule, shape: &Shape, pose: &Isometry3<f64>) -> f64 {
    let surface = match shape {
        Shape::Sphere { radius } => {
            segment_point_distance(&capsule.a, &capsule.b, &pose.translation.vector) - radius
        }
        Shape::Cuboid { .. } => (0..=SEGMENT_SAMPLES)
            .map(|k| {
                let t = k as f64 / SEGMENT_SAMPLES as f64;
                let p = capsule.a + (capsule.b - capsule.a) * t;
                shape_signed_distance(shape, pose, &p)
            })
            .fold(f64::INFINITY, f64::min),
    };
    surface - capsule.radius
}

/// Corners and centre of a box in world coordinates.
fn box_points(pose: &Isometry3<f64>, half: &[f64; 3]) -> Vec<Vector3<f64>> {
    let mut points = vec![pose.translation.vector];
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                let corner = Point3::new(sx * half[0], sy * half[1], sz * half[2]);
                points.push((pose * corner).coords);
            }
        }
    }
    points
}

fn shape_shape_distance(a: &Placed<'_>, b: &Placed<'_>) -> f64 {
    match (&a.shape, &b.shape) {
        (Shape::Sphere { radius }, _) => {
            shape_signed_distance(&b.shape, &b.pose, &a.pose.translation.vector) - radius
        }
        (_, Shape::Sphere { radius }) => {
            shape_signed_distance(&a.shape, &a.pose, &b.pose.translation.vector) - radius
        }
        (Shape::Cuboid { half_extents: ha }, Shape::Cuboid { half_extents: hb }) => {
            let a_in_b = box_points(&a.pose, ha)
                .iter()
                .map(|p| box_signed_distance(&b.pose, hb, p))
                .fold(f64::INFINITY, f64::min);
            let b_in_a = box_points(&b.pose, hb)
                .iter()
                .map(|p| box_signed_distance(&a.pose, ha, p))
                .fold(f64::INFINITY, f64::min);
            a_in_b.min(b_in_a)
        }
    }
}
