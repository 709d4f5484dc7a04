//! Planning scene: obstacles, attached objects, and the allowed-collision matrix.
//!
//! The scene is append-mostly shared state. It is owned by the single-flight
//! lock inside [`crate::MoveIface`], so it can only be mutated by whoever
//! holds that lock; guards and the validator borrow it immutably.
//!
//! Collision *geometry* is the job of the [`crate::CollisionChecker`] port,
//! which reports raw contacts between bodies. The scene decides which of
//! those contacts matter through its [`AllowedCollisionMatrix`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, LinkName, MoveError, MoveResult, ObjectId, Pose};

// ---------------------------------------------------------------------------
// Bodies and contacts
// ---------------------------------------------------------------------------

/// Something that can take part in a collision: a robot link or a scene object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// A link of the robot model.
    Link(LinkName),
    /// A world or attached collision object.
    Object(ObjectId),
}

impl From<LinkName> for Body {
    fn from(link: LinkName) -> Self {
        Self::Link(link)
    }
}

impl From<ObjectId> for Body {
    fn from(object: ObjectId) -> Self {
        Self::Object(object)
    }
}

impl std::fmt::Display for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link(l) => write!(f, "link '{l}'"),
            Self::Object(o) => write!(f, "object '{o}'"),
        }
    }
}

/// A raw contact reported by the collision checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// First body.
    pub a: Body,
    /// Second body.
    pub b: Body,
    /// Penetration depth in metres (`>= 0`).
    pub depth: f64,
}

impl Contact {
    /// Creates a contact between two bodies.
    pub fn new(a: impl Into<Body>, b: impl Into<Body>, depth: f64) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Allowed-collision matrix
// ---------------------------------------------------------------------------

/// Table of body pairs exempted from collision checking.
///
/// Pairs are unordered: allowing `(a, b)` also allows `(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllowedCollisionMatrix {
    pairs: BTreeSet<(Body, Body)>,
}

impl AllowedCollisionMatrix {
    /// Creates an empty matrix (every contact counts).
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: Body, b: Body) -> (Body, Body) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Exempts the pair. Returns `false` if it was already exempt.
    pub fn allow(&mut self, a: impl Into<Body>, b: impl Into<Body>) -> bool {
        self.pairs.insert(Self::key(a.into(), b.into()))
    }

    /// Removes the exemption. Returns `false` if the pair was not exempt.
    pub fn disallow(&mut self, a: impl Into<Body>, b: impl Into<Body>) -> bool {
        self.pairs.remove(&Self::key(a.into(), b.into()))
    }

    /// Returns `true` if contacts between `a` and `b` are permitted.
    pub fn is_allowed(&self, a: &Body, b: &Body) -> bool {
        let key = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.pairs.contains(&key)
    }

    /// Returns the number of exempt pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no pair is exempt.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over exempt pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(Body, Body)> {
        self.pairs.iter()
    }
}

// ---------------------------------------------------------------------------
// Collision objects
// ---------------------------------------------------------------------------

/// Collision geometry of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Sphere centred on the object pose.
    Sphere {
        /// Radius in metres.
        radius: f64,
    },
    /// Box centred on the object pose.
    Cuboid {
        /// Half side lengths along the object's x, y, z axes, in metres.
        half_extents: [f64; 3],
    },
}

/// An obstacle or graspable object in the world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    /// Scene-unique identifier.
    pub id: ObjectId,
    /// Geometry.
    pub shape: Shape,
    /// Pose of the shape centre in the robot base frame.
    pub pose: Pose,
}

/// An object carried by the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedObject {
    /// The object, with `pose` expressed relative to [`AttachedObject::link`].
    pub object: CollisionObject,
    /// Link the object moves with.
    pub link: LinkName,
    /// Links exempted from collision with the object while attached.
    pub touch_links: Vec<LinkName>,
    /// The subset of `touch_links` whose exemption the attach added. Detach
    /// revokes only these, so exemptions set up beforehand survive.
    #[serde(default)]
    pub granted: Vec<LinkName>,
}

// ---------------------------------------------------------------------------
// Planning scene
// ---------------------------------------------------------------------------

/// Model of the robot's surroundings used to validate goals and trajectories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningScene {
    links: BTreeSet<LinkName>,
    world: BTreeMap<ObjectId, CollisionObject>,
    attached: BTreeMap<ObjectId, AttachedObject>,
    acm: AllowedCollisionMatrix,
    revision: u64,
}

impl PlanningScene {
    /// Creates a scene for a robot with the given links.
    pub fn new(links: impl IntoIterator<Item = LinkName>) -> Self {
        Self {
            links: links.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Returns the robot links known to the scene.
    pub fn links(&self) -> impl Iterator<Item = &LinkName> {
        self.links.iter()
    }

    /// Returns `true` if `name` is a robot link or a world/attached object.
    pub fn knows(&self, name: &str) -> bool {
        self.links.iter().any(|l| l.as_str() == name)
            || self.world.keys().any(|o| o.as_str() == name)
            || self.attached.keys().any(|o| o.as_str() == name)
    }

    /// Returns `true` if every required name is known to the scene.
    pub fn is_ready(&self, required: &[LinkName]) -> bool {
        !self.links.is_empty() && required.iter().all(|l| self.knows(l.as_str()))
    }

    /// Returns the allowed-collision matrix.
    pub fn acm(&self) -> &AllowedCollisionMatrix {
        &self.acm
    }

    /// Monotonic counter bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the contacts from `contacts` that the matrix does not exempt.
    pub fn disallowed<'a>(&self, contacts: &'a [Contact]) -> Vec<&'a Contact> {
        contacts
            .iter()
            .filter(|c| !self.acm.is_allowed(&c.a, &c.b))
            .collect()
    }

    /// Exempts a body pair from collision checking.
    pub fn allow_collision(&mut self, a: impl Into<Body>, b: impl Into<Body>) {
        if self.acm.allow(a, b) {
            self.revision += 1;
        }
    }

    /// Removes a collision exemption.
    pub fn disallow_collision(&mut self, a: impl Into<Body>, b: impl Into<Body>) {
        if self.acm.disallow(a, b) {
            self.revision += 1;
        }
    }

    /// Iterates over world objects.
    pub fn world_objects(&self) -> impl Iterator<Item = &CollisionObject> {
        self.world.values()
    }

    /// Iterates over attached objects.
    pub fn attached_objects(&self) -> impl Iterator<Item = &AttachedObject> {
        self.attached.values()
    }

    /// Returns the world object with `id`.
    pub fn world_object(&self, id: &ObjectId) -> Option<&CollisionObject> {
        self.world.get(id)
    }

    /// Returns the attached object with `id`.
    pub fn attached_object(&self, id: &ObjectId) -> Option<&AttachedObject> {
        self.attached.get(id)
    }

    /// Adds or replaces a world object; returns the replaced object.
    ///
    /// Fails if an attached object already uses the identifier.
    pub fn add_object(&mut self, object: CollisionObject) -> MoveResult<Option<CollisionObject>> {
        if self.attached.contains_key(&object.id) {
            return Err(MoveError::new(
                ErrorKind::InvalidInput,
                format!("object '{}' is attached to the robot", object.id),
            ));
        }
        self.revision += 1;
        Ok(self.world.insert(object.id.clone(), object))
    }

    /// Removes a world object.
    pub fn remove_object(&mut self, id: &ObjectId) -> MoveResult<CollisionObject> {
        let removed = self.world.remove(id).ok_or_else(|| {
            MoveError::new(
                ErrorKind::InvalidInput,
                format!("no world object '{id}' in the planning scene"),
            )
        })?;
        self.revision += 1;
        Ok(removed)
    }

    /// Attaches world object `id` to `link`, whose current world pose is `link_pose`.
    ///
    /// The object keeps its world pose at the moment of attachment and from then
    /// on moves with the link. Contacts between the object and `link` or any of
    /// `touch_links` are exempted until detach.
    pub fn attach_object(
        &mut self,
        id: &ObjectId,
        link: &LinkName,
        touch_links: &[LinkName],
        link_pose: &Pose,
    ) -> MoveResult {
        if !self.links.contains(link) {
            return Err(MoveError::new(
                ErrorKind::InvalidInput,
                format!("cannot attach to unknown link '{link}'"),
            ));
        }
        let mut object = self.world.remove(id).ok_or_else(|| {
            MoveError::new(
                ErrorKind::InvalidInput,
                format!("no world object '{id}' to attach"),
            )
        })?;

        object.pose = Pose::new(link_pose.isometry().inverse() * object.pose.isometry());
        let mut touching = vec![link.clone()];
        touching.extend(touch_links.iter().filter(|l| *l != link).cloned());
        let granted = touching
            .iter()
            .filter(|touch| self.acm.allow(id.clone(), (*touch).clone()))
            .cloned()
            .collect();
        self.attached.insert(
            id.clone(),
            AttachedObject {
                object,
                link: link.clone(),
                touch_links: touching,
                granted,
            },
        );
        self.revision += 1;
        Ok(())
    }

    /// Detaches object `id`, leaving it in the world where its link (at
    /// `link_pose`) currently holds it, and revokes the exemptions the attach
    /// granted.
    pub fn detach_object(&mut self, id: &ObjectId, link_pose: &Pose) -> MoveResult {
        let attached = self.attached.remove(id).ok_or_else(|| {
            MoveError::new(
                ErrorKind::InvalidInput,
                format!("object '{id}' is not attached"),
            )
        })?;
        for touch in &attached.granted {
            self.acm.disallow(id.clone(), touch.clone());
        }
        let mut object = attached.object;
        object.pose = Pose::new(link_pose.isometry() * object.pose.isometry());
        self.world.insert(id.clone(), object);
        self.revision += 1;
        Ok(())
    }
}
