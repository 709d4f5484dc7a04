//! Newtype domain identifiers.
//!
//! Every named thing the pipeline reasons about is a distinct newtype wrapping
//! a primitive. This prevents accidentally passing, for example, a
//! [`LinkName`] where an [`ObjectId`] is expected, even though both are
//! strings under the hood. The allowed-collision matrix relies on this: a
//! pair of links and a link/object pair are different questions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct (Ord, for ordered sets), new() returning Option<Self>,
// as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wraps `value`. Empty names are not valid identifiers.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// The name as written.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one accepted request (a move service call or a job run).
///
/// Generated fresh for every request; recorded on spans and on the
/// [`crate::JobTask`] that owns a long-running job so all activity from one
/// request can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID (e.g. one supplied by the transport).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// String-backed identifiers (robot model and scene names)
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a rigid link of the robot model (e.g. `"link_3"`).
    ///
    /// Link names are the vocabulary of the allowed-collision matrix.
    LinkName
}

string_id! {
    /// Identifies a collision object in the planning scene (e.g. `"table"`).
    ///
    /// Objects attached to the robot keep their identifier; the collision
    /// matrix treats an attached object like an extra link.
    ObjectId
}

string_id! {
    /// Identifies an actuated joint of the manipulator (e.g. `"joint_1"`).
    JointName
}
