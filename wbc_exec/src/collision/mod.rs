//! Collision geometry
//!
//! Convex proxy shapes, a GJK closest-distance query between pairs of them
//! and the model of collision bodies attached to the robot's links.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod body;
mod gjk;
mod shape;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use body::*;
pub use gjk::*;
pub use shape::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Length below which a vector is treated as zero.
pub const EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors when building the collision model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollisionError {
    #[error("The collision body {0:?} is defined more than once")]
    DuplicateBody(String),

    #[error("The collision body {body:?} is attached to unknown link {link:?}")]
    UnknownLink { body: String, link: String },

    #[error("The collision body {0:?} has an invalid shape: {1:?}")]
    InvalidShape(String, Shape),
}
