//! Kinematics module
//!
//! Holds the robot's joint tree, the measured joint state and the
//! forward-kinematics pose of every link. Objectives register the root to tip
//! chains they act on here and refer to them by `ChainId`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod description;
mod model;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use description::*;
pub use model::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum norm of a joint axis in the description.
pub const MIN_AXIS_NORM: f64 = 1e-9;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while building or updating the kinematic
/// model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("The link {0:?} is defined more than once")]
    DuplicateLink(String),

    #[error("The joint {0:?} is defined more than once")]
    DuplicateJoint(String),

    #[error("Unknown link {0:?}")]
    UnknownLink(String),

    #[error("The link {0:?} is the child of more than one joint")]
    MultipleParents(String),

    #[error("The joint {0:?} makes the root link a child, the tree contains a cycle")]
    Cycle(String),

    #[error("The link {0:?} is not connected to the root link")]
    Disconnected(String),

    #[error("The joint {joint:?} has invalid limits [{min}, {max}]")]
    InvalidLimits { joint: String, min: f64, max: f64 },

    #[error("The joint {0:?} has a zero length axis")]
    ZeroAxis(String),

    #[error("The description contains no movable joints")]
    NoMovableJoints,

    #[error("Unknown joint {0:?}")]
    UnknownJoint(String),

    #[error("The joint {0:?} was given a non-finite measurement")]
    NonFiniteMeasurement(String),

    #[error("Unknown frame {0:?}")]
    UnknownFrame(String),

    #[error("The frame {root:?} is not an ancestor of {tip:?}")]
    NotAnAncestor { root: String, tip: String },

    #[error("Unknown chain {0:?}")]
    UnknownChain(ChainId),
}
