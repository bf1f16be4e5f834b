//! Serialisable description of a robot's kinematic tree and collision bodies

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

// Internal
use crate::collision::Shape;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Description of a robot, normally loaded from `params/robot.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotDescription {
    /// Name of the robot.
    pub name: String,

    /// Name of the link at the base of the tree. All poses are expressed in
    /// this link's frame, referred to as the world frame.
    pub root_link: String,

    #[serde(default)]
    pub links: Vec<LinkDesc>,

    #[serde(default)]
    pub joints: Vec<JointDesc>,

    #[serde(default)]
    pub collision_bodies: Vec<CollisionBodyDesc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDesc {
    pub name: String,
}

/// A joint connecting a parent link to a child link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointDesc {
    pub name: String,

    pub kind: JointKind,

    pub parent: String,

    pub child: String,

    /// Position of the joint frame in the parent link frame.
    ///
    /// Units: meters
    #[serde(default)]
    pub origin_xyz_m: [f64; 3],

    /// Orientation of the joint frame in the parent link frame as roll,
    /// pitch, yaw.
    ///
    /// Units: radians
    #[serde(default)]
    pub origin_rpy_rad: [f64; 3],

    /// Axis of motion in the joint frame. Ignored for fixed joints.
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],

    /// Lower position limit.
    ///
    /// Units: radians for revolute joints, meters for prismatic joints
    #[serde(default)]
    pub min_pos: f64,

    /// Upper position limit.
    ///
    /// Units: radians for revolute joints, meters for prismatic joints
    #[serde(default)]
    pub max_pos: f64,
}

/// A convex proxy shape rigidly attached to a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionBodyDesc {
    pub name: String,

    /// Link the body is attached to.
    pub link: String,

    pub shape: Shape,

    /// Position of the body in the link frame.
    ///
    /// Units: meters
    #[serde(default)]
    pub fix_xyz_m: [f64; 3],

    /// Orientation of the body in the link frame as roll, pitch, yaw.
    ///
    /// Units: radians
    #[serde(default)]
    pub fix_rpy_rad: [f64; 3],

    /// Explicit collision group. Bodies sharing a group are never checked
    /// against each other. If not given the group is derived from the tree.
    #[serde(default)]
    pub group: Option<String>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Revolute,
    Prismatic,
    Fixed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointKind {
    /// Returns true if the joint has a degree of freedom.
    pub fn is_movable(&self) -> bool {
        !matches!(self, JointKind::Fixed)
    }
}

/// Build an isometry from a translation and roll, pitch, yaw angles.
pub fn isometry_from_xyz_rpy(xyz: &[f64; 3], rpy: &[f64; 3]) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

fn default_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}
