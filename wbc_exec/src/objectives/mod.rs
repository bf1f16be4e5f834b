//! Motion objectives
//!
//! Each objective contributes joint torques to the controller every cycle.
//! Primary objectives act directly, secondary objectives are projected into
//! the nullspace of the active Cartesian tasks before being added.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cartesian_impedance;
mod collision_avoidance;
mod joint_limit_avoidance;
mod posture_control;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DVector, Point3, Unit, Vector3, Vector6};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;

// Internal
use crate::collision::CollisionError;
use crate::env_map::OccupancyMap;
use crate::jacobian::TaskJacobian;
use crate::kinematics::{ChainId, KinematicModel, KinematicsError};

pub use cartesian_impedance::*;
pub use collision_avoidance::*;
pub use joint_limit_avoidance::*;
pub use posture_control::*;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A contributor to the controller's joint torque.
pub trait MotionObjective: Any + Send {
    /// Human readable name, used in logs and status reports.
    fn name(&self) -> &str;

    fn kind(&self) -> ObjectiveKind;

    fn priority(&self) -> Priority;

    /// Prepare the objective for the given model.
    ///
    /// Called once when the objective is added to the controller. Objectives
    /// acting on a Cartesian frame register their chain here.
    fn initialize(&mut self, model: &mut KinematicModel) -> Result<(), ObjectiveError>;

    /// Chain which must be part of the combined Jacobian, if any.
    fn active_chain(&self) -> Option<ChainId> {
        None
    }

    /// Add this cycle's contribution to the accumulators.
    fn apply(&mut self, ctx: &CycleContext, acc: &mut Accumulators);

    /// Sum of the absolute torques contributed on the last cycle.
    fn cost(&self) -> f64;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to an objective owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectiveHandle(pub(crate) u64);

/// Everything an objective may read during a cycle.
pub struct CycleContext<'a> {
    pub model: &'a KinematicModel,

    pub jacobian: &'a TaskJacobian,

    pub env_map: Option<&'a Arc<OccupancyMap>>,

    /// Units: seconds
    pub cycle_period_s: f64,
}

/// Torques and wrenches collected from every objective in a cycle.
#[derive(Debug, Clone)]
pub struct Accumulators {
    /// Torques applied directly.
    pub tau_primary: DVector<f64>,

    /// Torques projected into the task nullspace before being applied.
    pub tau_secondary: DVector<f64>,

    pub wrenches: Vec<Wrench>,

    pub repulsive_forces: Vec<RepulsiveForce>,
}

/// A force and torque acting at a frame's origin, expressed in the world
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wrench {
    pub frame_id: String,

    /// Force followed by torque.
    ///
    /// Units: newtons, newton meters
    pub wrench: Vector6<f64>,
}

/// A repulsive force pushing a collision body away from an obstacle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepulsiveForce {
    pub frame_id: String,

    pub class: CollisionClass,

    /// Closest point on the robot body, where the force is applied.
    pub point: Point3<f64>,

    /// Unit direction pointing away from the obstacle.
    pub direction: Unit<Vector3<f64>>,

    /// Units: newtons
    pub magnitude: f64,

    /// Distance which produced the force.
    ///
    /// Units: meters
    pub distance_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectiveKind {
    CartesianImpedance,
    CollisionAvoidance,
    JointLimitAvoidance,
    PostureControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Primary,
    Secondary,
}

/// Source of a repulsive force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollisionClass {
    SelfCollision,
    Environment,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectiveError {
    #[error("Kinematics error: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("Collision model error: {0}")]
    Collision(#[from] CollisionError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown joint {0:?}")]
    UnknownJoint(String),

    #[error("Target {value} for joint {joint:?} is outside [{min}, {max}]")]
    TargetOutOfBounds {
        joint: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("The objective has not been initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Accumulators {
    pub fn new(num_joints: usize) -> Self {
        Self {
            tau_primary: DVector::zeros(num_joints),
            tau_secondary: DVector::zeros(num_joints),
            wrenches: Vec::new(),
            repulsive_forces: Vec::new(),
        }
    }

    /// Reset for a new cycle, keeping allocations.
    pub fn clear(&mut self) {
        self.tau_primary.fill(0.0);
        self.tau_secondary.fill(0.0);
        self.wrenches.clear();
        self.repulsive_forces.clear();
    }

    /// The torque vector for the given priority.
    pub fn tau_mut(&mut self, priority: Priority) -> &mut DVector<f64> {
        match priority {
            Priority::Primary => &mut self.tau_primary,
            Priority::Secondary => &mut self.tau_secondary,
        }
    }
}

impl Wrench {
    pub fn force(&self) -> Vector3<f64> {
        self.wrench.fixed_rows::<3>(0).into_owned()
    }

    pub fn torque(&self) -> Vector3<f64> {
        self.wrench.fixed_rows::<3>(3).into_owned()
    }
}

impl std::fmt::Display for ObjectiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Check that a gain or limit is finite and positive.
pub(crate) fn check_positive(name: &str, value: f64) -> Result<(), ObjectiveError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ObjectiveError::InvalidParameter(format!(
            "{} must be finite and positive, found {}",
            name, value
        )))
    }
}
