//! Whole body controller module
//!
//! Owns the kinematic model and the set of motion objectives, and turns their
//! combined torque into joint references once per cycle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

use crate::admittance::AdmittanceError;
use crate::env_map::OccupancyMapError;
use crate::kinematics::KinematicsError;
use crate::objectives::{ObjectiveError, ObjectiveHandle};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which prevent the controller from being initialised.
#[derive(Debug, thiserror::Error)]
pub enum WbcInitError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Invalid robot description: {0}")]
    InvalidDescription(#[from] KinematicsError),

    #[error("Could not initialise the {0} objective: {1}")]
    ObjectiveInitError(String, ObjectiveError),

    #[error("Invalid admittance configuration: {0}")]
    AdmittanceError(#[from] AdmittanceError),

    #[error("Could not load the environment map: {0}")]
    EnvMapError(#[from] OccupancyMapError),

    #[error("The cycle period must be positive, found {0} s")]
    InvalidCyclePeriod(f64),
}

/// Errors returned by cyclic processing and the controller's runtime API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WbcProcError {
    #[error("The controller has not been initialised")]
    NotInitialised,

    #[error("Invalid joint measurement: {0}")]
    InvalidMeasurement(#[from] KinematicsError),

    #[error("No objective with handle {0}")]
    UnknownObjective(ObjectiveHandle),

    #[error("No posture control objective is active")]
    NoPostureControl,

    #[error(transparent)]
    ObjectiveError(#[from] ObjectiveError),
}
