//! Measured joint state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Internal
use super::KinematicsError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Ordered mapping from joint name to measured position and velocity.
///
/// The ordering is fixed when the model is built and matches the columns of
/// every Jacobian and the entries of every torque vector.
#[derive(Debug, Clone, Serialize)]
pub struct KinematicState {
    names: Vec<String>,

    #[serde(skip)]
    index: HashMap<String, usize>,

    /// Units: radians or meters
    positions: DVector<f64>,

    /// Units: radians/second or meters/second
    velocities: DVector<f64>,
}

/// A single joint sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMeasurement {
    pub name: String,

    /// Units: radians or meters
    pub position: f64,

    /// Units: radians/second or meters/second
    #[serde(default)]
    pub velocity: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for KinematicState {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            index: HashMap::new(),
            positions: DVector::zeros(0),
            velocities: DVector::zeros(0),
        }
    }
}

impl KinematicState {
    /// Create a new state for the given joints with the given initial
    /// positions and zero velocity.
    pub(crate) fn new(names: Vec<String>, initial_positions: DVector<f64>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let num_joints = names.len();

        Self {
            names,
            index,
            positions: initial_positions,
            velocities: DVector::zeros(num_joints),
        }
    }

    /// Apply a set of measurements.
    ///
    /// Joints not present in `measurements` keep their previous value. If any
    /// measurement names an unknown joint or is not finite the state is left
    /// untouched.
    pub fn apply(&mut self, measurements: &[JointMeasurement]) -> Result<(), KinematicsError> {
        let mut updates = Vec::with_capacity(measurements.len());

        for m in measurements {
            let i = *self
                .index
                .get(&m.name)
                .ok_or_else(|| KinematicsError::UnknownJoint(m.name.clone()))?;

            if !m.position.is_finite() || !m.velocity.is_finite() {
                return Err(KinematicsError::NonFiniteMeasurement(m.name.clone()));
            }

            updates.push((i, m));
        }

        for (i, m) in updates {
            self.positions[i] = m.position;
            self.velocities[i] = m.velocity;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Get the index of a joint by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_to_index(&self) -> &HashMap<String, usize> {
        &self.index
    }

    pub fn positions(&self) -> &DVector<f64> {
        &self.positions
    }

    pub fn velocities(&self) -> &DVector<f64> {
        &self.velocities
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
