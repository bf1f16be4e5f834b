//! # Whole body controller library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the controller crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Admittance stage - integrates joint torques into position and velocity references
pub mod admittance;

/// Collision geometry - convex shapes, closest distance queries and the robot's collision bodies
pub mod collision;

/// Cycle management - fixed period timing of the main loop
pub mod cycle;

/// Global data store for the executable
pub mod data_store;

/// Environment map - sparse voxel occupancy of the robot's surroundings
pub mod env_map;

/// Jacobians of the active chains over the full joint vector
pub mod jacobian;

/// Kinematic tree, joint state and forward kinematics
pub mod kinematics;

/// Nullspace projection of secondary torques
pub mod nullspace;

/// Motion objectives contributing joint torques every cycle
pub mod objectives;

/// Executable parameters
pub mod params;

/// Whole body controller - composes the objectives into joint references
pub mod wbc;

#[cfg(test)]
mod fixtures;
