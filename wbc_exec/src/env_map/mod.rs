//! Environment map
//!
//! A volumetric occupancy map of the robot's surroundings. The map is built
//! and owned by the caller and shared with the controller, which only reads
//! it to find obstacles near each collision body.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod occupancy_map;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::io;

// Internal
pub use occupancy_map::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OccupancyMapError {
    #[error("Map resolution must be finite and positive, found {0}")]
    InvalidResolution(f64),

    #[error("An IO operation failed: {0}")]
    IoError(io::Error),

    #[error("Couldn't deserialize the given OccupancyMap: {0}")]
    DeserializeError(serde_json::Error),

    #[error("Couldn't serialize the given OccupancyMap: {0}")]
    SerializeError(serde_json::Error),
}
