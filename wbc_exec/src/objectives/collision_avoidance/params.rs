//! Parameters structure for CollisionAvoidance

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::objectives::{check_positive, ObjectiveError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for collision avoidance, one set per collision class.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CollisionAvoidanceParams {
    /// Forces between the robot's own bodies.
    #[serde(default)]
    pub self_collision: CollisionClassParams,

    /// Forces between the robot's bodies and the environment map.
    #[serde(default)]
    pub environment_collision: CollisionClassParams,
}

/// Force law parameters of one collision class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollisionClassParams {
    /// Force at zero distance.
    ///
    /// Units: newtons
    #[serde(default = "default_f_max")]
    pub f_max: f64,

    /// Distance at and beyond which no force is produced.
    ///
    /// Units: meters
    #[serde(default = "default_d_threshold")]
    pub d_threshold_m: f64,

    /// Exponent of the force law.
    #[serde(default = "default_order")]
    pub order: u32,

    /// Margin added around each body when searching the environment map.
    /// Zero uses the map's own voxel resolution.
    ///
    /// Units: meters
    #[serde(default)]
    pub map_resolution_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CollisionClassParams {
    fn default() -> Self {
        Self {
            f_max: default_f_max(),
            d_threshold_m: default_d_threshold(),
            order: default_order(),
            map_resolution_m: 0.0,
        }
    }
}

impl CollisionClassParams {
    pub(crate) fn validate(&self, class: &str) -> Result<(), ObjectiveError> {
        check_positive(&format!("{} f_max", class), self.f_max)?;
        check_positive(&format!("{} d_threshold_m", class), self.d_threshold_m)?;

        if self.order < 1 || i32::try_from(self.order).is_err() {
            return Err(ObjectiveError::InvalidParameter(format!(
                "{} order must be in [1, {}], found {}",
                class,
                i32::MAX,
                self.order
            )));
        }

        if !self.map_resolution_m.is_finite() || self.map_resolution_m < 0.0 {
            return Err(ObjectiveError::InvalidParameter(format!(
                "{} map_resolution_m must be zero or positive, found {}",
                class, self.map_resolution_m
            )));
        }

        Ok(())
    }
}

fn default_f_max() -> f64 {
    1.0
}

fn default_d_threshold() -> f64 {
    1.0
}

fn default_order() -> u32 {
    1
}
