//! # Controller Executable Parameters
//!
//! This module provides parameters for the controller executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::kinematics::isometry_from_xyz_rpy;
use crate::objectives::{CartesianImpedance, PositionTolerance};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WbcExecParams {
    /// Stop after this many cycles. Runs forever if not given.
    #[serde(default)]
    pub max_cycles: Option<u64>,

    /// Joint positions fed back on the first cycle, keyed by joint name.
    #[serde(default)]
    pub initial_positions: HashMap<String, f64>,

    /// Cartesian goals added as impedance objectives at start up.
    #[serde(default)]
    pub goals: Vec<CartesianGoal>,
}

/// A Cartesian impedance objective and its goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartesianGoal {
    pub tip: String,

    pub root: String,

    /// Translational then rotational stiffness.
    ///
    /// Units: N/m, Nm/rad
    pub stiffness: [f64; 6],

    /// Units: newtons
    #[serde(default)]
    pub max_force_n: Option<f64>,

    /// Goal position of the tip in the root frame.
    ///
    /// Units: meters
    pub position_m: [f64; 3],

    /// Goal orientation of the tip in the root frame.
    ///
    /// Units: radians
    #[serde(default)]
    pub orientation_rpy_rad: [f64; 3],

    #[serde(default)]
    pub position_tolerance: Option<PositionTolerance>,

    /// Units: radians
    #[serde(default)]
    pub orientation_tolerance_rpy_rad: Option<[f64; 3]>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CartesianGoal {
    pub fn pose(&self) -> Isometry3<f64> {
        isometry_from_xyz_rpy(&self.position_m, &self.orientation_rpy_rad)
    }

    /// Build the impedance objective with its goal set.
    pub fn to_objective(&self) -> CartesianImpedance {
        let mut ci = CartesianImpedance::new(&self.tip, &self.root, self.stiffness);

        if let Some(f) = self.max_force_n {
            ci = ci.with_max_force(f);
        }
        if let Some(tol) = self.position_tolerance {
            ci.set_position_tolerance(tol);
        }
        if let Some([r, p, y]) = self.orientation_tolerance_rpy_rad {
            ci.set_orientation_tolerance(r, p, y);
        }

        ci.set_goal(self.pose());
        ci
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::objectives::ImpedanceStatus;
    use std::path::Path;

    #[test]
    fn test_goal_params() {
        let params: WbcExecParams = util::params::from_str(
            Path::new("wbc_exec.toml"),
            r#"
            max_cycles = 100

            [initial_positions]
            elbow = 0.5

            [[goals]]
            tip = "tool"
            root = "base"
            stiffness = [100.0, 100.0, 100.0, 10.0, 10.0, 10.0]
            position_m = [1.5, 0.5, 0.0]
            position_tolerance = { type = "sphere", radius_m = 0.01 }
            "#,
        )
        .unwrap();

        assert_eq!(params.max_cycles, Some(100));
        assert_eq!(params.initial_positions["elbow"], 0.5);
        assert_eq!(params.goals.len(), 1);

        let ci = params.goals[0].to_objective();
        assert_eq!(ci.tip_frame(), "tool");
        assert_eq!(ci.status(), ImpedanceStatus::Active);
        assert_eq!(ci.goal().unwrap().translation.vector.x, 1.5);
    }
}
