//! Parameters structure for the whole body controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::admittance::AdmittanceParams;
use crate::nullspace::DEFAULT_SINGULAR_TOLERANCE;
use crate::objectives::{CollisionAvoidanceParams, JointLimitParams, PostureParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the whole body controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {

    // ---- FILES ----

    /// Robot description file, relative to the parameters directory.
    pub robot_description: String,

    /// Environment map file to load at start up, relative to the parameters
    /// directory.
    #[serde(default)]
    pub environment_map: Option<String>,

    // ---- CYCLE ----

    /// Period of the control cycle.
    ///
    /// Units: seconds
    #[serde(default = "default_cycle_period")]
    pub cycle_period_s: f64,

    /// Which of the outputs the drivers should execute.
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Relative tolerance below which task singular values are ignored by
    /// the nullspace projector.
    #[serde(default = "default_nullspace_tolerance")]
    pub nullspace_tolerance: f64,

    // ---- STAGES ----

    #[serde(default)]
    pub admittance: AdmittanceParams,

    #[serde(default = "default_true")]
    pub enable_joint_limit_avoidance: bool,

    #[serde(default)]
    pub joint_limit_avoidance: JointLimitParams,

    #[serde(default = "default_true")]
    pub enable_posture_control: bool,

    #[serde(default)]
    pub posture_control: PostureParams,

    #[serde(default = "default_true")]
    pub enable_collision_avoidance: bool,

    #[serde(default)]
    pub collision_avoidance: CollisionAvoidanceParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Output the joint drivers are expected to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Joint torques.
    Torque,

    /// Joint position and velocity references from the admittance stage.
    Reference,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            robot_description: String::new(),
            environment_map: None,
            cycle_period_s: default_cycle_period(),
            output_mode: OutputMode::default(),
            nullspace_tolerance: default_nullspace_tolerance(),
            admittance: AdmittanceParams::default(),
            enable_joint_limit_avoidance: true,
            joint_limit_avoidance: JointLimitParams::default(),
            enable_posture_control: true,
            posture_control: PostureParams::default(),
            enable_collision_avoidance: true,
            collision_avoidance: CollisionAvoidanceParams::default(),
        }
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Reference
    }
}

fn default_cycle_period() -> f64 {
    0.02
}

fn default_nullspace_tolerance() -> f64 {
    DEFAULT_SINGULAR_TOLERANCE
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let params: Params = util::params::from_str(
            Path::new("wbc.toml"),
            "robot_description = \"robot.toml\"\n",
        )
        .unwrap();

        assert_eq!(params.robot_description, "robot.toml");
        assert_eq!(params.cycle_period_s, 0.02);
        assert_eq!(params.output_mode, OutputMode::Reference);
        assert!(params.enable_collision_avoidance);
        assert_eq!(params.collision_avoidance.self_collision.f_max, 1.0);
        assert_eq!(params.collision_avoidance.environment_collision.d_threshold_m, 1.0);
        assert_eq!(params.collision_avoidance.self_collision.order, 1);
    }

    #[test]
    fn test_sections() {
        let params: Params = util::params::from_str(
            Path::new("wbc.toml"),
            r#"
            robot_description = "robot.toml"
            output_mode = "torque"

            [collision_avoidance.self_collision]
            f_max = 10.0
            d_threshold_m = 0.1
            order = 2

            [posture_control.joints.elbow]
            target = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(params.output_mode, OutputMode::Torque);
        assert_eq!(params.collision_avoidance.self_collision.order, 2);
        assert_eq!(params.collision_avoidance.environment_collision.f_max, 1.0);
        assert_eq!(params.posture_control.joints["elbow"].target, Some(0.5));
    }
}
