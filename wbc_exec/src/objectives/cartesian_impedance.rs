//! Cartesian impedance objective
//!
//! A virtual spring between a tip frame and a goal pose. The spring wrench is
//! mapped to joint torques through the chain's block of the combined
//! Jacobian.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use nalgebra::{DVector, Isometry3, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use std::any::Any;

// Internal
use super::{
    Accumulators, CycleContext, MotionObjective, ObjectiveError, ObjectiveKind, Priority, Wrench,
};
use crate::kinematics::{ChainId, KinematicModel};
use util::maths::saturation_scale;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drives a tip frame toward a goal pose.
#[derive(Debug, Clone)]
pub struct CartesianImpedance {
    tip_frame: String,

    root_frame: String,

    /// Translational stiffness (N/m) followed by rotational stiffness
    /// (Nm/rad).
    stiffness: Vector6<f64>,

    /// Maximum norm of the translational force.
    ///
    /// Units: newtons
    max_force: Option<f64>,

    /// Goal pose of the tip expressed in the root frame.
    goal: Option<Isometry3<f64>>,

    position_tolerance: PositionTolerance,

    /// Roll, pitch and yaw tolerance.
    ///
    /// Units: radians
    orientation_tolerance: Vector3<f64>,

    chain: Option<ChainId>,

    tip_link: usize,

    root_link: usize,

    status: ImpedanceStatus,

    /// Position error followed by orientation error on the last cycle.
    error: Vector6<f64>,

    cost: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Region around the goal position in which the tip counts as arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionTolerance {
    Sphere {
        /// Units: meters
        radius_m: f64,
    },

    Box {
        /// Units: meters
        half_extents_m: [f64; 3],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImpedanceStatus {
    /// No goal set.
    Idle,

    /// Moving toward the goal.
    Active,

    /// Within tolerance of the goal.
    Converged,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PositionTolerance {
    pub fn contains(&self, error: &Vector3<f64>) -> bool {
        match self {
            PositionTolerance::Sphere { radius_m } => error.norm() <= *radius_m,
            PositionTolerance::Box { half_extents_m } => {
                (0..3).all(|i| error[i].abs() <= half_extents_m[i])
            }
        }
    }
}

impl CartesianImpedance {
    /// Create a new impedance for `tip_frame` relative to `root_frame`.
    ///
    /// `stiffness` is the translational stiffness on X, Y and Z followed by
    /// the rotational stiffness about X, Y and Z.
    pub fn new(tip_frame: &str, root_frame: &str, stiffness: [f64; 6]) -> Self {
        Self {
            tip_frame: tip_frame.into(),
            root_frame: root_frame.into(),
            stiffness: Vector6::from_column_slice(&stiffness),
            max_force: None,
            goal: None,
            position_tolerance: PositionTolerance::Sphere { radius_m: 0.0 },
            orientation_tolerance: Vector3::zeros(),
            chain: None,
            tip_link: 0,
            root_link: 0,
            status: ImpedanceStatus::Idle,
            error: Vector6::zeros(),
            cost: 0.0,
        }
    }

    /// Limit the norm of the translational force.
    pub fn with_max_force(mut self, max_force_n: f64) -> Self {
        self.max_force = Some(max_force_n);
        self
    }

    /// Set the goal pose of the tip, expressed in the root frame.
    pub fn set_goal(&mut self, goal: Isometry3<f64>) {
        debug!(
            "New goal for {}: {:?}",
            self.tip_frame,
            goal.translation.vector.as_slice()
        );
        self.goal = Some(goal);
        self.status = ImpedanceStatus::Active;
    }

    pub fn cancel_goal(&mut self) {
        self.goal = None;
        self.status = ImpedanceStatus::Idle;
    }

    pub fn set_impedance(&mut self, stiffness: [f64; 6]) -> Result<(), ObjectiveError> {
        check_stiffness(&stiffness)?;
        self.stiffness = Vector6::from_column_slice(&stiffness);
        Ok(())
    }

    pub fn set_position_tolerance(&mut self, tolerance: PositionTolerance) {
        self.position_tolerance = tolerance;
    }

    pub fn set_orientation_tolerance(&mut self, roll: f64, pitch: f64, yaw: f64) {
        self.orientation_tolerance = Vector3::new(roll.abs(), pitch.abs(), yaw.abs());
    }

    pub fn tip_frame(&self) -> &str {
        &self.tip_frame
    }

    pub fn root_frame(&self) -> &str {
        &self.root_frame
    }

    pub fn goal(&self) -> Option<&Isometry3<f64>> {
        self.goal.as_ref()
    }

    pub fn status(&self) -> ImpedanceStatus {
        self.status
    }

    /// Position and orientation error on the last cycle.
    pub fn error(&self) -> &Vector6<f64> {
        &self.error
    }
}

impl MotionObjective for CartesianImpedance {
    fn name(&self) -> &str {
        &self.tip_frame
    }

    fn kind(&self) -> ObjectiveKind {
        ObjectiveKind::CartesianImpedance
    }

    fn priority(&self) -> Priority {
        Priority::Primary
    }

    fn initialize(&mut self, model: &mut KinematicModel) -> Result<(), ObjectiveError> {
        check_stiffness(self.stiffness.as_slice())?;
        if let Some(f) = self.max_force {
            super::check_positive("maximum force", f)?;
        }

        let chain = model.chain(&self.root_frame, &self.tip_frame)?;
        let info = model
            .chain_info(chain)
            .ok_or(ObjectiveError::NotInitialised)?;

        self.tip_link = info.tip_link;
        self.root_link = info.root_link;
        self.chain = Some(chain);

        Ok(())
    }

    /// Only a goal makes the chain a primary task.
    fn active_chain(&self) -> Option<ChainId> {
        self.goal.and(self.chain)
    }

    fn apply(&mut self, ctx: &CycleContext, acc: &mut Accumulators) {
        self.cost = 0.0;

        let (goal, chain) = match (self.goal, self.chain) {
            (Some(g), Some(c)) => (g, c),
            _ => {
                self.error = Vector6::zeros();
                return;
            }
        };

        let tip = ctx.model.link_pose(self.tip_link);
        let goal_world = ctx.model.link_pose(self.root_link) * goal;

        // Position error
        let mut pos_err = goal_world.translation.vector - tip.translation.vector;
        let pos_ok = self.position_tolerance.contains(&pos_err);

        // Orientation error, checked as roll, pitch, yaw of the tip in the
        // goal frame
        let mut rot_err = (goal_world.rotation * tip.rotation.inverse()).scaled_axis();
        let (roll, pitch, yaw) = (goal_world.rotation.inverse() * tip.rotation).euler_angles();
        let rot_ok = roll.abs() <= self.orientation_tolerance.x
            && pitch.abs() <= self.orientation_tolerance.y
            && yaw.abs() <= self.orientation_tolerance.z;

        if pos_ok {
            pos_err = Vector3::zeros();
        }
        if rot_ok {
            rot_err = Vector3::zeros();
        }

        self.status = if pos_ok && rot_ok {
            ImpedanceStatus::Converged
        } else {
            ImpedanceStatus::Active
        };

        self.error = Vector6::new(
            pos_err.x, pos_err.y, pos_err.z, rot_err.x, rot_err.y, rot_err.z,
        );
        let mut wrench = self.stiffness.component_mul(&self.error);

        if let Some(max) = self.max_force {
            let scale = saturation_scale(wrench.fixed_rows::<3>(0).norm(), max);
            wrench.fixed_rows_mut::<3>(0).scale_mut(scale);
        }

        let block = match ctx.jacobian.chain_block(chain) {
            Some(b) => b,
            None => {
                warn!(
                    "No Jacobian rows for the chain of {}, skipping",
                    self.tip_frame
                );
                return;
            }
        };

        let tau = block.tr_mul(&DVector::from_column_slice(wrench.as_slice()));
        acc.tau_primary += &tau;
        self.cost = tau.iter().map(|t| t.abs()).sum();

        acc.wrenches.push(Wrench {
            frame_id: self.tip_frame.clone(),
            wrench,
        });
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn check_stiffness(stiffness: &[f64]) -> Result<(), ObjectiveError> {
    if stiffness.iter().all(|k| k.is_finite() && *k >= 0.0) {
        Ok(())
    } else {
        Err(ObjectiveError::InvalidParameter(format!(
            "stiffness must be finite and non-negative, found {:?}",
            stiffness
        )))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::planar_arm;
    use crate::jacobian::JacobianBuilder;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn run(obj: &mut CartesianImpedance, model: &KinematicModel) -> Accumulators {
        let mut builder = JacobianBuilder::default();
        let chains: Vec<ChainId> = obj.active_chain().into_iter().collect();
        let jac = builder.build(model, &chains).unwrap();
        let ctx = CycleContext {
            model,
            jacobian: jac,
            env_map: None,
            cycle_period_s: 0.02,
        };
        let mut acc = Accumulators::new(model.num_joints());
        obj.apply(&ctx, &mut acc);
        acc
    }

    fn goal(x: f64, y: f64, yaw: f64) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(x, y, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        )
    }

    #[test]
    fn test_position_error_torque() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let mut obj = CartesianImpedance::new("tool", "base", [100.0, 100.0, 100.0, 0.0, 0.0, 0.0]);
        obj.initialize(&mut model).unwrap();

        // No goal, no torque
        let acc = run(&mut obj, &model);
        assert_eq!(obj.status(), ImpedanceStatus::Idle);
        assert_eq!(acc.tau_primary.norm(), 0.0);

        obj.set_goal(goal(1.9, 0.1, 0.0));
        let acc = run(&mut obj, &model);

        // Force (-10, 10, 0) at the tip (2, 0, 0)
        assert_eq!(obj.status(), ImpedanceStatus::Active);
        assert_relative_eq!(acc.tau_primary[0], 20.0, epsilon = 1e-9);
        assert_relative_eq!(acc.tau_primary[1], 10.0, epsilon = 1e-9);
        assert_relative_eq!(obj.cost(), 30.0, epsilon = 1e-9);
        assert_eq!(acc.tau_secondary.norm(), 0.0);
        assert_eq!(acc.wrenches.len(), 1);
        assert_relative_eq!(
            acc.wrenches[0].force(),
            Vector3::new(-10.0, 10.0, 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_orientation_error_torque() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let mut obj = CartesianImpedance::new("tool", "base", [0.0, 0.0, 0.0, 10.0, 10.0, 10.0]);
        obj.initialize(&mut model).unwrap();

        obj.set_goal(goal(2.0, 0.0, 0.1));
        let acc = run(&mut obj, &model);

        assert_relative_eq!(obj.error()[5], 0.1, epsilon = 1e-9);
        assert_relative_eq!(acc.tau_primary[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(acc.tau_primary[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tolerance_and_convergence() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let mut obj = CartesianImpedance::new("tool", "base", [100.0; 6]);
        obj.initialize(&mut model).unwrap();

        obj.set_position_tolerance(PositionTolerance::Box {
            half_extents_m: [0.05, 0.05, 0.05],
        });
        obj.set_orientation_tolerance(0.1, 0.1, 0.1);
        obj.set_goal(goal(2.02, -0.03, 0.05));

        let acc = run(&mut obj, &model);
        assert_eq!(obj.status(), ImpedanceStatus::Converged);
        assert_eq!(acc.tau_primary.norm(), 0.0);

        obj.set_position_tolerance(PositionTolerance::Sphere { radius_m: 0.01 });
        run(&mut obj, &model);
        assert_eq!(obj.status(), ImpedanceStatus::Active);
        // Only the position error survives
        assert_eq!(obj.error()[5], 0.0);

        obj.cancel_goal();
        run(&mut obj, &model);
        assert_eq!(obj.status(), ImpedanceStatus::Idle);
    }

    #[test]
    fn test_force_saturation() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let mut obj =
            CartesianImpedance::new("tool", "base", [100.0, 100.0, 100.0, 0.0, 0.0, 0.0])
                .with_max_force(5.0);
        obj.initialize(&mut model).unwrap();

        obj.set_goal(goal(1.9, 0.1, 0.0));
        let acc = run(&mut obj, &model);

        assert_relative_eq!(acc.wrenches[0].force().norm(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_configuration() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();

        let mut obj = CartesianImpedance::new("gripper", "base", [1.0; 6]);
        assert!(matches!(
            obj.initialize(&mut model),
            Err(ObjectiveError::Kinematics(_))
        ));

        let mut obj = CartesianImpedance::new("tool", "base", [1.0; 6]);
        assert!(obj.set_impedance([1.0, -1.0, 1.0, 1.0, 1.0, 1.0]).is_err());
        assert!(obj.set_impedance([2.0; 6]).is_ok());
    }
}
