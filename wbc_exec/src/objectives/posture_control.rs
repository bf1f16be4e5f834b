//! Posture control objective
//!
//! A weak spring on every joint pulling it toward a target posture, which
//! keeps the redundant degrees of freedom from drifting.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;

// Internal
use super::{
    check_positive, Accumulators, CycleContext, MotionObjective, ObjectiveError, ObjectiveKind,
    Priority,
};
use crate::kinematics::KinematicModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for posture control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostureParams {
    /// Gain used for joints without an override.
    #[serde(default = "default_gain")]
    pub default_gain: f64,

    /// Per joint overrides keyed by joint name.
    #[serde(default)]
    pub joints: HashMap<String, PostureJointParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostureJointParams {
    pub gain: Option<f64>,

    /// Default target position. The middle of the joint's range if not
    /// given.
    ///
    /// Units: radians or meters
    pub target: Option<f64>,
}

/// Posture control objective.
#[derive(Debug, Clone)]
pub struct PostureControl {
    params: PostureParams,

    index: HashMap<String, usize>,

    k: Vec<f64>,

    q0: Vec<f64>,

    q0_default: Vec<f64>,

    q_min: Vec<f64>,

    q_max: Vec<f64>,

    cost: f64,

    initialised: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PostureParams {
    fn default() -> Self {
        Self {
            default_gain: default_gain(),
            joints: HashMap::new(),
        }
    }
}

impl PostureControl {
    pub fn new(params: PostureParams) -> Self {
        Self {
            params,
            index: HashMap::new(),
            k: Vec::new(),
            q0: Vec::new(),
            q0_default: Vec::new(),
            q_min: Vec::new(),
            q_max: Vec::new(),
            cost: 0.0,
            initialised: false,
        }
    }

    /// Set the target position of a joint.
    ///
    /// Unknown joints and targets outside the joint's limits are rejected and
    /// leave the current target unchanged.
    pub fn set_joint_target(&mut self, joint: &str, value: f64) -> Result<(), ObjectiveError> {
        if !self.initialised {
            return Err(ObjectiveError::NotInitialised);
        }

        let i = *self
            .index
            .get(joint)
            .ok_or_else(|| ObjectiveError::UnknownJoint(joint.into()))?;

        if !(value >= self.q_min[i] && value <= self.q_max[i]) {
            return Err(ObjectiveError::TargetOutOfBounds {
                joint: joint.into(),
                value,
                min: self.q_min[i],
                max: self.q_max[i],
            });
        }

        info!("Posture target of {} set to {:.4}", joint, value);
        self.q0[i] = value;

        Ok(())
    }

    /// Current target of a joint.
    pub fn joint_target(&self, joint: &str) -> Option<f64> {
        self.index.get(joint).map(|i| self.q0[*i])
    }

    /// Restore every target to its configured default.
    pub fn reset_targets(&mut self) {
        self.q0.clone_from(&self.q0_default);
    }
}

impl MotionObjective for PostureControl {
    fn name(&self) -> &str {
        "posture_control"
    }

    fn kind(&self) -> ObjectiveKind {
        ObjectiveKind::PostureControl
    }

    fn priority(&self) -> Priority {
        Priority::Secondary
    }

    fn initialize(&mut self, model: &mut KinematicModel) -> Result<(), ObjectiveError> {
        for name in self.params.joints.keys() {
            if model.state().index_of(name).is_none() {
                return Err(ObjectiveError::UnknownJoint(name.clone()));
            }
        }

        self.index = model.joint_name_to_index().clone();
        self.q_min = model.q_min().iter().copied().collect();
        self.q_max = model.q_max().iter().copied().collect();
        self.k.clear();
        self.q0_default.clear();

        for (i, name) in model.joint_names().iter().enumerate() {
            let over = self.params.joints.get(name).cloned().unwrap_or_default();
            let gain = over.gain.unwrap_or(self.params.default_gain);
            let range = self.q_max[i] - self.q_min[i];

            check_positive(&format!("posture gain of {}", name), gain)?;
            check_positive(&format!("range of {}", name), range)?;

            let target = over
                .target
                .unwrap_or(0.5 * (self.q_min[i] + self.q_max[i]));
            if !(target >= self.q_min[i] && target <= self.q_max[i]) {
                return Err(ObjectiveError::TargetOutOfBounds {
                    joint: name.clone(),
                    value: target,
                    min: self.q_min[i],
                    max: self.q_max[i],
                });
            }

            self.k.push(gain / (range * range));
            self.q0_default.push(target);

            debug!(
                "PostureControl {}: target {:.4}, K = {:.4}",
                name, target, self.k[i]
            );
        }

        self.q0 = self.q0_default.clone();
        self.initialised = true;

        Ok(())
    }

    fn apply(&mut self, ctx: &CycleContext, acc: &mut Accumulators) {
        self.cost = 0.0;

        if !self.initialised {
            return;
        }

        let q = ctx.model.state().positions();

        for i in 0..self.k.len() {
            let d_tau = self.k[i] * (self.q0[i] - q[i]);
            acc.tau_secondary[i] += d_tau;
            self.cost += d_tau.abs();
        }
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

fn default_gain() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::planar_arm;
    use crate::jacobian::TaskJacobian;
    use crate::kinematics::JointMeasurement;
    use approx::assert_relative_eq;

    fn initialised() -> (PostureControl, KinematicModel) {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let mut params = PostureParams {
            default_gain: 36.0,
            ..Default::default()
        };
        params.joints.insert(
            "elbow".into(),
            PostureJointParams {
                gain: None,
                target: Some(1.0),
            },
        );

        let mut obj = PostureControl::new(params);
        obj.initialize(&mut model).unwrap();

        (obj, model)
    }

    #[test]
    fn test_targets() {
        let (mut obj, _) = initialised();

        // Midpoint by default, configured otherwise
        assert_eq!(obj.joint_target("shoulder"), Some(0.0));
        assert_eq!(obj.joint_target("elbow"), Some(1.0));
        assert_eq!(obj.joint_target("wrist"), None);

        obj.set_joint_target("shoulder", 2.0).unwrap();
        assert_eq!(obj.joint_target("shoulder"), Some(2.0));

        obj.reset_targets();
        assert_eq!(obj.joint_target("shoulder"), Some(0.0));
    }

    #[test]
    fn test_set_target_rejections() {
        let (mut obj, _) = initialised();

        assert!(matches!(
            obj.set_joint_target("elbow", 3.5),
            Err(ObjectiveError::TargetOutOfBounds { .. })
        ));
        assert!(matches!(
            obj.set_joint_target("elbow", f64::NAN),
            Err(ObjectiveError::TargetOutOfBounds { .. })
        ));
        assert_eq!(obj.joint_target("elbow"), Some(1.0));

        assert_eq!(
            obj.set_joint_target("wrist", 0.0),
            Err(ObjectiveError::UnknownJoint("wrist".into()))
        );

        let mut fresh = PostureControl::new(PostureParams::default());
        assert_eq!(
            fresh.set_joint_target("elbow", 0.0),
            Err(ObjectiveError::NotInitialised)
        );
    }

    #[test]
    fn test_torque() {
        let (mut obj, mut model) = initialised();
        model
            .update(&[JointMeasurement {
                name: "shoulder".into(),
                position: 0.5,
                velocity: 0.0,
            }])
            .unwrap();

        let jac = TaskJacobian::default();
        let ctx = CycleContext {
            model: &model,
            jacobian: &jac,
            env_map: None,
            cycle_period_s: 0.02,
        };
        let mut acc = Accumulators::new(2);
        obj.apply(&ctx, &mut acc);

        // K = 36 / 6^2 = 1
        assert_relative_eq!(acc.tau_secondary[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(acc.tau_secondary[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(obj.cost(), 1.5, epsilon = 1e-12);
    }
}
