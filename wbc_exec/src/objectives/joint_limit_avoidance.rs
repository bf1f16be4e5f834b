//! Joint limit avoidance objective
//!
//! Pushes each joint back toward the centre of its range once it leaves the
//! configured central workspace fraction.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
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

/// Parameters for joint limit avoidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointLimitParams {
    /// Gain used for joints without an override.
    #[serde(default = "default_gain")]
    pub default_gain: f64,

    /// Fraction of each joint's range, centred on the middle of the range,
    /// in which no torque is applied. Must be in `(0, 1]`.
    #[serde(default = "default_workspace")]
    pub default_workspace: f64,

    /// Per joint overrides keyed by joint name.
    #[serde(default)]
    pub joints: HashMap<String, JointLimitJointParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JointLimitJointParams {
    pub gain: Option<f64>,
    pub workspace: Option<f64>,
}

/// Joint limit avoidance objective.
#[derive(Debug, Clone)]
pub struct JointLimitAvoidance {
    params: JointLimitParams,

    k: Vec<f64>,

    /// Units: radians or meters
    q_min_threshold: Vec<f64>,

    /// Units: radians or meters
    q_max_threshold: Vec<f64>,

    cost: f64,

    initialised: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for JointLimitParams {
    fn default() -> Self {
        Self {
            default_gain: default_gain(),
            default_workspace: default_workspace(),
            joints: HashMap::new(),
        }
    }
}

impl JointLimitAvoidance {
    pub fn new(params: JointLimitParams) -> Self {
        Self {
            params,
            k: Vec::new(),
            q_min_threshold: Vec::new(),
            q_max_threshold: Vec::new(),
            cost: 0.0,
            initialised: false,
        }
    }

    /// Lower and upper thresholds of a joint.
    pub fn thresholds(&self, index: usize) -> Option<(f64, f64)> {
        Some((
            *self.q_min_threshold.get(index)?,
            *self.q_max_threshold.get(index)?,
        ))
    }

    /// Stiffness of a joint, the configured gain scaled by the inverse
    /// square of the joint's range.
    pub fn stiffness(&self, index: usize) -> Option<f64> {
        self.k.get(index).copied()
    }
}

impl MotionObjective for JointLimitAvoidance {
    fn name(&self) -> &str {
        "joint_limit_avoidance"
    }

    fn kind(&self) -> ObjectiveKind {
        ObjectiveKind::JointLimitAvoidance
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

        let q_min = model.q_min();
        let q_max = model.q_max();
        let n = model.num_joints();

        self.k = Vec::with_capacity(n);
        self.q_min_threshold = Vec::with_capacity(n);
        self.q_max_threshold = Vec::with_capacity(n);

        for (i, name) in model.joint_names().iter().enumerate() {
            let over = self.params.joints.get(name).cloned().unwrap_or_default();
            let gain = over.gain.unwrap_or(self.params.default_gain);
            let workspace = over.workspace.unwrap_or(self.params.default_workspace);

            check_positive(&format!("joint limit gain of {}", name), gain)?;
            if !(workspace > 0.0 && workspace <= 1.0) {
                return Err(ObjectiveError::InvalidParameter(format!(
                    "joint limit workspace of {} must be in (0, 1], found {}",
                    name, workspace
                )));
            }

            let range = q_max[i] - q_min[i];
            check_positive(&format!("range of {}", name), range)?;

            self.k.push(gain / (range * range));
            self.q_min_threshold.push(q_min[i] + 0.5 * (1.0 - workspace) * range);
            self.q_max_threshold.push(q_max[i] - 0.5 * (1.0 - workspace) * range);

            debug!(
                "JointLimitAvoidance {}: thresholds [{:.4}, {:.4}], K = {:.4}",
                name, self.q_min_threshold[i], self.q_max_threshold[i], self.k[i]
            );
        }

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
            let d_tau = joint_limit_torque(
                q[i],
                self.q_min_threshold[i],
                self.q_max_threshold[i],
                self.k[i],
            );
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

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Corrective torque for one joint: zero between the thresholds, otherwise
/// proportional to how far the joint is past the threshold.
pub fn joint_limit_torque(q: f64, q_min_threshold: f64, q_max_threshold: f64, k: f64) -> f64 {
    if q < q_min_threshold {
        k * (q_min_threshold - q)
    } else if q > q_max_threshold {
        k * (q_max_threshold - q)
    } else {
        0.0
    }
}

fn default_gain() -> f64 {
    1.0
}

fn default_workspace() -> f64 {
    0.9
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
