//! Admittance stage turning joint torques into velocity and position
//! references
//!
//! Each joint behaves as a virtual mass-damper `m q̈ + d q̇ = τ`, discretised
//! exactly over one cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the admittance stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittanceParams {
    /// Virtual mass (or inertia) of joints without an override.
    ///
    /// Units: kg or kg m^2
    #[serde(default = "default_mass")]
    pub default_mass: f64,

    /// Virtual damping of joints without an override.
    ///
    /// Units: Ns/m or Nms/rad
    #[serde(default = "default_damping")]
    pub default_damping: f64,

    /// Per joint overrides keyed by joint name.
    #[serde(default)]
    pub joints: HashMap<String, AdmittanceJointParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmittanceJointParams {
    pub mass: Option<f64>,

    pub damping: Option<f64>,
}

/// Mass-damper integrator over the full joint vector.
#[derive(Debug, Clone)]
pub struct AdmittanceController {
    /// Per joint damping.
    damping: Vec<f64>,

    /// Per joint velocity decay over one cycle, `exp(-d Ts / m)`.
    decay: Vec<f64>,

    q_min: Vec<f64>,

    q_max: Vec<f64>,

    /// Units: seconds
    cycle_period_s: f64,

    q_ref: DVector<f64>,

    qdot_ref: DVector<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmittanceError {
    #[error("Admittance parameters given for unknown joint {0:?}")]
    UnknownJoint(String),

    #[error("Invalid admittance parameter: {0}")]
    InvalidParameter(String),

    #[error("Expected {expected} joint values but found {found}")]
    SizeMismatch { expected: usize, found: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for AdmittanceParams {
    fn default() -> Self {
        Self {
            default_mass: default_mass(),
            default_damping: default_damping(),
            joints: HashMap::new(),
        }
    }
}

impl AdmittanceController {
    /// Create the stage for the given joints and limits.
    pub fn new(
        params: &AdmittanceParams,
        joint_names: &[String],
        q_min: &DVector<f64>,
        q_max: &DVector<f64>,
        cycle_period_s: f64,
    ) -> Result<Self, AdmittanceError> {
        let n = joint_names.len();
        for len in [q_min.len(), q_max.len()] {
            if len != n {
                return Err(AdmittanceError::SizeMismatch {
                    expected: n,
                    found: len,
                });
            }
        }

        if !(cycle_period_s.is_finite() && cycle_period_s > 0.0) {
            return Err(AdmittanceError::InvalidParameter(format!(
                "cycle period must be positive, found {}",
                cycle_period_s
            )));
        }

        for name in params.joints.keys() {
            if !joint_names.contains(name) {
                return Err(AdmittanceError::UnknownJoint(name.clone()));
            }
        }

        let mut damping = Vec::with_capacity(n);
        let mut decay = Vec::with_capacity(n);

        for name in joint_names {
            let over = params.joints.get(name).cloned().unwrap_or_default();
            let m = over.mass.unwrap_or(params.default_mass);
            let d = over.damping.unwrap_or(params.default_damping);

            if !(m.is_finite() && m > 0.0 && d.is_finite() && d > 0.0) {
                return Err(AdmittanceError::InvalidParameter(format!(
                    "mass and damping of {} must be positive, found m = {}, d = {}",
                    name, m, d
                )));
            }

            debug!("Admittance {}: m = {}, d = {}", name, m, d);

            damping.push(d);
            decay.push((-d * cycle_period_s / m).exp());
        }

        Ok(Self {
            damping,
            decay,
            q_min: q_min.iter().copied().collect(),
            q_max: q_max.iter().copied().collect(),
            cycle_period_s,
            q_ref: q_min.zip_map(q_max, |lo, hi| clamp(0.0, lo, hi)),
            qdot_ref: DVector::zeros(n),
        })
    }

    /// Re-seed the integrator at position `q` with zero velocity.
    pub fn reset(&mut self, q: &DVector<f64>) {
        for i in 0..self.q_ref.len().min(q.len()) {
            self.q_ref[i] = clamp(q[i], self.q_min[i], self.q_max[i]);
        }
        self.qdot_ref.fill(0.0);
    }

    /// Advance the integrator by one cycle under torque `tau`, starting from
    /// the measured position `q_meas`.
    pub fn integrate(&mut self, tau: &DVector<f64>, q_meas: &DVector<f64>) {
        for i in 0..self.q_ref.len() {
            let a = self.decay[i];
            let mut qdot = a * self.qdot_ref[i] + (1.0 - a) * tau[i] / self.damping[i];
            let mut q = q_meas[i] + qdot * self.cycle_period_s;

            if q > self.q_max[i] || q < self.q_min[i] {
                q = clamp(q, self.q_min[i], self.q_max[i]);
                qdot = 0.0;
            }

            self.q_ref[i] = q;
            self.qdot_ref[i] = qdot;
        }
    }

    /// Position references.
    ///
    /// Units: radians or meters
    pub fn q_ref(&self) -> &DVector<f64> {
        &self.q_ref
    }

    /// Velocity references.
    ///
    /// Units: radians/second or meters/second
    pub fn qdot_ref(&self) -> &DVector<f64> {
        &self.qdot_ref
    }
}

fn default_mass() -> f64 {
    1.0
}

fn default_damping() -> f64 {
    10.0
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn names() -> Vec<String> {
        vec!["shoulder".into(), "elbow".into()]
    }

    fn limits() -> (DVector<f64>, DVector<f64>) {
        (
            DVector::from_vec(vec![-1.0, -1.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        )
    }

    #[test]
    fn test_single_step() {
        let (lo, hi) = limits();
        let params = AdmittanceParams {
            default_mass: 2.0,
            default_damping: 4.0,
            ..Default::default()
        };
        let mut adm = AdmittanceController::new(&params, &names(), &lo, &hi, 0.02).unwrap();

        let q = DVector::from_vec(vec![0.1, 0.0]);
        adm.integrate(&DVector::from_vec(vec![1.0, -1.0]), &q);

        let a = (-4.0f64 * 0.02 / 2.0).exp();
        let qdot = (1.0 - a) * 0.25;
        assert_relative_eq!(adm.qdot_ref()[0], qdot, epsilon = 1e-12);
        assert_relative_eq!(adm.qdot_ref()[1], -qdot, epsilon = 1e-12);
        assert_relative_eq!(adm.q_ref()[0], 0.1 + qdot * 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_steady_state_velocity() {
        let (lo, hi) = limits();
        let params = AdmittanceParams {
            default_mass: 1.0,
            default_damping: 4.0,
            ..Default::default()
        };
        let mut adm = AdmittanceController::new(&params, &names(), &lo, &hi, 0.02).unwrap();

        let tau = DVector::from_vec(vec![2.0, -1.0]);
        let q = DVector::zeros(2);
        for _ in 0..1000 {
            adm.integrate(&tau, &q);
        }

        assert_relative_eq!(adm.qdot_ref()[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(adm.qdot_ref()[1], -0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_limit_clamp() {
        let (lo, hi) = limits();
        let mut adm =
            AdmittanceController::new(&AdmittanceParams::default(), &names(), &lo, &hi, 0.02)
                .unwrap();

        let q = DVector::from_vec(vec![1.0, -1.0]);
        adm.integrate(&DVector::from_vec(vec![100.0, -100.0]), &q);

        assert_eq!(adm.q_ref()[0], 1.0);
        assert_eq!(adm.q_ref()[1], -1.0);
        assert_eq!(adm.qdot_ref().norm(), 0.0);

        adm.reset(&DVector::from_vec(vec![5.0, 0.5]));
        assert_eq!(adm.q_ref()[0], 1.0);
        assert_eq!(adm.q_ref()[1], 0.5);
    }

    #[test]
    fn test_invalid_params() {
        let (lo, hi) = limits();

        let mut params = AdmittanceParams::default();
        params.joints.insert(
            "wrist".into(),
            AdmittanceJointParams {
                mass: Some(1.0),
                damping: None,
            },
        );
        assert_eq!(
            AdmittanceController::new(&params, &names(), &lo, &hi, 0.02).unwrap_err(),
            AdmittanceError::UnknownJoint("wrist".into())
        );

        let params = AdmittanceParams {
            default_damping: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            AdmittanceController::new(&params, &names(), &lo, &hi, 0.02),
            Err(AdmittanceError::InvalidParameter(_))
        ));
    }
}
