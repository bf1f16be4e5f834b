//! Nullspace projection of secondary torques
//!
//! Secondary objectives must not disturb the Cartesian tasks. Their torques
//! are projected with `N = I - J⁺J`, computed from the right singular
//! vectors of the combined task Jacobian.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default relative tolerance below which singular values are treated as
/// zero.
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Projector onto the nullspace of a task Jacobian.
#[derive(Debug, Clone)]
pub struct NullspaceProjector {
    projector: DMatrix<f64>,

    /// Singular values below `tolerance * max_singular_value` are ignored.
    tolerance: f64,

    rank: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NullspaceProjector {
    /// Create an identity projector for `num_joints` joints.
    pub fn new(num_joints: usize, tolerance: f64) -> Self {
        Self {
            projector: DMatrix::identity(num_joints, num_joints),
            tolerance,
            rank: 0,
        }
    }

    /// Recompute the projector from the task Jacobian.
    ///
    /// An empty or all zero Jacobian gives the identity.
    pub fn update(&mut self, jacobian: &DMatrix<f64>) {
        let n = self.projector.nrows();
        self.projector.fill_with_identity();
        self.rank = 0;

        if jacobian.nrows() == 0 || jacobian.ncols() != n || jacobian.amax() == 0.0 {
            return;
        }

        let svd = jacobian.clone().svd(false, true);
        let v_t = match svd.v_t {
            Some(v) => v,
            None => return,
        };

        let sigma_max = svd.singular_values.max();
        let threshold = self.tolerance * sigma_max;

        for (i, sigma) in svd.singular_values.iter().enumerate() {
            if *sigma > threshold {
                let v = v_t.row(i).transpose();
                self.projector -= &v * v.transpose();
                self.rank += 1;
            }
        }

        trace!("Nullspace projector updated, task rank {}", self.rank);
    }

    pub fn projector(&self) -> &DMatrix<f64> {
        &self.projector
    }

    /// Project a joint torque into the nullspace.
    pub fn project(&self, tau: &DVector<f64>) -> DVector<f64> {
        &self.projector * tau
    }

    /// Rank of the last task Jacobian.
    pub fn rank(&self) -> usize {
        self.rank
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
