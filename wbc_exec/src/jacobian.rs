//! Jacobian construction
//!
//! The combined task Jacobian stacks six rows per active chain (linear rows
//! first, then angular rows) over the full joint vector. Every twist is
//! expressed in the world frame with the chain's tip link origin as the
//! reference point.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, Point3};

// Internal
use crate::kinematics::{ChainId, JointKind, KinematicModel, KinematicsError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of task space rows per chain.
pub const TASK_DIM: usize = 6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Combined Jacobian of a set of chains.
#[derive(Debug, Clone)]
pub struct TaskJacobian {
    matrix: DMatrix<f64>,

    /// Row offset of each chain in `matrix`.
    chain_rows: Vec<(ChainId, usize)>,

    /// Sorted union of the joint columns referenced by any chain.
    active_columns: Vec<usize>,
}

/// Builds the combined Jacobian each cycle.
#[derive(Debug, Clone, Default)]
pub struct JacobianBuilder {
    jacobian: TaskJacobian,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TaskJacobian {
    fn default() -> Self {
        Self {
            matrix: DMatrix::zeros(0, 0),
            chain_rows: Vec::new(),
            active_columns: Vec::new(),
        }
    }
}

impl TaskJacobian {
    /// The full stacked matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Row offset of the given chain, if it is part of this Jacobian.
    pub fn chain_row(&self, chain: ChainId) -> Option<usize> {
        self.chain_rows
            .iter()
            .find(|(id, _)| *id == chain)
            .map(|(_, row)| *row)
    }

    /// The six rows belonging to a chain.
    pub fn chain_block(&self, chain: ChainId) -> Option<DMatrix<f64>> {
        self.chain_row(chain)
            .map(|row| self.matrix.rows(row, TASK_DIM).into_owned())
    }

    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chain_rows.iter().map(|(id, _)| *id)
    }

    pub fn active_columns(&self) -> &[usize] {
        &self.active_columns
    }

    pub fn num_chains(&self) -> usize {
        self.chain_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain_rows.is_empty()
    }
}

impl JacobianBuilder {
    /// Assemble the combined Jacobian for the given chains.
    ///
    /// Duplicate chain ids are only stacked once. Columns of joints not on
    /// any chain are zero.
    pub fn build(
        &mut self,
        model: &KinematicModel,
        chains: &[ChainId],
    ) -> Result<&TaskJacobian, KinematicsError> {
        let mut unique: Vec<ChainId> = Vec::with_capacity(chains.len());
        for id in chains {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let num_joints = model.num_joints();
        let mut matrix = DMatrix::zeros(TASK_DIM * unique.len(), num_joints);
        let mut chain_rows = Vec::with_capacity(unique.len());
        let mut referenced = vec![false; num_joints];

        for (i, id) in unique.iter().enumerate() {
            let chain = model
                .chain_info(*id)
                .ok_or(KinematicsError::UnknownChain(*id))?;
            let row = i * TASK_DIM;
            let tip = Point3::from(model.link_pose(chain.tip_link).translation.vector);

            fill_columns(model, &chain.joints, &tip, &mut matrix, row);

            for j in chain.joints.iter() {
                if let Some(col) = model.joints()[*j].index {
                    referenced[col] = true;
                }
            }

            chain_rows.push((*id, row));
        }

        self.jacobian = TaskJacobian {
            matrix,
            chain_rows,
            active_columns: referenced
                .iter()
                .enumerate()
                .filter(|(_, r)| **r)
                .map(|(i, _)| i)
                .collect(),
        };

        Ok(&self.jacobian)
    }

    /// The most recently built Jacobian.
    pub fn jacobian(&self) -> &TaskJacobian {
        &self.jacobian
    }

    /// 6xN Jacobian of a point rigidly attached to `link`, given in the world
    /// frame.
    pub fn point_jacobian(
        model: &KinematicModel,
        link: usize,
        point: &Point3<f64>,
    ) -> DMatrix<f64> {
        point_jacobian(model, link, point)
    }
}

/// 6xN Jacobian of a point rigidly attached to `link`, given in the world
/// frame. Every joint between the root and `link` contributes.
pub fn point_jacobian(model: &KinematicModel, link: usize, point: &Point3<f64>) -> DMatrix<f64> {
    let mut matrix = DMatrix::zeros(TASK_DIM, model.num_joints());
    fill_columns(model, &model.ancestor_joints(link), point, &mut matrix, 0);
    matrix
}

/// Write the columns of the movable joints in `joints` into the six rows
/// starting at `row`.
fn fill_columns(
    model: &KinematicModel,
    joints: &[usize],
    point: &Point3<f64>,
    matrix: &mut DMatrix<f64>,
    row: usize,
) {
    for &j in joints {
        let joint = &model.joints()[j];
        let col = match joint.index {
            Some(c) => c,
            None => continue,
        };
        let (origin, axis) = model.joint_axis_world(j);

        match joint.kind {
            JointKind::Revolute => {
                let lin = axis.cross(&(point - origin));
                matrix.fixed_view_mut::<3, 1>(row, col).copy_from(&lin);
                matrix.fixed_view_mut::<3, 1>(row + 3, col).copy_from(&axis);
            }
            JointKind::Prismatic => {
                matrix.fixed_view_mut::<3, 1>(row, col).copy_from(&axis);
            }
            JointKind::Fixed => (),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
