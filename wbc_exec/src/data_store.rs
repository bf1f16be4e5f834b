//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use crate::{
    cycle::CycleManager,
    kinematics::JointMeasurement,
    wbc::{self, WholeBodyController},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Session elapsed time at the start of the cycle
    pub elapsed_s: f64,

    // WholeBodyController
    pub wbc: WholeBodyController,
    pub wbc_input: wbc::InputData,
    pub wbc_output: Option<wbc::OutputData>,
    pub wbc_status_rpt: wbc::StatusReport,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears the controller input and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_mgr: &CycleManager) {
        self.is_1_hz_cycle = cycle_mgr.is_1_hz_cycle();

        self.wbc_input = wbc::InputData::default();
        self.wbc_status_rpt = wbc::StatusReport::default();

        self.elapsed_s = util::session::get_elapsed_seconds();
    }

    /// Joint state fed back from the previous cycle's references, standing
    /// in for real drivers.
    ///
    /// Joints with no previous output take their position from `initial`.
    pub fn loopback_feedback(&self, initial: &HashMap<String, f64>) -> Vec<JointMeasurement> {
        match self.wbc_output {
            Some(ref o) => o
                .joint_names
                .iter()
                .zip(o.q_ref.iter().zip(o.qdot_ref.iter()))
                .map(|(name, (q, qdot))| JointMeasurement {
                    name: name.clone(),
                    position: *q,
                    velocity: *qdot,
                })
                .collect(),
            None => initial
                .iter()
                .map(|(name, q)| JointMeasurement {
                    name: name.clone(),
                    position: *q,
                    velocity: 0.0,
                })
                .collect(),
        }
    }
}
