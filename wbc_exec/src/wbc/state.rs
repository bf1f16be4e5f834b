//! Implementations for the WholeBodyController state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use nalgebra::DVector;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// Internal
use super::{OutputMode, Params, WbcInitError, WbcProcError};
use crate::admittance::AdmittanceController;
use crate::env_map::OccupancyMap;
use crate::jacobian::JacobianBuilder;
use crate::kinematics::{ChainId, JointMeasurement, KinematicModel, RobotDescription};
use crate::nullspace::NullspaceProjector;
use crate::objectives::{
    Accumulators, CartesianImpedance, CollisionAvoidance, CycleContext, ImpedanceStatus,
    JointLimitAvoidance, MotionObjective, ObjectiveError, ObjectiveHandle, ObjectiveKind,
    PostureControl, RepulsiveForce, Wrench,
};
use util::{module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Whole body controller module state
pub struct WholeBodyController {
    pub(crate) params: Params,

    model: KinematicModel,

    jacobian_builder: JacobianBuilder,

    /// Objectives ordered by handle, which is also the order they are
    /// applied in.
    objectives: BTreeMap<ObjectiveHandle, Box<dyn MotionObjective>>,

    next_handle: u64,

    nullspace: NullspaceProjector,

    admittance: Option<AdmittanceController>,

    env_map: Option<Arc<OccupancyMap>>,

    acc: Accumulators,

    pub(crate) report: StatusReport,
}

/// Input data to the whole body controller.
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// Joint state measured this cycle. Joints not listed keep their
    /// previous value.
    pub measurements: Vec<JointMeasurement>,

    /// Commands applied before this cycle's processing.
    pub cmds: Vec<WbcCmd>,
}

/// Output of one control cycle.
#[derive(Debug, Clone, Serialize)]
pub struct OutputData {
    pub joint_names: Vec<String>,

    /// Total joint torque, primary plus projected secondary.
    ///
    /// Units: newton meters or newtons
    pub tau: Vec<f64>,

    /// Units: radians/second or meters/second
    pub qdot_ref: Vec<f64>,

    /// Units: radians or meters
    pub q_ref: Vec<f64>,

    /// Which output the drivers should follow.
    pub mode: OutputMode,

    /// Wrenches produced by the objectives this cycle.
    pub wrenches: Vec<Wrench>,

    /// Repulsive forces produced by collision avoidance this cycle.
    pub repulsive_forces: Vec<RepulsiveForce>,
}

/// Status report for whole body controller processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Cost of each objective, in handle order.
    pub objective_costs: Vec<ObjectiveCost>,

    pub total_cost: f64,

    /// Number of chains in the combined task Jacobian.
    pub num_active_chains: usize,

    /// Rank of the combined task Jacobian.
    pub task_rank: usize,

    pub min_self_distance_m: Option<f64>,

    pub min_env_distance_m: Option<f64>,

    pub env_map_loaded: bool,

    /// Commands rejected at the start of this cycle.
    pub num_rejected_cmds: usize,

    /// Status of every Cartesian impedance, keyed by tip frame.
    pub cartesian_status: Vec<(String, ImpedanceStatus)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveCost {
    pub handle: ObjectiveHandle,

    pub name: String,

    pub kind: ObjectiveKind,

    pub cost: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Commands accepted by the controller between cycles.
#[derive(Debug, Clone)]
pub enum WbcCmd {
    /// Replace the environment map, or remove it with `None`.
    SetEnvironmentMap(Option<Arc<OccupancyMap>>),

    /// Set the posture target of a joint.
    SetJointTarget { joint: String, value: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for WholeBodyController {
    fn default() -> Self {
        Self {
            params: Params::default(),
            model: KinematicModel::default(),
            jacobian_builder: JacobianBuilder::default(),
            objectives: BTreeMap::new(),
            next_handle: 0,
            nullspace: NullspaceProjector::new(0, 0.0),
            admittance: None,
            env_map: None,
            acc: Accumulators::new(0),
            report: StatusReport::default(),
        }
    }
}

impl State for WholeBodyController {
    type InitData = &'static str;
    type InitError = WbcInitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = WbcProcError;

    /// Initialise the controller.
    ///
    /// Expected init data is the name of the parameter file. The robot
    /// description and environment map named in it are loaded from the same
    /// directory.
    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session,
    ) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data)?;
        let desc: RobotDescription = params::load(&params.robot_description)?;

        let env_map = match params.environment_map {
            Some(ref file) => {
                let path = params::param_file_path(file)?;
                let map = OccupancyMap::load(&path)?;
                info!("Loaded environment map with {} voxels from {:?}", map.len(), path);
                Some(Arc::new(map))
            }
            None => None,
        };

        *self = Self::from_params(params, &desc)?;
        self.env_map = env_map;

        info!(
            "WholeBodyController initialised for {:?} ({} joints), session at {:?}",
            self.model.name(),
            self.model.num_joints(),
            session.session_root
        );

        Ok(())
    }

    /// Perform one control cycle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let admittance = match self.admittance {
            Some(ref mut a) => a,
            None => return Err(WbcProcError::NotInitialised),
        };

        self.report = StatusReport::default();

        // Commands first, so they take effect on this cycle
        for cmd in input_data.cmds.iter() {
            let result = match cmd {
                WbcCmd::SetEnvironmentMap(map) => {
                    set_env_map(&mut self.env_map, map.clone());
                    Ok(())
                }
                WbcCmd::SetJointTarget { joint, value } => {
                    set_posture_target(&mut self.objectives, joint, *value)
                }
            };

            if let Err(e) = result {
                warn!("Rejected command {:?}: {}", cmd, e);
                self.report.num_rejected_cmds += 1;
            }
        }

        self.model.update(&input_data.measurements)?;

        // Combined Jacobian of every active chain and its nullspace
        let chains: Vec<ChainId> = self
            .objectives
            .values()
            .filter_map(|o| o.active_chain())
            .collect();
        let jacobian = self.jacobian_builder.build(&self.model, &chains)?;
        self.nullspace.update(jacobian.matrix());

        self.acc.clear();
        let ctx = CycleContext {
            model: &self.model,
            jacobian,
            env_map: self.env_map.as_ref(),
            cycle_period_s: self.params.cycle_period_s,
        };

        for obj in self.objectives.values_mut() {
            obj.apply(&ctx, &mut self.acc);
        }

        let tau = &self.acc.tau_primary + self.nullspace.project(&self.acc.tau_secondary);
        admittance.integrate(&tau, self.model.state().positions());

        trace!("WBC tau: {:?}", tau.as_slice());

        // Status
        for (handle, obj) in self.objectives.iter() {
            self.report.objective_costs.push(ObjectiveCost {
                handle: *handle,
                name: obj.name().into(),
                kind: obj.kind(),
                cost: obj.cost(),
            });
            self.report.total_cost += obj.cost();

            if let Some(ca) = obj.as_any().downcast_ref::<CollisionAvoidance>() {
                self.report.min_self_distance_m = ca.min_self_distance();
                self.report.min_env_distance_m = ca.min_environment_distance();
            }
            if let Some(ci) = obj.as_any().downcast_ref::<CartesianImpedance>() {
                self.report
                    .cartesian_status
                    .push((ci.tip_frame().into(), ci.status()));
            }
        }
        self.report.num_active_chains = self.jacobian_builder.jacobian().num_chains();
        self.report.task_rank = self.nullspace.rank();
        self.report.env_map_loaded = self.env_map.is_some();

        let output = OutputData {
            joint_names: self.model.joint_names().to_vec(),
            tau: tau.iter().copied().collect(),
            qdot_ref: admittance.qdot_ref().iter().copied().collect(),
            q_ref: admittance.q_ref().iter().copied().collect(),
            mode: self.params.output_mode,
            wrenches: self.acc.wrenches.clone(),
            repulsive_forces: self.acc.repulsive_forces.clone(),
        };

        Ok((output, self.report.clone()))
    }
}

impl WholeBodyController {
    /// Build a controller from loaded parameters and a robot description.
    ///
    /// The joint limit, posture and collision objectives are added according
    /// to the parameters.
    pub fn from_params(params: Params, desc: &RobotDescription) -> Result<Self, WbcInitError> {
        if !(params.cycle_period_s.is_finite() && params.cycle_period_s > 0.0) {
            return Err(WbcInitError::InvalidCyclePeriod(params.cycle_period_s));
        }

        let model = KinematicModel::from_description(desc)?;
        let n = model.num_joints();

        let mut admittance = AdmittanceController::new(
            &params.admittance,
            model.joint_names(),
            &model.q_min(),
            &model.q_max(),
            params.cycle_period_s,
        )?;
        admittance.reset(model.state().positions());

        let mut wbc = Self {
            nullspace: NullspaceProjector::new(n, params.nullspace_tolerance),
            admittance: Some(admittance),
            acc: Accumulators::new(n),
            model,
            ..Default::default()
        };

        if params.enable_joint_limit_avoidance {
            wbc.add_configured(Box::new(JointLimitAvoidance::new(
                params.joint_limit_avoidance.clone(),
            )))?;
        }

        if params.enable_posture_control {
            wbc.add_configured(Box::new(PostureControl::new(
                params.posture_control.clone(),
            )))?;
        }

        if params.enable_collision_avoidance {
            if desc.collision_bodies.is_empty() {
                warn!("Collision avoidance enabled but the description has no collision bodies");
            } else {
                wbc.add_configured(Box::new(CollisionAvoidance::new(
                    params.collision_avoidance,
                    desc,
                )))?;
            }
        }

        wbc.params = params;

        Ok(wbc)
    }

    fn add_configured(&mut self, objective: Box<dyn MotionObjective>) -> Result<(), WbcInitError> {
        let name = objective.name().to_string();
        self.insert_objective(objective)
            .map_err(|e| WbcInitError::ObjectiveInitError(name, e))?;
        Ok(())
    }

    /// Initialise an objective and start applying it from the next cycle.
    pub fn add_motion_objective(
        &mut self,
        objective: Box<dyn MotionObjective>,
    ) -> Result<ObjectiveHandle, WbcProcError> {
        if self.admittance.is_none() {
            return Err(WbcProcError::NotInitialised);
        }

        Ok(self.insert_objective(objective)?)
    }

    fn insert_objective(
        &mut self,
        mut objective: Box<dyn MotionObjective>,
    ) -> Result<ObjectiveHandle, ObjectiveError> {
        objective.initialize(&mut self.model)?;

        let handle = ObjectiveHandle(self.next_handle);
        self.next_handle += 1;

        info!(
            "Added {:?} objective {} as {}",
            objective.kind(),
            objective.name(),
            handle
        );
        self.objectives.insert(handle, objective);

        Ok(handle)
    }

    /// Stop applying an objective and hand it back to the caller.
    pub fn remove_motion_objective(
        &mut self,
        handle: ObjectiveHandle,
    ) -> Result<Box<dyn MotionObjective>, WbcProcError> {
        let objective = self
            .objectives
            .remove(&handle)
            .ok_or(WbcProcError::UnknownObjective(handle))?;

        info!("Removed objective {} ({})", handle, objective.name());

        Ok(objective)
    }

    pub fn objective(&self, handle: ObjectiveHandle) -> Option<&dyn MotionObjective> {
        self.objectives.get(&handle).map(|o| o.as_ref())
    }

    pub fn objective_mut(&mut self, handle: ObjectiveHandle) -> Option<&mut dyn MotionObjective> {
        self.objectives.get_mut(&handle).map(|o| o.as_mut())
    }

    /// Get an objective as its concrete type.
    pub fn objective_as<T: MotionObjective>(&self, handle: ObjectiveHandle) -> Option<&T> {
        self.objectives
            .get(&handle)
            .and_then(|o| o.as_any().downcast_ref::<T>())
    }

    /// Get an objective as its concrete type, mutably.
    pub fn objective_as_mut<T: MotionObjective>(
        &mut self,
        handle: ObjectiveHandle,
    ) -> Option<&mut T> {
        self.objectives
            .get_mut(&handle)
            .and_then(|o| o.as_any_mut().downcast_mut::<T>())
    }

    /// Handles of every objective, in application order.
    pub fn objective_handles(&self) -> Vec<ObjectiveHandle> {
        self.objectives.keys().copied().collect()
    }

    /// Handles of the Cartesian impedances acting on `tip` relative to
    /// `root`.
    pub fn cartesian_impedances(&self, tip: &str, root: &str) -> Vec<ObjectiveHandle> {
        self.objectives
            .iter()
            .filter_map(|(h, o)| {
                o.as_any()
                    .downcast_ref::<CartesianImpedance>()
                    .filter(|ci| ci.tip_frame() == tip && ci.root_frame() == root)
                    .map(|_| *h)
            })
            .collect()
    }

    pub fn set_environment_map(&mut self, map: Option<Arc<OccupancyMap>>) {
        set_env_map(&mut self.env_map, map);
    }

    pub fn environment_map(&self) -> Option<&Arc<OccupancyMap>> {
        self.env_map.as_ref()
    }

    /// Set the posture target of a joint.
    pub fn set_joint_target(&mut self, joint: &str, value: f64) -> Result<(), WbcProcError> {
        set_posture_target(&mut self.objectives, joint, value)
    }

    /// Sum of every objective's cost on the last cycle.
    pub fn cost(&self) -> f64 {
        self.objectives.values().map(|o| o.cost()).sum()
    }

    pub fn joint_names(&self) -> &[String] {
        self.model.joint_names()
    }

    pub fn joint_name_to_index(&self) -> &HashMap<String, usize> {
        self.model.joint_name_to_index()
    }

    pub fn model(&self) -> &KinematicModel {
        &self.model
    }

    /// Measured joint positions, in joint index order.
    pub fn joint_positions(&self) -> &DVector<f64> {
        self.model.state().positions()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

fn set_env_map(current: &mut Option<Arc<OccupancyMap>>, map: Option<Arc<OccupancyMap>>) {
    match map {
        Some(ref m) => info!(
            "Environment map set, {} voxels at {} m",
            m.len(),
            m.resolution()
        ),
        None => info!("Environment map removed"),
    }
    *current = map;
}

/// Set a joint target on the first posture control objective.
fn set_posture_target(
    objectives: &mut BTreeMap<ObjectiveHandle, Box<dyn MotionObjective>>,
    joint: &str,
    value: f64,
) -> Result<(), WbcProcError> {
    let posture = objectives
        .values_mut()
        .find_map(|o| o.as_any_mut().downcast_mut::<PostureControl>())
        .ok_or(WbcProcError::NoPostureControl)?;

    posture.set_joint_target(joint, value)?;
    debug!("Joint target {} = {}", joint, value);

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
