//! Closed loop tests of the whole body controller using the shipped parameter
//! files.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use nalgebra::{Point3, Vector3};
use std::path::PathBuf;
use std::sync::Arc;

// Internal
use util::module::State;
use wbc_lib::{
    data_store::DataStore,
    env_map::OccupancyMap,
    kinematics::RobotDescription,
    objectives::{CartesianImpedance, ImpedanceStatus, ObjectiveKind},
    params::WbcExecParams,
    wbc::{OutputMode, Params, WbcCmd, WbcProcError, WholeBodyController},
};

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

fn params_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../params")
}

fn load_exec_params() -> WbcExecParams {
    util::params::load_from_path(params_dir().join("wbc_exec.toml")).unwrap()
}

/// Build the controller the executable would run, without touching the
/// session or the software root.
fn build_controller() -> WholeBodyController {
    let params: Params = util::params::load_from_path(params_dir().join("wbc.toml")).unwrap();
    let desc: RobotDescription =
        util::params::load_from_path(params_dir().join(&params.robot_description)).unwrap();

    WholeBodyController::from_params(params, &desc).unwrap()
}

/// Run `n` looped back cycles, returning the data store.
fn run(ds: &mut DataStore, exec_params: &WbcExecParams, n: usize) {
    for _ in 0..n {
        ds.wbc_input.measurements = ds.loopback_feedback(&exec_params.initial_positions);
        let (o, r) = ds.wbc.proc(&ds.wbc_input).unwrap();
        ds.wbc_input.cmds.clear();
        ds.wbc_output = Some(o);
        ds.wbc_status_rpt = r;
    }
}

fn tool_position(wbc: &WholeBodyController) -> Vector3<f64> {
    let tool = wbc.model().link_id("tool").unwrap();
    wbc.model().link_pose(tool).translation.vector
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[test]
fn test_shipped_params_load() {
    let wbc = build_controller();

    assert_eq!(
        wbc.joint_names(),
        &["lift", "shoulder_yaw", "shoulder_pitch", "elbow", "wrist_pitch"]
    );
    assert_eq!(wbc.params().output_mode, OutputMode::Reference);

    let kinds: Vec<ObjectiveKind> = wbc
        .objective_handles()
        .into_iter()
        .filter_map(|h| wbc.objective(h).map(|o| o.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ObjectiveKind::JointLimitAvoidance,
            ObjectiveKind::PostureControl,
            ObjectiveKind::CollisionAvoidance
        ]
    );

    let exec_params = load_exec_params();
    assert_eq!(exec_params.goals.len(), 1);
    assert_eq!(exec_params.initial_positions["lift"], 0.1);
}

#[test]
fn test_goal_tracking() {
    let exec_params = load_exec_params();
    let goal = &exec_params.goals[0];

    let mut ds = DataStore {
        wbc: build_controller(),
        ..Default::default()
    };
    let handle = ds
        .wbc
        .add_motion_objective(Box::new(goal.to_objective()))
        .unwrap();

    // First cycle brings the model to the initial positions
    run(&mut ds, &exec_params, 1);
    let goal_pos = Vector3::from(goal.position_m);
    let initial_err = (goal_pos - tool_position(&ds.wbc)).norm();
    assert!(initial_err > 0.1);

    run(&mut ds, &exec_params, 250);
    let final_err = (goal_pos - tool_position(&ds.wbc)).norm();

    assert!(
        final_err < 0.5 * initial_err,
        "error went from {} to {}",
        initial_err,
        final_err
    );

    // References stay inside the joint limits
    let o = ds.wbc_output.as_ref().unwrap();
    let model = ds.wbc.model();
    for (i, q) in o.q_ref.iter().enumerate() {
        assert!(*q >= model.q_min()[i] && *q <= model.q_max()[i]);
    }

    // Nothing is near a collision on the way
    assert!(ds.wbc_status_rpt.min_self_distance_m.unwrap() > 0.0);
    assert!(ds.wbc_status_rpt.total_cost.is_finite());
    assert_eq!(ds.wbc_status_rpt.cartesian_status.len(), 1);
    assert_ne!(
        ds.wbc_status_rpt.cartesian_status[0].1,
        ImpedanceStatus::Idle
    );

    let ci = ds.wbc.objective_as::<CartesianImpedance>(handle).unwrap();
    assert_eq!(ci.tip_frame(), "tool");
    assert_eq!(ds.wbc.cartesian_impedances("tool", "base_link"), vec![handle]);
}

#[test]
fn test_obstacle_produces_repulsion() {
    let exec_params = load_exec_params();
    let mut ds = DataStore {
        wbc: build_controller(),
        ..Default::default()
    };

    run(&mut ds, &exec_params, 1);
    assert!(ds.wbc_status_rpt.min_env_distance_m.is_none());
    assert!(!ds.wbc_status_rpt.env_map_loaded);

    // A single voxel just in front of the wrist sphere
    let wrist = ds.wbc.model().link_id("wrist").unwrap();
    let sphere_centre = ds.wbc.model().link_pose(wrist) * Point3::new(0.0, 0.0, 0.05);
    let obstacle = sphere_centre + Vector3::new(0.1, 0.0, 0.0);
    let map = OccupancyMap::from_points(0.02, &[obstacle], Utc::now()).unwrap();

    ds.wbc_input.cmds.push(WbcCmd::SetEnvironmentMap(Some(Arc::new(map))));
    run(&mut ds, &exec_params, 1);

    assert!(ds.wbc_status_rpt.env_map_loaded);
    let d = ds.wbc_status_rpt.min_env_distance_m.unwrap();
    assert!(d < 0.1, "environment distance {}", d);

    // The sphere is pushed back, away from the obstacle
    let o = ds.wbc_output.as_ref().unwrap();
    let wrist_force = o
        .repulsive_forces
        .iter()
        .find(|f| f.frame_id == "wrist")
        .unwrap();
    assert!(wrist_force.direction.x < -0.9);
    assert!(wrist_force.magnitude > 0.0);

    // Removing the map removes the repulsion
    ds.wbc_input.cmds.push(WbcCmd::SetEnvironmentMap(None));
    run(&mut ds, &exec_params, 1);
    assert!(ds.wbc_status_rpt.min_env_distance_m.is_none());
    assert!(ds.wbc_output.as_ref().unwrap().repulsive_forces.is_empty());
}

#[test]
fn test_runtime_errors() {
    let mut wbc = build_controller();

    assert!(wbc.set_joint_target("no_such_joint", 0.0).is_err());
    assert!(wbc.set_joint_target("elbow", 0.3).is_ok());

    let bad_goal = CartesianImpedance::new("tool", "no_such_link", [1.0; 6]);
    assert!(wbc.add_motion_objective(Box::new(bad_goal)).is_err());

    let handles = wbc.objective_handles();
    let removed = wbc.remove_motion_objective(handles[0]).unwrap();
    assert_eq!(removed.kind(), ObjectiveKind::JointLimitAvoidance);
    assert!(matches!(
        wbc.remove_motion_objective(handles[0]),
        Err(WbcProcError::UnknownObjective(_))
    ));
}

#[test]
fn test_env_map_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "wbc_env_map_{}.json",
        std::process::id()
    ));

    let stamp = Utc::now();
    let points = [
        Point3::new(0.5, 0.0, 1.0),
        Point3::new(0.5, 0.1, 1.0),
        Point3::new(-0.3, 0.2, 0.05),
    ];
    let map = OccupancyMap::from_points(0.1, &points, stamp).unwrap();
    map.save(&path).unwrap();

    let loaded = OccupancyMap::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.resolution(), 0.1);
    assert_eq!(loaded.len(), 3);
    for p in points.iter() {
        assert!(loaded.is_occupied(p));
        assert_eq!(loaded.voxel(p).unwrap().stamp, stamp);
    }
    assert!(!loaded.is_occupied(&Point3::new(2.0, 2.0, 2.0)));
}
