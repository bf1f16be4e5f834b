//! Collision avoidance objective
//!
//! Every cycle the closest distances between the robot's collision bodies,
//! and between those bodies and the environment map, are turned into
//! repulsive forces. Each force is mapped to joint torques through the
//! Jacobian of the link it acts on.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod force;
mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use nalgebra::{DVector, Isometry3, Point3, Unit, Vector3};
use std::any::Any;
use std::collections::{HashMap, HashSet};

// Internal
use super::{
    Accumulators, CollisionClass, CycleContext, MotionObjective, ObjectiveError, ObjectiveKind,
    Priority, RepulsiveForce, Wrench,
};
use crate::collision::{closest_points, ClosestPoints, CollisionModel, Shape};
use crate::env_map::{OccupancyMap, VoxelKey};
use crate::jacobian::point_jacobian;
use crate::kinematics::{KinematicModel, RobotDescription};

pub use force::*;
pub use params::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Repulsion from the robot's own bodies and from the environment.
#[derive(Debug, Clone)]
pub struct CollisionAvoidance {
    params: CollisionAvoidanceParams,

    description: RobotDescription,

    collision_model: CollisionModel,

    /// Last usable normal of each pair, used when the shapes overlap.
    last_normals: HashMap<PairKey, Unit<Vector3<f64>>>,

    /// Pairs queried this cycle. Only their normals are kept.
    seen_pairs: HashSet<PairKey>,

    min_self_distance_m: Option<f64>,

    min_env_distance_m: Option<f64>,

    cost: f64,

    initialised: bool,
}

/// Identifies the two sides of a distance query across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PairKey {
    /// Two bodies of the collision model.
    Bodies(usize, usize),

    /// A body and an occupied voxel.
    Voxel(usize, VoxelKey),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CollisionAvoidance {
    /// Create the objective for the collision bodies of `description`.
    pub fn new(params: CollisionAvoidanceParams, description: &RobotDescription) -> Self {
        Self {
            params,
            description: description.clone(),
            collision_model: CollisionModel::default(),
            last_normals: HashMap::new(),
            seen_pairs: HashSet::new(),
            min_self_distance_m: None,
            min_env_distance_m: None,
            cost: 0.0,
            initialised: false,
        }
    }

    pub fn params(&self) -> &CollisionAvoidanceParams {
        &self.params
    }

    pub fn collision_model(&self) -> &CollisionModel {
        &self.collision_model
    }

    /// Smallest self collision distance on the last cycle.
    pub fn min_self_distance(&self) -> Option<f64> {
        self.min_self_distance_m
    }

    /// Smallest environment distance on the last cycle, `None` if no voxel
    /// was near any body.
    pub fn min_environment_distance(&self) -> Option<f64> {
        self.min_env_distance_m
    }

    /// Distances between every active pair of bodies, two per pair.
    pub fn self_distances(&mut self, model: &KinematicModel) -> Vec<Distance> {
        let bodies = self.collision_model.bodies();
        let poses: Vec<Isometry3<f64>> = bodies.iter().map(|b| b.world_pose(model)).collect();

        let mut distances = Vec::with_capacity(2 * self.collision_model.active_pairs().len());

        for &(a, b) in self.collision_model.active_pairs() {
            let (body_a, body_b) = (&bodies[a], &bodies[b]);
            let cp = closest_points(&body_a.shape, &poses[a], &body_b.shape, &poses[b]);

            let normal = resolve_normal(
                &self.last_normals,
                PairKey::Bodies(a, b),
                &cp,
                &body_a.name,
                &body_b.name,
            );
            self.last_normals.insert(PairKey::Bodies(a, b), normal);
            self.seen_pairs.insert(PairKey::Bodies(a, b));

            trace!(
                "{} <-> {}: {:.4} m",
                body_a.name,
                body_b.name,
                cp.distance
            );

            distances.push(Distance {
                frame_id: body_a.link_name.clone(),
                body: a,
                point_on_body: cp.point_a,
                point_on_obstacle: cp.point_b,
                distance_m: cp.distance,
                normal,
            });
            distances.push(Distance {
                frame_id: body_b.link_name.clone(),
                body: b,
                point_on_body: cp.point_b,
                point_on_obstacle: cp.point_a,
                distance_m: cp.distance,
                normal: -normal,
            });
        }

        distances
    }

    /// Distances between each body and the occupied voxels near it.
    pub fn environment_distances(
        &mut self,
        model: &KinematicModel,
        map: &OccupancyMap,
    ) -> Vec<Distance> {
        let margin = if self.params.environment_collision.map_resolution_m > 0.0 {
            self.params.environment_collision.map_resolution_m
        } else {
            map.resolution()
        };
        let voxel = Shape::cuboid(map.voxel_half_extents());

        let mut distances = Vec::new();

        for (i, body) in self.collision_model.bodies().iter().enumerate() {
            let pose = body.world_pose(model);
            let (min, max) = find_outer_points(&body.shape, &pose, margin);

            for centre in map.occupied_in_bbx(&min, &max) {
                let voxel_pose = Isometry3::translation(centre.x, centre.y, centre.z);
                let cp = closest_points(&body.shape, &pose, &voxel, &voxel_pose);
                let key = PairKey::Voxel(i, map.key(&centre));

                let normal = resolve_normal(&self.last_normals, key, &cp, &body.name, "voxel");
                self.last_normals.insert(key, normal);
                self.seen_pairs.insert(key);

                distances.push(Distance {
                    frame_id: body.link_name.clone(),
                    body: i,
                    point_on_body: cp.point_a,
                    point_on_obstacle: cp.point_b,
                    distance_m: cp.distance,
                    normal,
                });
            }
        }

        distances
    }

    /// Map the forces to joint torques, pushing the wrenches and forces into
    /// the accumulators.
    fn apply_forces(
        &mut self,
        model: &KinematicModel,
        forces: Vec<RepulsiveForce>,
        acc: &mut Accumulators,
    ) {
        for force in forces {
            let link = match model.link_id(&force.frame_id) {
                Some(l) => l,
                None => continue,
            };
            let origin = Point3::from(model.link_pose(link).translation.vector);
            let wrench = calculate_wrench(&force, &origin);

            let tau = point_jacobian(model, link, &origin)
                .tr_mul(&DVector::from_column_slice(wrench.as_slice()));

            acc.tau_primary += &tau;
            self.cost += tau.iter().map(|t| t.abs()).sum::<f64>();

            acc.wrenches.push(Wrench {
                frame_id: force.frame_id.clone(),
                wrench,
            });
            acc.repulsive_forces.push(force);
        }
    }
}

impl MotionObjective for CollisionAvoidance {
    fn name(&self) -> &str {
        "collision_avoidance"
    }

    fn kind(&self) -> ObjectiveKind {
        ObjectiveKind::CollisionAvoidance
    }

    fn priority(&self) -> Priority {
        Priority::Primary
    }

    fn initialize(&mut self, model: &mut KinematicModel) -> Result<(), ObjectiveError> {
        self.params.self_collision.validate("self_collision")?;
        self.params
            .environment_collision
            .validate("environment_collision")?;

        self.collision_model = CollisionModel::from_description(&self.description, model)?;
        self.last_normals.clear();
        self.seen_pairs.clear();
        self.initialised = true;

        Ok(())
    }

    fn apply(&mut self, ctx: &CycleContext, acc: &mut Accumulators) {
        self.cost = 0.0;

        if !self.initialised {
            return;
        }

        self.seen_pairs.clear();

        let self_dists = pick_minimum(self.self_distances(ctx.model));
        self.min_self_distance_m = min_distance(&self_dists);
        let self_forces = calculate_repulsive_forces(
            &self_dists,
            &self.params.self_collision,
            CollisionClass::SelfCollision,
        );

        let env_dists = match ctx.env_map {
            Some(map) => pick_minimum(self.environment_distances(ctx.model, map)),
            None => Vec::new(),
        };
        self.min_env_distance_m = min_distance(&env_dists);
        let env_forces = calculate_repulsive_forces(
            &env_dists,
            &self.params.environment_collision,
            CollisionClass::Environment,
        );

        self.apply_forces(ctx.model, self_forces, acc);
        self.apply_forces(ctx.model, env_forces, acc);

        self.prune_normals();
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

impl CollisionAvoidance {
    /// Forget the normals of pairs which were not queried this cycle.
    fn prune_normals(&mut self) {
        let seen = &self.seen_pairs;
        self.last_normals.retain(|key, _| seen.contains(key));
    }
}

/// Direction of a query result, falling back to the pair's last direction,
/// or +Z, when the shapes overlap and no direction was found.
fn resolve_normal(
    history: &HashMap<PairKey, Unit<Vector3<f64>>>,
    key: PairKey,
    cp: &ClosestPoints,
    name_a: &str,
    name_b: &str,
) -> Unit<Vector3<f64>> {
    match cp.normal {
        Some(n) => n,
        None => {
            let fallback = history.get(&key).copied().unwrap_or_else(Vector3::z_axis);
            warn!(
                "{} and {} overlap ({:.4} m), using direction {:?}",
                name_a,
                name_b,
                cp.distance,
                fallback.as_slice()
            );
            fallback
        }
    }
}

fn min_distance(distances: &[Distance]) -> Option<f64> {
    distances
        .iter()
        .map(|d| d.distance_m)
        .fold(None, |acc, d| match acc {
            Some(m) if m <= d => Some(m),
            _ => Some(d),
        })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::planar_arm_with_bodies;
    use crate::jacobian::TaskJacobian;
    use crate::kinematics::JointMeasurement;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use std::sync::Arc;

    fn params(self_threshold: f64, env_threshold: f64) -> CollisionAvoidanceParams {
        CollisionAvoidanceParams {
            self_collision: CollisionClassParams {
                f_max: 10.0,
                d_threshold_m: self_threshold,
                order: 1,
                map_resolution_m: 0.0,
            },
            environment_collision: CollisionClassParams {
                f_max: 10.0,
                d_threshold_m: env_threshold,
                order: 1,
                map_resolution_m: 0.0,
            },
        }
    }

    fn run(
        obj: &mut CollisionAvoidance,
        model: &KinematicModel,
        map: Option<&Arc<OccupancyMap>>,
    ) -> Accumulators {
        let jac = TaskJacobian::default();
        let ctx = CycleContext {
            model,
            jacobian: &jac,
            env_map: map,
            cycle_period_s: 0.02,
        };
        let mut acc = Accumulators::new(model.num_joints());
        obj.apply(&ctx, &mut acc);
        acc
    }

    fn force<'a>(acc: &'a Accumulators, frame: &str) -> &'a RepulsiveForce {
        acc.repulsive_forces
            .iter()
            .find(|f| f.frame_id == frame)
            .unwrap()
    }

    #[test]
    fn test_self_collision_forces() {
        let desc = planar_arm_with_bodies();
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut obj = CollisionAvoidance::new(params(1.0, 0.1), &desc);
        obj.initialize(&mut model).unwrap();

        // Fold the arm back over the base
        model
            .update(&[JointMeasurement {
                name: "elbow".into(),
                position: 3.0,
                velocity: 0.0,
            }])
            .unwrap();

        let acc = run(&mut obj, &model, None);

        // One force per frame: base, lower and tool
        assert_eq!(acc.repulsive_forces.len(), 3);
        assert_eq!(acc.wrenches.len(), 3);

        // The tool sphere overlaps the top of the base box
        let tool = force(&acc, "tool");
        assert_eq!(tool.magnitude, 10.0);
        assert_relative_eq!(tool.direction.y, 1.0, epsilon = 1e-6);

        // The lower sphere sits beside the box
        let lower = force(&acc, "lower");
        let d = 1.0 + 0.5 * 3.0f64.cos() - 0.1 - 0.1;
        assert_relative_eq!(lower.distance_m, d, epsilon = 1e-6);
        assert_relative_eq!(lower.magnitude, 10.0 * (1.0 - d), epsilon = 1e-6);
        assert_relative_eq!(lower.direction.x, 1.0, epsilon = 1e-6);

        // The base keeps its closest pair, which is the tool
        let base = force(&acc, "base");
        assert_relative_eq!(base.direction.y, -1.0, epsilon = 1e-6);

        assert!(obj.min_self_distance().unwrap() < 0.0);
        assert!(obj.min_environment_distance().is_none());
        assert!(acc.tau_primary.norm() > 0.0);
        assert!(obj.cost() >= acc.tau_primary.iter().map(|t| t.abs()).sum::<f64>() - 1e-9);
    }

    #[test]
    fn test_no_force_beyond_threshold() {
        let desc = planar_arm_with_bodies();
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut obj = CollisionAvoidance::new(params(0.1, 0.1), &desc);
        obj.initialize(&mut model).unwrap();

        let acc = run(&mut obj, &model, None);

        assert!(acc.repulsive_forces.is_empty());
        assert_eq!(acc.tau_primary.norm(), 0.0);
        assert_eq!(obj.cost(), 0.0);
        assert_relative_eq!(obj.min_self_distance().unwrap(), 1.3, epsilon = 1e-6);
    }

    #[test]
    fn test_environment_force() {
        let desc = planar_arm_with_bodies();
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut obj = CollisionAvoidance::new(params(0.1, 0.1), &desc);
        obj.initialize(&mut model).unwrap();

        // A voxel spanning [2.0, 2.1] x [0.1, 0.2] x [0.0, 0.1], just above
        // the tool sphere
        let map = Arc::new(
            OccupancyMap::from_points(0.1, &[Point3::new(2.01, 0.12, 0.01)], Utc::now()).unwrap(),
        );

        let acc = run(&mut obj, &model, Some(&map));

        assert_eq!(acc.repulsive_forces.len(), 1);
        let tool = force(&acc, "tool");
        assert_eq!(tool.class, CollisionClass::Environment);
        assert_relative_eq!(tool.distance_m, 0.05, epsilon = 1e-6);
        assert_relative_eq!(tool.magnitude, 5.0, epsilon = 1e-4);
        assert_relative_eq!(tool.direction.y, -1.0, epsilon = 1e-6);

        // Pushing the tip along -Y turns both joints negative
        assert_relative_eq!(acc.tau_primary[0], -10.0, epsilon = 1e-3);
        assert_relative_eq!(acc.tau_primary[1], -5.0, epsilon = 1e-3);

        // Without a map the environment contributes nothing
        let acc = run(&mut obj, &model, None);
        assert!(acc.repulsive_forces.is_empty());
    }

    #[test]
    fn test_overlap_fallback_normal() {
        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies[3].fix_xyz_m = [0.05, 0.05, 0.05];
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut obj = CollisionAvoidance::new(params(0.1, 0.1), &desc);
        obj.initialize(&mut model).unwrap();

        // The tool sphere's centre sits in the middle of this voxel
        let map = Arc::new(
            OccupancyMap::from_points(0.1, &[Point3::new(2.05, 0.05, 0.05)], Utc::now()).unwrap(),
        );

        let acc = run(&mut obj, &model, Some(&map));
        let tool = force(&acc, "tool");

        assert_eq!(tool.magnitude, 10.0);
        assert_relative_eq!(tool.direction.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_overlap_reuses_last_normal() {
        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies[3].fix_xyz_m = [0.05, 0.05, 0.05];
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut p = params(0.1, 0.2);
        p.environment_collision.map_resolution_m = 0.2;
        let mut obj = CollisionAvoidance::new(p, &desc);
        obj.initialize(&mut model).unwrap();

        // Voxel spanning y in [0.2, 0.3], 0.1 m beside the tool sphere
        let map = Arc::new(
            OccupancyMap::from_points(0.1, &[Point3::new(2.05, 0.25, 0.05)], Utc::now()).unwrap(),
        );

        let acc = run(&mut obj, &model, Some(&map));
        let tool = force(&acc, "tool");
        assert_relative_eq!(tool.distance_m, 0.1, epsilon = 1e-6);
        assert_relative_eq!(tool.direction.y, -1.0, epsilon = 1e-6);

        // Swing the sphere's centre into the voxel
        model
            .update(&[JointMeasurement {
                name: "shoulder".into(),
                position: 0.0977,
                velocity: 0.0,
            }])
            .unwrap();

        let acc = run(&mut obj, &model, Some(&map));
        let tool = force(&acc, "tool");
        assert_eq!(tool.magnitude, 10.0);
        assert_relative_eq!(tool.direction.y, -1.0, epsilon = 1e-6);
        assert!(tool.direction.z.abs() < 1e-6);
    }

    #[test]
    fn test_normals_kept_only_for_queried_pairs() {
        let desc = planar_arm_with_bodies();
        let mut model = KinematicModel::from_description(&desc).unwrap();
        let mut obj = CollisionAvoidance::new(params(0.1, 0.2), &desc);
        obj.initialize(&mut model).unwrap();

        let voxels = |obj: &CollisionAvoidance| {
            obj.last_normals
                .keys()
                .filter(|k| matches!(k, PairKey::Voxel(..)))
                .count()
        };
        let num_pairs = obj.collision_model().active_pairs().len();

        let map = Arc::new(
            OccupancyMap::from_points(0.1, &[Point3::new(2.05, 0.15, 0.05)], Utc::now()).unwrap(),
        );
        run(&mut obj, &model, Some(&map));
        assert_eq!(voxels(&obj), 1);

        // The voxel stays occupied but the arm swings away from it
        model
            .update(&[JointMeasurement {
                name: "shoulder".into(),
                position: 1.5,
                velocity: 0.0,
            }])
            .unwrap();
        run(&mut obj, &model, Some(&map));
        assert_eq!(voxels(&obj), 0);
        assert_eq!(obj.last_normals.len(), num_pairs);
    }

    #[test]
    fn test_invalid_params() {
        let desc = planar_arm_with_bodies();
        let mut model = KinematicModel::from_description(&desc).unwrap();

        let mut p = params(0.1, 0.1);
        p.environment_collision.order = 0;
        let mut obj = CollisionAvoidance::new(p, &desc);
        assert!(matches!(
            obj.initialize(&mut model),
            Err(ObjectiveError::InvalidParameter(_))
        ));

        let mut p = params(0.1, 0.1);
        p.self_collision.d_threshold_m = 0.0;
        let mut obj = CollisionAvoidance::new(p, &desc);
        assert!(obj.initialize(&mut model).is_err());
    }
}
