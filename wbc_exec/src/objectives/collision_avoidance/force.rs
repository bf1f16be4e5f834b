//! Distance reduction, repulsive force law and wrench mapping

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Unit, Vector3, Vector6};
use std::collections::HashMap;

// Internal
use super::CollisionClassParams;
use crate::collision::Shape;
use crate::objectives::{CollisionClass, RepulsiveForce};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of one closest point query, seen from a robot body.
#[derive(Debug, Clone, PartialEq)]
pub struct Distance {
    /// Frame the resulting force acts on, the name of the body's link.
    pub frame_id: String,

    /// Index of the body in the collision model.
    pub body: usize,

    pub point_on_body: Point3<f64>,

    pub point_on_obstacle: Point3<f64>,

    /// Signed separating distance, negative on overlap.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Unit vector pointing away from the obstacle.
    pub normal: Unit<Vector3<f64>>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Keep only the smallest distance for each frame.
///
/// Frames keep the order in which they first appear. On a tie the entry
/// seen first is kept.
pub fn pick_minimum(distances: Vec<Distance>) -> Vec<Distance> {
    let mut kept: Vec<Distance> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for d in distances {
        match index.get(&d.frame_id) {
            Some(&i) => {
                if d.distance_m < kept[i].distance_m {
                    kept[i] = d;
                }
            }
            None => {
                index.insert(d.frame_id.clone(), kept.len());
                kept.push(d);
            }
        }
    }

    kept
}

/// Magnitude of the repulsive force at distance `d`.
///
/// Negative distances are treated as contact.
pub fn repulsive_magnitude(d: f64, params: &CollisionClassParams) -> f64 {
    let d = d.max(0.0);

    if d >= params.d_threshold_m {
        return 0.0;
    }

    // Base is in (0, 1]
    let order = i32::try_from(params.order).unwrap_or(i32::MAX);

    params.f_max * (1.0 - d / params.d_threshold_m).powi(order)
}

/// Turn distances into repulsive forces, dropping those with zero magnitude.
pub fn calculate_repulsive_forces(
    distances: &[Distance],
    params: &CollisionClassParams,
    class: CollisionClass,
) -> Vec<RepulsiveForce> {
    distances
        .iter()
        .filter_map(|d| {
            let magnitude = repulsive_magnitude(d.distance_m, params);

            if magnitude > 0.0 {
                Some(RepulsiveForce {
                    frame_id: d.frame_id.clone(),
                    class,
                    point: d.point_on_body,
                    direction: d.normal,
                    magnitude,
                    distance_m: d.distance_m,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Wrench of a repulsive force about `origin`, force followed by torque.
pub fn calculate_wrench(force: &RepulsiveForce, origin: &Point3<f64>) -> Vector6<f64> {
    let f = force.direction.into_inner() * force.magnitude;
    let torque = (force.point - origin).cross(&f);

    Vector6::new(f.x, f.y, f.z, torque.x, torque.y, torque.z)
}

/// Axis aligned box around a posed shape, grown by `margin` on every side.
pub fn find_outer_points(
    shape: &Shape,
    pose: &Isometry3<f64>,
    margin: f64,
) -> (Point3<f64>, Point3<f64>) {
    let (min, max) = shape.aabb(pose);
    let grow = Vector3::repeat(margin);

    (min - grow, max + grow)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
