//! Convex proxy shapes and their support functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

// Internal
use super::EPSILON;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A convex shape centred on its local origin.
///
/// Cylinders and cones are aligned with the local Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Sphere {
        /// Units: meters
        radius_m: f64,
    },

    Box {
        /// Units: meters
        half_extents_m: [f64; 3],
    },

    Cylinder {
        /// Units: meters
        radius_m: f64,

        /// Half the length along Z.
        ///
        /// Units: meters
        half_length_m: f64,
    },

    /// Cone with its base circle at `-height/2` and apex at `+height/2`.
    Cone {
        /// Base radius.
        ///
        /// Units: meters
        radius_m: f64,

        /// Units: meters
        height_m: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Shape {
    /// Box with the given half extents.
    pub fn cuboid(half_extents_m: [f64; 3]) -> Self {
        Shape::Box { half_extents_m }
    }

    /// Returns true if every dimension is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        let valid = |d: f64| d.is_finite() && d > 0.0;

        match self {
            Shape::Sphere { radius_m } => valid(*radius_m),
            Shape::Box { half_extents_m } => half_extents_m.iter().all(|d| valid(*d)),
            Shape::Cylinder {
                radius_m,
                half_length_m,
            } => valid(*radius_m) && valid(*half_length_m),
            Shape::Cone { radius_m, height_m } => valid(*radius_m) && valid(*height_m),
        }
    }

    /// The point of the shape furthest along `direction` in the world frame.
    pub fn support(&self, pose: &Isometry3<f64>, direction: &Vector3<f64>) -> Point3<f64> {
        let local_dir = pose.rotation.inverse() * direction;
        pose.transform_point(&self.local_support(&local_dir))
    }

    /// Support point in the shape's own frame.
    pub fn local_support(&self, dir: &Vector3<f64>) -> Point3<f64> {
        match self {
            Shape::Sphere { radius_m } => {
                let norm = dir.norm();
                if norm < EPSILON {
                    Point3::origin()
                } else {
                    Point3::from(dir * (*radius_m / norm))
                }
            }
            Shape::Box { half_extents_m } => Point3::new(
                half_extents_m[0] * dir.x.signum(),
                half_extents_m[1] * dir.y.signum(),
                half_extents_m[2] * dir.z.signum(),
            ),
            Shape::Cylinder {
                radius_m,
                half_length_m,
            } => {
                let (x, y) = radial_point(dir, *radius_m);
                let z = if dir.z >= 0.0 {
                    *half_length_m
                } else {
                    -half_length_m
                };
                Point3::new(x, y, z)
            }
            Shape::Cone { radius_m, height_m } => {
                let apex = Point3::new(0.0, 0.0, 0.5 * height_m);
                let (x, y) = radial_point(dir, *radius_m);
                let rim = Point3::new(x, y, -0.5 * height_m);

                if dir.dot(&apex.coords) >= dir.dot(&rim.coords) {
                    apex
                } else {
                    rim
                }
            }
        }
    }

    /// The world axis-aligned bounding box of the shape as `(min, max)`
    /// corners, found from the support points along each world axis.
    pub fn aabb(&self, pose: &Isometry3<f64>) -> (Point3<f64>, Point3<f64>) {
        let mut min = Point3::origin();
        let mut max = Point3::origin();

        for i in 0..3 {
            let mut axis = Vector3::zeros();
            axis[i] = 1.0;
            max[i] = self.support(pose, &axis)[i];
            min[i] = self.support(pose, &(-axis))[i];
        }

        (min, max)
    }

    /// Radius to inflate the shape's core by. Spheres are handled as a
    /// point core with this margin so their distance is exact.
    pub(crate) fn margin(&self) -> f64 {
        match self {
            Shape::Sphere { radius_m } => *radius_m,
            _ => 0.0,
        }
    }

    /// Support point of the shape with its margin removed.
    pub(crate) fn core_support(
        &self,
        pose: &Isometry3<f64>,
        direction: &Vector3<f64>,
    ) -> Point3<f64> {
        match self {
            Shape::Sphere { .. } => Point3::from(pose.translation.vector),
            _ => self.support(pose, direction),
        }
    }
}

/// Point on a circle of `radius` in the XY plane in the direction of `dir`'s
/// radial component.
fn radial_point(dir: &Vector3<f64>, radius: f64) -> (f64, f64) {
    let radial_norm = (dir.x * dir.x + dir.y * dir.y).sqrt();

    if radial_norm > EPSILON {
        (dir.x * radius / radial_norm, dir.y * radius / radial_norm)
    } else {
        // Purely axial, any point on the edge will do
        (radius, 0.0)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
