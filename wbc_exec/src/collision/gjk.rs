//! GJK closest-distance query between two convex shapes
//!
//! The query works on the Minkowski difference `A - B` of the two shapes'
//! cores. Spheres are reduced to their centre point with the radius kept as a
//! margin, which makes sphere/sphere queries exact and every other sphere
//! query converge in a few iterations.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Unit, Vector3};

// Internal
use super::{Shape, EPSILON};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of GJK iterations.
const GJK_MAX_ITERATIONS: usize = 64;

/// Relative progress below which GJK is considered converged.
const GJK_REL_TOLERANCE: f64 = 1e-10;

/// Squared distance below which two points are treated as coincident.
const COINCIDENT_SQ: f64 = EPSILON * EPSILON;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of a closest distance query between two shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoints {
    /// Closest point on shape A.
    pub point_a: Point3<f64>,

    /// Closest point on shape B.
    pub point_b: Point3<f64>,

    /// Separating distance, zero or negative when the shapes overlap.
    ///
    /// Units: meters
    pub distance: f64,

    /// Unit vector from B toward A. `None` when the shapes overlap and no
    /// separating direction could be found.
    pub normal: Option<Unit<Vector3<f64>>>,
}

/// A vertex of the Minkowski difference, remembering the support points on
/// each shape which produced it.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    w: Vector3<f64>,
    a: Point3<f64>,
    b: Point3<f64>,
}

/// A simplex along with the barycentric weights of its closest point to the
/// origin.
#[derive(Debug, Clone)]
struct Reduced {
    vertices: Vec<Vertex>,
    weights: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Reduced {
    fn single(v: Vertex) -> Self {
        Self {
            vertices: vec![v],
            weights: vec![1.0],
        }
    }

    /// Keep only the vertices with a positive weight.
    fn from_weights(vertices: &[Vertex], weights: &[f64]) -> Self {
        let mut reduced = Self {
            vertices: Vec::with_capacity(vertices.len()),
            weights: Vec::with_capacity(vertices.len()),
        };

        for (v, w) in vertices.iter().zip(weights.iter()) {
            if *w > 0.0 {
                reduced.vertices.push(*v);
                reduced.weights.push(*w);
            }
        }

        reduced
    }

    /// Closest point to the origin.
    fn point(&self) -> Vector3<f64> {
        self.vertices
            .iter()
            .zip(self.weights.iter())
            .fold(Vector3::zeros(), |acc, (v, w)| acc + v.w * *w)
    }

    /// Corresponding closest points on A and B.
    fn witness_points(&self) -> (Point3<f64>, Point3<f64>) {
        let mut a = Vector3::zeros();
        let mut b = Vector3::zeros();

        for (v, w) in self.vertices.iter().zip(self.weights.iter()) {
            a += v.a.coords * *w;
            b += v.b.coords * *w;
        }

        (Point3::from(a), Point3::from(b))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the closest points between two posed shapes.
pub fn closest_points(
    shape_a: &Shape,
    pose_a: &Isometry3<f64>,
    shape_b: &Shape,
    pose_b: &Isometry3<f64>,
) -> ClosestPoints {
    let margin_a = shape_a.margin();
    let margin_b = shape_b.margin();

    if let Some((core_a, core_b)) = gjk_cores(shape_a, pose_a, shape_b, pose_b) {
        let delta = core_a - core_b;
        let core_dist = delta.norm();

        if core_dist > EPSILON {
            let normal = delta / core_dist;
            return ClosestPoints {
                point_a: core_a - normal * margin_a,
                point_b: core_b + normal * margin_b,
                distance: core_dist - margin_a - margin_b,
                normal: Some(Unit::new_unchecked(normal)),
            };
        }
    }

    // Cores overlap, use the points each shape presents toward the other's
    // centre. The penetration depth is not resolved.
    let centre_dir = pose_b.translation.vector - pose_a.translation.vector;

    ClosestPoints {
        point_a: shape_a.support(pose_a, &centre_dir),
        point_b: shape_b.support(pose_b, &(-centre_dir)),
        distance: -(margin_a + margin_b),
        normal: None,
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Run GJK on the cores of both shapes.
///
/// Returns the closest points on each core, or `None` if the cores touch or
/// overlap.
fn gjk_cores(
    shape_a: &Shape,
    pose_a: &Isometry3<f64>,
    shape_b: &Shape,
    pose_b: &Isometry3<f64>,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let support = |dir: &Vector3<f64>| {
        let a = shape_a.core_support(pose_a, dir);
        let b = shape_b.core_support(pose_b, &(-dir));
        Vertex { w: a - b, a, b }
    };

    let mut initial_dir = pose_b.translation.vector - pose_a.translation.vector;
    if initial_dir.norm_squared() < COINCIDENT_SQ {
        initial_dir = Vector3::x();
    }

    let mut simplex = Reduced::single(support(&initial_dir));
    let mut v = simplex.point();

    for _ in 0..GJK_MAX_ITERATIONS {
        let vv = v.norm_squared();
        if vv < COINCIDENT_SQ {
            return None;
        }

        let w = support(&(-v));

        // No vertex further toward the origin exists
        if vv - v.dot(&w.w) <= GJK_REL_TOLERANCE * vv {
            break;
        }
        if simplex
            .vertices
            .iter()
            .any(|s| (s.w - w.w).norm_squared() < COINCIDENT_SQ)
        {
            break;
        }

        let mut candidate = simplex.vertices.clone();
        candidate.push(w);

        let reduced = reduce_simplex(&candidate)?;
        let v_new = reduced.point();

        if v_new.norm_squared() >= vv {
            break;
        }

        simplex = reduced;
        v = v_new;
    }

    Some(simplex.witness_points())
}

/// Find the sub-simplex closest to the origin, or `None` if the origin lies
/// inside a tetrahedron.
fn reduce_simplex(vertices: &[Vertex]) -> Option<Reduced> {
    match vertices.len() {
        1 => Some(Reduced::single(vertices[0])),
        2 => Some(closest_on_segment(vertices[0], vertices[1])),
        3 => Some(closest_on_triangle(vertices[0], vertices[1], vertices[2])),
        _ => closest_on_tetrahedron(vertices[0], vertices[1], vertices[2], vertices[3]),
    }
}

fn closest_on_segment(p: Vertex, q: Vertex) -> Reduced {
    let pq = q.w - p.w;
    let len_sq = pq.norm_squared();

    if len_sq < COINCIDENT_SQ {
        return Reduced::single(p);
    }

    let t = -p.w.dot(&pq) / len_sq;

    if t <= 0.0 {
        Reduced::single(p)
    } else if t >= 1.0 {
        Reduced::single(q)
    } else {
        Reduced {
            vertices: vec![p, q],
            weights: vec![1.0 - t, t],
        }
    }
}

/// Closest point on a triangle to the origin by Voronoi region.
fn closest_on_triangle(a: Vertex, b: Vertex, c: Vertex) -> Reduced {
    let ab = b.w - a.w;
    let ac = c.w - a.w;

    // Degenerate triangle, fall back to the best edge
    if ab.cross(&ac).norm_squared() < COINCIDENT_SQ {
        return [
            closest_on_segment(a, b),
            closest_on_segment(b, c),
            closest_on_segment(a, c),
        ]
        .into_iter()
        .min_by(|x, y| x.point().norm_squared().total_cmp(&y.point().norm_squared()))
        .unwrap_or_else(|| Reduced::single(a));
    }

    let vertices = [a, b, c];

    let ap = -a.w;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return Reduced::single(a);
    }

    let bp = -b.w;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return Reduced::single(b);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return Reduced::from_weights(&vertices, &[1.0 - v, v, 0.0]);
    }

    let cp = -c.w;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return Reduced::single(c);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return Reduced::from_weights(&vertices, &[1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return Reduced::from_weights(&vertices, &[0.0, 1.0 - w, w]);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    Reduced::from_weights(&vertices, &[1.0 - v - w, v, w])
}

fn closest_on_tetrahedron(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> Option<Reduced> {
    let verts = [a, b, c, d];
    let volume = (b.w - a.w).dot(&(c.w - a.w).cross(&(d.w - a.w)));
    let flat = volume.abs() < COINCIDENT_SQ;

    // Each face listed with the vertex opposite to it
    let faces = [(0, 1, 2, 3), (0, 1, 3, 2), (0, 2, 3, 1), (1, 2, 3, 0)];

    let mut best: Option<(f64, Reduced)> = None;

    for (i, j, k, l) in faces {
        let normal = (verts[j].w - verts[i].w).cross(&(verts[k].w - verts[i].w));
        let origin_side = normal.dot(&(-verts[i].w));
        let opposite_side = normal.dot(&(verts[l].w - verts[i].w));

        if flat || origin_side * opposite_side < 0.0 {
            let reduced = closest_on_triangle(verts[i], verts[j], verts[k]);
            let dist_sq = reduced.point().norm_squared();

            if best.as_ref().map_or(true, |(d, _)| dist_sq < *d) {
                best = Some((dist_sq, reduced));
            }
        }
    }

    best.map(|(_, r)| r)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
