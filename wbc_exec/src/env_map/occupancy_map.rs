//! Sparse, timestamped voxel occupancy map

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// Internal
use super::OccupancyMapError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Integer coordinates of a voxel. Voxel `k` spans
/// `[k * resolution, (k + 1) * resolution)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelKey(pub [i64; 3]);

/// An occupied voxel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Voxel {
    /// Time the voxel was last observed occupied.
    pub stamp: DateTime<Utc>,
}

/// Occupancy map storing only occupied voxels.
///
/// Every point outside an occupied voxel is treated as free.
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    /// Edge length of a voxel.
    ///
    /// Units: meters
    resolution_m: f64,

    voxels: HashMap<VoxelKey, Voxel>,
}

/// Map representation for saving, since JSON only permits string map keys.
#[derive(Serialize, Deserialize)]
struct SerializableOccupancyMap {
    resolution_m: f64,
    voxels: Vec<(VoxelKey, Voxel)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OccupancyMap {
    /// Create a new empty map with the given voxel edge length.
    pub fn new(resolution_m: f64) -> Result<Self, OccupancyMapError> {
        if !resolution_m.is_finite() || resolution_m <= 0.0 {
            return Err(OccupancyMapError::InvalidResolution(resolution_m));
        }

        Ok(Self {
            resolution_m,
            voxels: HashMap::new(),
        })
    }

    /// Create a map with a voxel marked occupied at every point.
    pub fn from_points(
        resolution_m: f64,
        points: &[Point3<f64>],
        stamp: DateTime<Utc>,
    ) -> Result<Self, OccupancyMapError> {
        let mut map = Self::new(resolution_m)?;
        for p in points {
            map.set_occupied(p, stamp);
        }
        Ok(map)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution_m
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Key of the voxel containing a point.
    pub fn key(&self, point: &Point3<f64>) -> VoxelKey {
        VoxelKey([
            (point.x / self.resolution_m).floor() as i64,
            (point.y / self.resolution_m).floor() as i64,
            (point.z / self.resolution_m).floor() as i64,
        ])
    }

    /// Centre of a voxel.
    pub fn centre(&self, key: &VoxelKey) -> Point3<f64> {
        Point3::new(
            (key.0[0] as f64 + 0.5) * self.resolution_m,
            (key.0[1] as f64 + 0.5) * self.resolution_m,
            (key.0[2] as f64 + 0.5) * self.resolution_m,
        )
    }

    /// Half the edge length of every voxel on each axis.
    pub fn voxel_half_extents(&self) -> [f64; 3] {
        [0.5 * self.resolution_m; 3]
    }

    /// Mark the voxel containing `point` occupied, refreshing its stamp.
    pub fn set_occupied(&mut self, point: &Point3<f64>, stamp: DateTime<Utc>) {
        let key = self.key(point);
        self.voxels.insert(key, Voxel { stamp });
    }

    /// Mark the voxel containing `point` free. Returns true if it was
    /// occupied.
    pub fn set_free(&mut self, point: &Point3<f64>) -> bool {
        let key = self.key(point);
        self.voxels.remove(&key).is_some()
    }

    pub fn is_occupied(&self, point: &Point3<f64>) -> bool {
        self.voxels.contains_key(&self.key(point))
    }

    pub fn voxel(&self, point: &Point3<f64>) -> Option<&Voxel> {
        self.voxels.get(&self.key(point))
    }

    /// Centres of every occupied voxel overlapping the box from `min` to
    /// `max`, in no particular order.
    pub fn occupied_in_bbx(&self, min: &Point3<f64>, max: &Point3<f64>) -> Vec<Point3<f64>> {
        self.keys_in_bbx(min, max)
            .into_iter()
            .map(|k| self.centre(&k))
            .collect()
    }

    /// Remove every occupied voxel overlapping the box from `min` to `max`.
    /// Returns the number of voxels removed.
    pub fn clear_bbx(&mut self, min: &Point3<f64>, max: &Point3<f64>) -> usize {
        let keys = self.keys_in_bbx(min, max);
        for k in keys.iter() {
            self.voxels.remove(k);
        }
        keys.len()
    }

    /// Remove every voxel last observed before `before`. Returns the number
    /// of voxels removed.
    pub fn degrade_outdated(&mut self, before: DateTime<Utc>) -> usize {
        let len = self.voxels.len();
        self.voxels.retain(|_, v| v.stamp >= before);
        len - self.voxels.len()
    }

    /// Keys of the occupied voxels overlapping a box.
    ///
    /// Walks whichever is smaller, the box's voxels or the occupied set.
    fn keys_in_bbx(&self, min: &Point3<f64>, max: &Point3<f64>) -> Vec<VoxelKey> {
        let lo = self.key(min);
        let hi = self.key(max);

        if (0..3).any(|i| hi.0[i] < lo.0[i]) {
            return Vec::new();
        }

        let extent: Vector3<f64> = Vector3::new(
            (hi.0[0] - lo.0[0] + 1) as f64,
            (hi.0[1] - lo.0[1] + 1) as f64,
            (hi.0[2] - lo.0[2] + 1) as f64,
        );
        let box_voxels = extent.x * extent.y * extent.z;

        if box_voxels <= self.voxels.len() as f64 {
            let mut keys = Vec::new();
            for x in lo.0[0]..=hi.0[0] {
                for y in lo.0[1]..=hi.0[1] {
                    for z in lo.0[2]..=hi.0[2] {
                        let key = VoxelKey([x, y, z]);
                        if self.voxels.contains_key(&key) {
                            keys.push(key);
                        }
                    }
                }
            }
            keys
        } else {
            self.voxels
                .keys()
                .filter(|k| (0..3).all(|i| k.0[i] >= lo.0[i] && k.0[i] <= hi.0[i]))
                .copied()
                .collect()
        }
    }

    /// Load the map from the given JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OccupancyMapError> {
        let s = fs::read_to_string(path).map_err(OccupancyMapError::IoError)?;

        let ser: SerializableOccupancyMap =
            serde_json::from_str(&s).map_err(OccupancyMapError::DeserializeError)?;

        let mut map = Self::new(ser.resolution_m)?;
        map.voxels = ser.voxels.into_iter().collect();

        Ok(map)
    }

    /// Save the map to the given JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), OccupancyMapError> {
        let mut voxels: Vec<(VoxelKey, Voxel)> =
            self.voxels.iter().map(|(k, v)| (*k, *v)).collect();
        voxels.sort_by_key(|(k, _)| *k);

        let s = serde_json::to_string(&SerializableOccupancyMap {
            resolution_m: self.resolution_m,
            voxels,
        })
        .map_err(OccupancyMapError::SerializeError)?;

        fs::write(path, s).map_err(OccupancyMapError::IoError)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
