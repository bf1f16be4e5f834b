//! Collision bodies attached to the robot and their grouping

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Isometry3;
use std::collections::{HashMap, HashSet};

// Internal
use super::{CollisionError, Shape};
use crate::kinematics::{isometry_from_xyz_rpy, KinematicModel, RobotDescription};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A convex proxy rigidly attached to a link.
#[derive(Debug, Clone)]
pub struct CollisionBody {
    pub name: String,

    /// Index of the owning link in the kinematic model.
    pub link: usize,

    /// Name of the owning link, used as the frame id of forces on this body.
    pub link_name: String,

    pub shape: Shape,

    /// Pose of the body in the link frame.
    pub fix_pose: Isometry3<f64>,

    /// Collision group index. Bodies in the same group are never checked
    /// against each other.
    pub group: usize,
}

/// The set of collision bodies and the pairs which must be checked.
#[derive(Debug, Clone, Default)]
pub struct CollisionModel {
    bodies: Vec<CollisionBody>,

    /// Pairs of body indices `(a, b)` with `a < b`.
    active_pairs: Vec<(usize, usize)>,

    num_groups: usize,
}

/// Key used to assign group indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    /// Bodies on links which are rigidly connected share a rigid group.
    Rigid(usize),

    /// Explicitly named group.
    Named(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CollisionBody {
    /// World pose of the body in the model's current state.
    pub fn world_pose(&self, model: &KinematicModel) -> Isometry3<f64> {
        model.link_pose(self.link) * self.fix_pose
    }
}

impl CollisionModel {
    /// Build the collision model from the description's bodies.
    ///
    /// Links joined by fixed joints form one rigid group. A body with an
    /// explicit group name joins that named group instead. Pairs of bodies
    /// in different groups are checked, except when their rigid groups are
    /// directly connected by a movable joint.
    pub fn from_description(
        desc: &RobotDescription,
        model: &KinematicModel,
    ) -> Result<Self, CollisionError> {
        let rigid = rigid_groups(model);

        // Rigid groups directly connected by a movable joint
        let mut adjacent = HashSet::new();
        for joint in model.joints().iter().filter(|j| j.kind.is_movable()) {
            let a = rigid[joint.parent_link];
            let b = rigid[joint.child_link];
            adjacent.insert((a.min(b), a.max(b)));
        }

        let mut names = HashSet::new();
        let mut group_ids: HashMap<GroupKey, usize> = HashMap::new();
        let mut bodies = Vec::with_capacity(desc.collision_bodies.len());
        let mut body_rigid = Vec::with_capacity(desc.collision_bodies.len());

        for bd in desc.collision_bodies.iter() {
            if !names.insert(bd.name.clone()) {
                return Err(CollisionError::DuplicateBody(bd.name.clone()));
            }

            let link = model
                .link_id(&bd.link)
                .ok_or_else(|| CollisionError::UnknownLink {
                    body: bd.name.clone(),
                    link: bd.link.clone(),
                })?;

            if !bd.shape.is_valid() {
                return Err(CollisionError::InvalidShape(bd.name.clone(), bd.shape));
            }

            let key = match &bd.group {
                Some(name) => GroupKey::Named(name.clone()),
                None => GroupKey::Rigid(rigid[link]),
            };
            let next_id = group_ids.len();
            let group = *group_ids.entry(key).or_insert(next_id);

            body_rigid.push(rigid[link]);
            bodies.push(CollisionBody {
                name: bd.name.clone(),
                link,
                link_name: bd.link.clone(),
                shape: bd.shape,
                fix_pose: isometry_from_xyz_rpy(&bd.fix_xyz_m, &bd.fix_rpy_rad),
                group,
            });
        }

        let mut active_pairs = Vec::new();
        for a in 0..bodies.len() {
            for b in (a + 1)..bodies.len() {
                let (ra, rb) = (body_rigid[a], body_rigid[b]);

                if bodies[a].group == bodies[b].group
                    || ra == rb
                    || adjacent.contains(&(ra.min(rb), ra.max(rb)))
                {
                    continue;
                }

                active_pairs.push((a, b));
            }
        }

        debug!(
            "Collision model: {} bodies in {} groups, {} active pairs",
            bodies.len(),
            group_ids.len(),
            active_pairs.len()
        );

        Ok(Self {
            bodies,
            active_pairs,
            num_groups: group_ids.len(),
        })
    }

    pub fn bodies(&self) -> &[CollisionBody] {
        &self.bodies
    }

    pub fn active_pairs(&self) -> &[(usize, usize)] {
        &self.active_pairs
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Assign each link the index of its rigid group, which is the topmost link
/// reachable from it through fixed joints only.
fn rigid_groups(model: &KinematicModel) -> Vec<usize> {
    (0..model.links().len())
        .map(|mut link| {
            while let Some(j) = model.links()[link].parent_joint {
                let joint = &model.joints()[j];
                if joint.kind.is_movable() {
                    break;
                }
                link = joint.parent_link;
            }
            link
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::{body, planar_arm_with_bodies};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn build(desc: &RobotDescription) -> Result<CollisionModel, CollisionError> {
        let model = KinematicModel::from_description(desc).unwrap();
        CollisionModel::from_description(desc, &model)
    }

    fn pair_names(cm: &CollisionModel) -> Vec<(String, String)> {
        cm.active_pairs()
            .iter()
            .map(|(a, b)| (cm.bodies()[*a].name.clone(), cm.bodies()[*b].name.clone()))
            .collect()
    }

    #[test]
    fn test_groups_and_pairs() {
        let cm = build(&planar_arm_with_bodies()).unwrap();

        // The tool is rigidly attached to the lower link
        assert_eq!(cm.num_groups(), 3);
        assert_eq!(cm.bodies()[2].group, cm.bodies()[3].group);

        // Neighbouring links are never checked
        assert_eq!(
            pair_names(&cm),
            vec![
                ("base_box".to_string(), "lower_sphere".to_string()),
                ("base_box".to_string(), "tool_sphere".to_string()),
            ]
        );
    }

    #[test]
    fn test_named_group_override() {
        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies[0].group = Some("static".into());
        desc.collision_bodies[3].group = Some("static".into());

        let cm = build(&desc).unwrap();

        assert_eq!(cm.bodies()[0].group, cm.bodies()[3].group);
        assert_eq!(
            pair_names(&cm),
            vec![("base_box".to_string(), "lower_sphere".to_string())]
        );
    }

    #[test]
    fn test_world_pose() {
        let desc = planar_arm_with_bodies();
        let model = KinematicModel::from_description(&desc).unwrap();
        let cm = CollisionModel::from_description(&desc, &model).unwrap();

        let pose = cm.bodies()[2].world_pose(&model);
        assert_relative_eq!(
            pose.translation.vector,
            Vector3::new(1.5, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_invalid_bodies() {
        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies
            .push(body("base_box", "base", Shape::Sphere { radius_m: 0.1 }, [0.0; 3]));
        assert_eq!(
            build(&desc).unwrap_err(),
            CollisionError::DuplicateBody("base_box".into())
        );

        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies[1].link = "elsewhere".into();
        assert!(matches!(
            build(&desc),
            Err(CollisionError::UnknownLink { .. })
        ));

        let mut desc = planar_arm_with_bodies();
        desc.collision_bodies[1].shape = Shape::Sphere { radius_m: -1.0 };
        assert!(matches!(
            build(&desc),
            Err(CollisionError::InvalidShape(_, _))
        ));
    }
}
