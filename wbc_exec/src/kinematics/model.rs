//! Kinematic tree, forward kinematics and chain registry

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::{DVector, Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

// Internal
use super::{
    isometry_from_xyz_rpy, JointKind, JointMeasurement, KinematicState, KinematicsError,
    RobotDescription, MIN_AXIS_NORM,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Identifies a chain registered with a `KinematicModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChainId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,

    /// Index of the joint this link is the child of, `None` for the root.
    pub parent_joint: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,

    pub kind: JointKind,

    pub parent_link: usize,

    pub child_link: usize,

    /// Pose of the joint frame in the parent link frame.
    pub origin: Isometry3<f64>,

    /// Axis of motion in the joint frame.
    pub axis: Unit<Vector3<f64>>,

    /// Index into the joint state, `None` for fixed joints.
    pub index: Option<usize>,

    pub min_pos: f64,

    pub max_pos: f64,
}

/// An ordered sequence of joints from a root frame to a tip frame.
#[derive(Debug, Clone)]
pub struct Chain {
    pub root_link: usize,

    pub tip_link: usize,

    /// Joints from root to tip, including fixed joints.
    pub joints: Vec<usize>,
}

/// The robot's kinematic tree along with its current state.
#[derive(Debug, Clone, Default)]
pub struct KinematicModel {
    name: String,

    links: Vec<Link>,

    joints: Vec<Joint>,

    link_ids: HashMap<String, usize>,

    root: usize,

    /// Joints ordered so that every joint's parent link pose is known before
    /// it is visited.
    fk_order: Vec<usize>,

    /// Joint index for each state index.
    movable: Vec<usize>,

    /// World pose of each joint frame before the joint's own motion.
    joint_frames: Vec<Isometry3<f64>>,

    /// World pose of each link.
    link_poses: Vec<Isometry3<f64>>,

    lower_limits: Vec<f64>,

    upper_limits: Vec<f64>,

    state: KinematicState,

    chains: Vec<Chain>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Joint {
    /// Transform produced by the joint's motion at position `q`.
    fn motion(&self, q: f64) -> Isometry3<f64> {
        match self.kind {
            JointKind::Revolute => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, q),
            ),
            JointKind::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis.into_inner() * q),
                UnitQuaternion::identity(),
            ),
            JointKind::Fixed => Isometry3::identity(),
        }
    }
}

impl KinematicModel {
    /// Build the tree from a description.
    ///
    /// Movable joints are indexed in description order. The initial joint
    /// positions are zero, limited into each joint's range.
    pub fn from_description(desc: &RobotDescription) -> Result<Self, KinematicsError> {
        let mut model = Self {
            name: desc.name.clone(),
            ..Default::default()
        };

        // ---- LINKS ----

        for link in desc.links.iter() {
            if model.link_ids.contains_key(&link.name) {
                return Err(KinematicsError::DuplicateLink(link.name.clone()));
            }
            model.link_ids.insert(link.name.clone(), model.links.len());
            model.links.push(Link {
                name: link.name.clone(),
                parent_joint: None,
            });
        }

        model.root = model.find_link(&desc.root_link)?;

        // ---- JOINTS ----

        let mut joint_names = HashMap::new();
        let mut names = Vec::new();
        let mut initial = Vec::new();

        for jd in desc.joints.iter() {
            if joint_names.insert(jd.name.clone(), model.joints.len()).is_some() {
                return Err(KinematicsError::DuplicateJoint(jd.name.clone()));
            }

            let parent_link = model.find_link(&jd.parent)?;
            let child_link = model.find_link(&jd.child)?;

            if child_link == model.root {
                return Err(KinematicsError::Cycle(jd.name.clone()));
            }
            if model.links[child_link].parent_joint.is_some() {
                return Err(KinematicsError::MultipleParents(jd.child.clone()));
            }

            let axis = if jd.kind.is_movable() {
                Unit::try_new(Vector3::from(jd.axis), MIN_AXIS_NORM)
                    .ok_or_else(|| KinematicsError::ZeroAxis(jd.name.clone()))?
            } else {
                Vector3::z_axis()
            };

            let index = if jd.kind.is_movable() {
                if !jd.min_pos.is_finite() || !jd.max_pos.is_finite() || jd.min_pos > jd.max_pos
                {
                    return Err(KinematicsError::InvalidLimits {
                        joint: jd.name.clone(),
                        min: jd.min_pos,
                        max: jd.max_pos,
                    });
                }

                model.movable.push(model.joints.len());
                model.lower_limits.push(jd.min_pos);
                model.upper_limits.push(jd.max_pos);
                names.push(jd.name.clone());
                initial.push(util::maths::clamp(0.0, jd.min_pos, jd.max_pos));

                Some(names.len() - 1)
            } else {
                None
            };

            model.links[child_link].parent_joint = Some(model.joints.len());
            model.joints.push(Joint {
                name: jd.name.clone(),
                kind: jd.kind,
                parent_link,
                child_link,
                origin: isometry_from_xyz_rpy(&jd.origin_xyz_m, &jd.origin_rpy_rad),
                axis,
                index,
                min_pos: jd.min_pos,
                max_pos: jd.max_pos,
            });
        }

        if model.movable.is_empty() {
            return Err(KinematicsError::NoMovableJoints);
        }

        // ---- TRAVERSAL ORDER ----

        let mut child_joints = vec![Vec::new(); model.links.len()];
        for (i, joint) in model.joints.iter().enumerate() {
            child_joints[joint.parent_link].push(i);
        }

        let mut visited = vec![false; model.links.len()];
        let mut queue = VecDeque::new();
        visited[model.root] = true;
        queue.push_back(model.root);

        while let Some(link) = queue.pop_front() {
            for &j in child_joints[link].iter() {
                let child = model.joints[j].child_link;
                if !visited[child] {
                    visited[child] = true;
                    model.fk_order.push(j);
                    queue.push_back(child);
                }
            }
        }

        if let Some(i) = visited.iter().position(|v| !v) {
            return Err(KinematicsError::Disconnected(model.links[i].name.clone()));
        }

        // ---- STATE ----

        model.state = KinematicState::new(names, DVector::from_vec(initial));
        model.joint_frames = vec![Isometry3::identity(); model.joints.len()];
        model.link_poses = vec![Isometry3::identity(); model.links.len()];
        model.forward_kinematics();

        debug!(
            "Built kinematic model {:?}: {} links, {} joints, {} movable",
            model.name,
            model.links.len(),
            model.joints.len(),
            model.movable.len()
        );

        Ok(model)
    }

    /// Update the joint state from sensor feedback and recompute every link
    /// pose.
    ///
    /// Fails without modifying the state if a measurement names an unknown
    /// joint.
    pub fn update(&mut self, measurements: &[JointMeasurement]) -> Result<(), KinematicsError> {
        self.state.apply(measurements)?;
        self.forward_kinematics();
        Ok(())
    }

    /// Register a chain from `root` to `tip`, or return the existing one.
    pub fn chain(&mut self, root: &str, tip: &str) -> Result<ChainId, KinematicsError> {
        let root_link = self
            .link_id(root)
            .ok_or_else(|| KinematicsError::UnknownFrame(root.into()))?;
        let tip_link = self
            .link_id(tip)
            .ok_or_else(|| KinematicsError::UnknownFrame(tip.into()))?;

        if let Some(i) = self
            .chains
            .iter()
            .position(|c| c.root_link == root_link && c.tip_link == tip_link)
        {
            return Ok(ChainId(i));
        }

        // Walk up from the tip until the root is found
        let mut joints = Vec::new();
        let mut link = tip_link;
        while link != root_link {
            match self.links[link].parent_joint {
                Some(j) => {
                    joints.push(j);
                    link = self.joints[j].parent_link;
                }
                None => {
                    return Err(KinematicsError::NotAnAncestor {
                        root: root.into(),
                        tip: tip.into(),
                    })
                }
            }
        }
        joints.reverse();

        debug!(
            "Registered chain {} -> {} with {} joints",
            root,
            tip,
            joints.len()
        );

        self.chains.push(Chain {
            root_link,
            tip_link,
            joints,
        });

        Ok(ChainId(self.chains.len() - 1))
    }

    /// Recompute the world pose of every link from the current joint state.
    fn forward_kinematics(&mut self) {
        self.link_poses[self.root] = Isometry3::identity();

        for &j in self.fk_order.iter() {
            let joint = &self.joints[j];
            let q = joint.index.map(|i| self.state.positions()[i]).unwrap_or(0.0);

            let frame = self.link_poses[joint.parent_link] * joint.origin;
            self.joint_frames[j] = frame;
            self.link_poses[joint.child_link] = frame * joint.motion(q);
        }
    }

    /// Joints between the root link and `link`, ordered root first.
    pub fn ancestor_joints(&self, link: usize) -> Vec<usize> {
        let mut joints = Vec::new();
        let mut current = link;

        while let Some(j) = self.links.get(current).and_then(|l| l.parent_joint) {
            joints.push(j);
            current = self.joints[j].parent_link;
        }
        joints.reverse();

        joints
    }

    /// World position and unit axis of a joint.
    pub fn joint_axis_world(&self, joint: usize) -> (Point3<f64>, Vector3<f64>) {
        let frame = &self.joint_frames[joint];
        (
            Point3::from(frame.translation.vector),
            frame.rotation * self.joints[joint].axis.into_inner(),
        )
    }

    fn find_link(&self, name: &str) -> Result<usize, KinematicsError> {
        self.link_id(name)
            .ok_or_else(|| KinematicsError::UnknownLink(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_id(&self, name: &str) -> Option<usize> {
        self.link_ids.get(name).copied()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn root_link(&self) -> usize {
        self.root
    }

    /// World pose of a link.
    pub fn link_pose(&self, link: usize) -> &Isometry3<f64> {
        &self.link_poses[link]
    }

    pub fn chain_info(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id.0)
    }

    /// Number of movable joints.
    pub fn num_joints(&self) -> usize {
        self.movable.len()
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    pub fn joint_names(&self) -> &[String] {
        self.state.names()
    }

    pub fn joint_name_to_index(&self) -> &HashMap<String, usize> {
        self.state.name_to_index()
    }

    /// Lower limits of the movable joints in state order.
    pub fn q_min(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.lower_limits)
    }

    /// Upper limits of the movable joints in state order.
    pub fn q_max(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.upper_limits)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::planar_arm;
    use crate::kinematics::LinkDesc;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_kinematics() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();
        let tool = model.link_id("tool").unwrap();

        assert_eq!(model.num_joints(), 2);
        assert_eq!(model.joint_names(), &["shoulder".to_string(), "elbow".to_string()]);
        assert_relative_eq!(
            model.link_pose(tool).translation.vector,
            Vector3::new(2.0, 0.0, 0.0),
            epsilon = 1e-12
        );

        model
            .update(&[
                JointMeasurement {
                    name: "shoulder".into(),
                    position: std::f64::consts::FRAC_PI_2,
                    velocity: 0.0,
                },
                JointMeasurement {
                    name: "elbow".into(),
                    position: -std::f64::consts::FRAC_PI_2,
                    velocity: 0.0,
                },
            ])
            .unwrap();

        assert_relative_eq!(
            model.link_pose(tool).translation.vector,
            Vector3::new(1.0, 1.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_prismatic_joint() {
        let mut desc = planar_arm();
        desc.joints[1].kind = JointKind::Prismatic;
        desc.joints[1].axis = [1.0, 0.0, 0.0];
        desc.joints[1].min_pos = 0.0;
        desc.joints[1].max_pos = 0.5;

        let mut model = KinematicModel::from_description(&desc).unwrap();
        model
            .update(&[JointMeasurement {
                name: "elbow".into(),
                position: 0.25,
                velocity: 0.0,
            }])
            .unwrap();

        let tool = model.link_id("tool").unwrap();
        assert_relative_eq!(
            model.link_pose(tool).translation.vector,
            Vector3::new(2.25, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_initial_positions_within_limits() {
        let mut desc = planar_arm();
        desc.joints[0].min_pos = 0.5;
        desc.joints[0].max_pos = 1.0;

        let model = KinematicModel::from_description(&desc).unwrap();

        assert_eq!(model.state().positions()[0], 0.5);
        assert_eq!(model.state().positions()[1], 0.0);
    }

    #[test]
    fn test_invalid_descriptions() {
        let mut desc = planar_arm();
        desc.links.push(LinkDesc { name: "base".into() });
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::DuplicateLink("base".into())
        );

        let mut desc = planar_arm();
        desc.joints[0].min_pos = 1.0;
        desc.joints[0].max_pos = -1.0;
        assert!(matches!(
            KinematicModel::from_description(&desc),
            Err(KinematicsError::InvalidLimits { .. })
        ));

        let mut desc = planar_arm();
        desc.joints[1].axis = [0.0; 3];
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::ZeroAxis("elbow".into())
        );

        let mut desc = planar_arm();
        desc.joints[1].parent = "nowhere".into();
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::UnknownLink("nowhere".into())
        );

        let mut desc = planar_arm();
        desc.joints[2].child = "lower".into();
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::MultipleParents("lower".into())
        );

        let mut desc = planar_arm();
        desc.links.push(LinkDesc { name: "floating".into() });
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::Disconnected("floating".into())
        );

        let mut desc = planar_arm();
        for j in desc.joints.iter_mut() {
            j.kind = JointKind::Fixed;
        }
        assert_eq!(
            KinematicModel::from_description(&desc).unwrap_err(),
            KinematicsError::NoMovableJoints
        );
    }

    #[test]
    fn test_chains() {
        let mut model = KinematicModel::from_description(&planar_arm()).unwrap();

        let full = model.chain("base", "tool").unwrap();
        let again = model.chain("base", "tool").unwrap();
        let partial = model.chain("upper", "tool").unwrap();

        assert_eq!(full, again);
        assert_ne!(full, partial);
        assert_eq!(model.chain_info(full).unwrap().joints, vec![0, 1, 2]);
        assert_eq!(model.chain_info(partial).unwrap().joints, vec![1, 2]);

        assert_eq!(
            model.chain("tool", "base").unwrap_err(),
            KinematicsError::NotAnAncestor {
                root: "tool".into(),
                tip: "base".into()
            }
        );
        assert_eq!(
            model.chain("base", "gripper").unwrap_err(),
            KinematicsError::UnknownFrame("gripper".into())
        );
    }
}
