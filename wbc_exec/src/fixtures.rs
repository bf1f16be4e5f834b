//! Robot descriptions shared by the unit tests

use crate::collision::Shape;
use crate::kinematics::{CollisionBodyDesc, JointDesc, JointKind, LinkDesc, RobotDescription};

pub(crate) fn joint(
    name: &str,
    kind: JointKind,
    parent: &str,
    child: &str,
    xyz: [f64; 3],
) -> JointDesc {
    JointDesc {
        name: name.into(),
        kind,
        parent: parent.into(),
        child: child.into(),
        origin_xyz_m: xyz,
        origin_rpy_rad: [0.0; 3],
        axis: [0.0, 0.0, 1.0],
        min_pos: -3.0,
        max_pos: 3.0,
    }
}

pub(crate) fn body(name: &str, link: &str, shape: Shape, xyz: [f64; 3]) -> CollisionBodyDesc {
    CollisionBodyDesc {
        name: name.into(),
        link: link.into(),
        shape,
        fix_xyz_m: xyz,
        fix_rpy_rad: [0.0; 3],
        group: None,
    }
}

fn links(names: &[&str]) -> Vec<LinkDesc> {
    names
        .iter()
        .map(|n| LinkDesc { name: n.to_string() })
        .collect()
}

/// Planar two link arm in the XY plane with unit length links and a fixed
/// tool frame on the end. Both joints rotate about Z.
pub(crate) fn planar_arm() -> RobotDescription {
    RobotDescription {
        name: "planar".into(),
        root_link: "base".into(),
        links: links(&["base", "upper", "lower", "tool"]),
        joints: vec![
            joint("shoulder", JointKind::Revolute, "base", "upper", [0.0; 3]),
            joint("elbow", JointKind::Revolute, "upper", "lower", [1.0, 0.0, 0.0]),
            joint("tool_mount", JointKind::Fixed, "lower", "tool", [1.0, 0.0, 0.0]),
        ],
        collision_bodies: vec![],
    }
}

/// The planar arm with a sphere on every link and a box on the base. The
/// tool sphere is rigidly attached to the lower link.
pub(crate) fn planar_arm_with_bodies() -> RobotDescription {
    let mut desc = planar_arm();

    desc.collision_bodies = vec![
        body(
            "base_box",
            "base",
            Shape::Box {
                half_extents_m: [0.1, 0.1, 0.1],
            },
            [0.0; 3],
        ),
        body("upper_sphere", "upper", Shape::Sphere { radius_m: 0.1 }, [0.5, 0.0, 0.0]),
        body("lower_sphere", "lower", Shape::Sphere { radius_m: 0.1 }, [0.5, 0.0, 0.0]),
        body("tool_sphere", "tool", Shape::Sphere { radius_m: 0.05 }, [0.0; 3]),
    ];

    desc
}
