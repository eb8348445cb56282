//! Skeleton posing and draw matrix resolution.
//!
//! Joint poses are evaluated in local space and composed along the parent
//! chain into world transforms. Draw matrices are what packets index for
//! GPU skinning: either one joint's world transform directly, or an
//! envelope's weighted blend of several joints composed with their inverse
//! bind poses. Both are recomputed from the current pose on every tick and
//! never cached across ticks.

use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};

use j3d_lib::formats::drw1::{DrawMatrix, Drw1};
use j3d_lib::formats::evp1::{Envelope, Evp1};
use j3d_lib::formats::jnt1::Jnt1;
use j3d_lib::{Matrix3x4, Vector3};

use crate::ModelError;

/// One joint's animatable transform. Rotation is in degrees per axis,
/// matching the decoded joint and animation data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub scale: Vec3,
    pub rotation: Vec3,
    pub translation: Vec3,
}

impl JointPose {
    /// The local transform, composed as translation * rotation * scale.
    pub fn local_transform(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::ZYX,
            self.rotation.z.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.x.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    names: Vec<String>,
    parents: Vec<Option<usize>>,
    bind_pose: Vec<JointPose>,
    inverse_binds: Vec<Mat4>,
    envelopes: Vec<Envelope>,
    draw_entries: Vec<DrawMatrix>,
}

impl Skeleton {
    pub fn new(joints: &Jnt1, envelopes: &Evp1, draw_table: &Drw1) -> Result<Self, ModelError> {
        let count = joints.joints.len();
        let mut parents = Vec::with_capacity(count);
        let mut bind_pose = Vec::with_capacity(count);
        for joint in &joints.joints {
            if let Some(parent) = joint.parent {
                if parent >= count {
                    return Err(ModelError::InvalidIndex {
                        what: "joint parent",
                        index: parent,
                        count,
                    });
                }
            }
            parents.push(joint.parent);
            bind_pose.push(JointPose {
                scale: to_vec3(joint.scale),
                rotation: to_vec3(joint.rotation),
                translation: to_vec3(joint.translation),
            });
        }

        for entry in &draw_table.matrices {
            match *entry {
                DrawMatrix::Joint(joint) if usize::from(joint) >= count => {
                    return Err(ModelError::InvalidIndex {
                        what: "draw matrix joint",
                        index: usize::from(joint),
                        count,
                    });
                }
                DrawMatrix::Envelope(envelope)
                    if usize::from(envelope) >= envelopes.envelopes.len() =>
                {
                    return Err(ModelError::InvalidIndex {
                        what: "draw matrix envelope",
                        index: usize::from(envelope),
                        count: envelopes.envelopes.len(),
                    });
                }
                _ => {}
            }
        }

        Ok(Self {
            names: joints.joints.iter().map(|j| j.name.clone()).collect(),
            parents,
            bind_pose,
            inverse_binds: envelopes.inverse_binds.iter().map(to_mat4).collect(),
            envelopes: envelopes.envelopes.clone(),
            draw_entries: draw_table.matrices.clone(),
        })
    }

    pub fn joint_count(&self) -> usize {
        self.bind_pose.len()
    }

    pub fn joint_name(&self, joint: usize) -> Option<&str> {
        self.names.get(joint).map(String::as_str)
    }

    pub fn parent(&self, joint: usize) -> Option<usize> {
        self.parents.get(joint).copied().flatten()
    }

    /// A fresh copy of the rest pose for animation to overwrite.
    pub fn bind_pose(&self) -> Vec<JointPose> {
        self.bind_pose.clone()
    }

    /// Composes world transforms by walking each joint's parent chain.
    ///
    /// Joint order in the file usually places parents first, but nothing
    /// guarantees it, so no evaluation order is assumed.
    pub fn world_transforms(&self, poses: &[JointPose]) -> Vec<Mat4> {
        let mut worlds = Vec::with_capacity(poses.len());
        for joint in 0..poses.len() {
            let mut matrix = poses[joint].local_transform();
            let mut parent = self.parents[joint];
            while let Some(p) = parent {
                matrix = poses[p].local_transform() * matrix;
                parent = self.parents[p];
            }
            worlds.push(matrix);
        }
        worlds
    }

    /// Resolves the draw matrix array packets index into.
    pub fn draw_matrices(&self, worlds: &[Mat4]) -> Vec<Mat4> {
        self.draw_entries
            .iter()
            .map(|entry| match *entry {
                DrawMatrix::Joint(joint) => worlds[usize::from(joint)],
                DrawMatrix::Envelope(envelope) => {
                    let mut blended = Mat4::ZERO;
                    for influence in &self.envelopes[usize::from(envelope)].influences {
                        let joint = usize::from(influence.joint);
                        let inverse_bind =
                            self.inverse_binds.get(joint).copied().unwrap_or_else(|| {
                                tracing::warn!(joint, "no inverse bind pose for joint");
                                Mat4::IDENTITY
                            });
                        blended += worlds[joint] * inverse_bind * influence.weight;
                    }
                    blended
                }
            })
            .collect()
    }
}

fn to_vec3(v: Vector3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// The decoded matrices are three rows of four; glam is column major.
fn to_mat4(m: &Matrix3x4) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(m.rows[0][0], m.rows[1][0], m.rows[2][0], 0.0),
        Vec4::new(m.rows[0][1], m.rows[1][1], m.rows[2][1], 0.0),
        Vec4::new(m.rows[0][2], m.rows[1][2], m.rows[2][2], 0.0),
        Vec4::new(m.rows[0][3], m.rows[1][3], m.rows[2][3], 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use j3d_lib::formats::evp1::Influence;
    use j3d_lib::formats::jnt1::Joint;
    use j3d_lib::Aabb;

    fn joint(name: &str, translation: Vector3, parent: Option<usize>) -> Joint {
        Joint {
            name: name.to_string(),
            matrix_type: 0,
            ignore_parent_scale: false,
            scale: Vector3::ONE,
            rotation: Vector3::ZERO,
            translation,
            bounding_sphere: 0.0,
            bounds: Aabb::default(),
            parent,
        }
    }

    fn skeleton(joints: Vec<Joint>, envelopes: Evp1, draw: Drw1) -> Skeleton {
        let jnt1 = Jnt1 {
            remap: (0..joints.len() as u16).collect(),
            joints,
        };
        Skeleton::new(&jnt1, &envelopes, &draw).unwrap()
    }

    #[test]
    fn world_transforms_compose_parent_chains() {
        let skeleton = skeleton(
            vec![
                joint("root", Vector3::new(1.0, 0.0, 0.0), None),
                joint("child", Vector3::new(0.0, 2.0, 0.0), Some(0)),
            ],
            Evp1::default(),
            Drw1::default(),
        );

        let worlds = skeleton.world_transforms(&skeleton.bind_pose());
        let child = worlds[1].transform_point3(Vec3::ZERO);
        assert_relative_eq!(1.0, child.x);
        assert_relative_eq!(2.0, child.y);
        assert_relative_eq!(0.0, child.z);
    }

    #[test]
    fn rotation_is_applied_in_degrees() {
        let mut poses = vec![
            JointPose {
                scale: Vec3::ONE,
                rotation: Vec3::new(0.0, 0.0, 90.0),
                translation: Vec3::ZERO,
            },
            JointPose {
                scale: Vec3::ONE,
                rotation: Vec3::ZERO,
                translation: Vec3::new(1.0, 0.0, 0.0),
            },
        ];
        let skeleton = skeleton(
            vec![
                joint("root", Vector3::ZERO, None),
                joint("child", Vector3::ZERO, Some(0)),
            ],
            Evp1::default(),
            Drw1::default(),
        );
        poses[0].rotation = Vec3::new(0.0, 0.0, 90.0);

        let worlds = skeleton.world_transforms(&poses);
        let child = worlds[1].transform_point3(Vec3::ZERO);
        assert_relative_eq!(0.0, child.x, epsilon = 1e-6);
        assert_relative_eq!(1.0, child.y, epsilon = 1e-6);
    }

    #[test]
    fn envelope_draw_matrix_blends_influences() {
        let envelopes = Evp1 {
            envelopes: vec![Envelope {
                influences: vec![
                    Influence {
                        joint: 0,
                        weight: 0.5,
                    },
                    Influence {
                        joint: 1,
                        weight: 0.5,
                    },
                ],
            }],
            inverse_binds: vec![Matrix3x4::default(), Matrix3x4::default()],
        };
        let draw = Drw1 {
            matrices: vec![DrawMatrix::Envelope(0)],
        };
        let skeleton = skeleton(
            vec![
                joint("a", Vector3::new(2.0, 0.0, 0.0), None),
                joint("b", Vector3::new(0.0, 4.0, 0.0), None),
            ],
            envelopes,
            draw,
        );

        let worlds = skeleton.world_transforms(&skeleton.bind_pose());
        let draw_matrices = skeleton.draw_matrices(&worlds);
        let blended = draw_matrices[0].transform_point3(Vec3::ZERO);
        assert_relative_eq!(1.0, blended.x);
        assert_relative_eq!(2.0, blended.y);
    }

    #[test]
    fn out_of_range_draw_joint_is_rejected() {
        let jnt1 = Jnt1 {
            joints: vec![joint("only", Vector3::ZERO, None)],
            remap: vec![0],
        };
        let draw = Drw1 {
            matrices: vec![DrawMatrix::Joint(3)],
        };

        let result = Skeleton::new(&jnt1, &Evp1::default(), &draw);
        assert!(matches!(result, Err(ModelError::InvalidIndex { .. })));
    }
}
