//! `JNT1` skeleton joint decoding.
//!
//! Joints store their bind pose as separate scale, rotation, and translation
//! components. Rotations are packed as signed 16 bit fractions of a half
//! turn and are decoded to degrees. Parent links are not stored here; they
//! are recovered from the scene hierarchy after all chunks decode.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::formats::inf1::{Inf1, NodeKind};
use crate::read_vector3;
use crate::section::{expect_pad_u16, expect_pad_u8};
use crate::strings::read_string_table;
use crate::{Aabb, DecodeOptions, Vector3};

const CHUNK: &str = "JNT1";

const JOINT_ENTRY_SIZE: u64 = 0x40;

/// Converts a packed s16 rotation to degrees.
pub(crate) const ROTATION_SCALE: f32 = 180.0 / 32768.0;

/// One skeleton joint in bind pose.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Joint {
    pub name: String,
    /// Billboarding behavior for this joint's subtree.
    pub matrix_type: u16,
    pub ignore_parent_scale: bool,
    pub scale: Vector3,
    /// Euler rotation in degrees, applied in X then Y then Z order.
    pub rotation: Vector3,
    pub translation: Vector3,
    pub bounding_sphere: f32,
    pub bounds: Aabb,
    /// Index of the parent joint, resolved from the scene hierarchy.
    /// Joints cannot outlive the array this indexes.
    pub parent: Option<usize>,
}

/// The decoded skeleton.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Jnt1 {
    pub joints: Vec<Joint>,
    /// Maps scene hierarchy joint values to entries in [Jnt1::joints].
    pub remap: Vec<u16>,
}

impl Jnt1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        _options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;

        let joints_offset = reader.read_be::<u32>()?;
        let remap_offset = reader.read_be::<u32>()?;
        let names_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(remap_offset)))?;
        let mut remap = Vec::with_capacity(count as usize);
        for _ in 0..count {
            remap.push(reader.read_be::<u16>()?);
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(names_offset)))?;
        let names = read_string_table(reader, CHUNK)?;
        if names.len() != count as usize {
            let offset = chunk_start + u64::from(names_offset);
            return Err(Error::InvalidChunk {
                chunk: CHUNK,
                offset,
                reason: format!("{} names for {} joints", names.len(), count),
            });
        }

        let mut joints = Vec::with_capacity(count as usize);
        for (i, name) in names.into_iter().enumerate() {
            reader.seek(SeekFrom::Start(
                chunk_start + u64::from(joints_offset) + i as u64 * JOINT_ENTRY_SIZE,
            ))?;

            let matrix_type = reader.read_be::<u16>()?;
            let ignore_parent_scale = reader.read_be::<u8>()? != 0;
            expect_pad_u8(reader, CHUNK)?;

            let scale = read_vector3(reader)?;
            let rotation = Vector3::new(
                f32::from(reader.read_be::<i16>()?) * ROTATION_SCALE,
                f32::from(reader.read_be::<i16>()?) * ROTATION_SCALE,
                f32::from(reader.read_be::<i16>()?) * ROTATION_SCALE,
            );
            expect_pad_u16(reader, CHUNK)?;
            let translation = read_vector3(reader)?;

            let bounding_sphere = reader.read_be::<f32>()?;
            let bounds = Aabb {
                min: read_vector3(reader)?,
                max: read_vector3(reader)?,
            };

            joints.push(Joint {
                name,
                matrix_type,
                ignore_parent_scale,
                scale,
                rotation,
                translation,
                bounding_sphere,
                bounds,
                parent: None,
            });
        }

        Ok(Self { joints, remap })
    }

    /// Fills in parent joint indices from the scene hierarchy.
    pub(crate) fn assign_parents(&mut self, scene: &Inf1) {
        for (i, node) in scene.nodes.iter().enumerate() {
            let NodeKind::Joint(value) = node.kind else {
                continue;
            };
            let Some(&joint) = self.remap.get(usize::from(value)) else {
                tracing::warn!(value, "hierarchy joint value out of remap range");
                continue;
            };
            let parent = scene
                .parent_joint(i)
                .and_then(|p| self.remap.get(usize::from(p)).copied());
            if let Some(joint) = self.joints.get_mut(usize::from(joint)) {
                joint.parent = parent.map(usize::from);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn joint_entry(data: &mut Vec<u8>, translation: [f32; 3], rotation_y: i16) {
        data.extend_from_slice(&0u16.to_be_bytes());
        data.push(0);
        data.push(0xFF);
        for s in [1.0f32, 1.0, 1.0] {
            data.extend_from_slice(&s.to_be_bytes());
        }
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&rotation_y.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        for t in translation {
            data.extend_from_slice(&t.to_be_bytes());
        }
        data.extend_from_slice(&0f32.to_be_bytes());
        for _ in 0..6 {
            data.extend_from_slice(&0f32.to_be_bytes());
        }
    }

    #[test]
    fn rotation_is_scaled_to_degrees() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&24u32.to_be_bytes()); // joints
        data.extend_from_slice(&88u32.to_be_bytes()); // remap
        data.extend_from_slice(&90u32.to_be_bytes()); // names
        joint_entry(&mut data, [1.0, 2.0, 3.0], 16384);
        data.extend_from_slice(&0u16.to_be_bytes());
        // Name table with one entry, "root" at offset 8.
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(b"root\0");

        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let jnt1 = Jnt1::read(&mut reader, 0, 0, &DecodeOptions::default()).unwrap();

        assert_eq!(1, jnt1.joints.len());
        let joint = &jnt1.joints[0];
        assert_eq!("root", joint.name);
        assert_eq!(Vector3::new(0.0, 90.0, 0.0), joint.rotation);
        assert_eq!(Vector3::new(1.0, 2.0, 3.0), joint.translation);
        assert_eq!(None, joint.parent);
    }
}
