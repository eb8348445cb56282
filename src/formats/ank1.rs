//! `ANK1` joint animation decoding.
//!
//! One track per joint, each with nine Hermite channels covering scale,
//! rotation and translation per axis. Rotation values are fixed point
//! 16 bit angles scaled by a per file fraction shift; scale and
//! translation pools hold plain floats.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::keys::{read_anim_index, read_keys, scale_values};
use crate::{DecodeOptions, Keyframe, LoopMode};

const CHUNK: &str = "ANK1";

const ROTATION_SCALE: f32 = 180.0 / 32768.0;

/// The nine channels animating one joint, in X, Y, Z axis order.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointTrack {
    pub scale: [Vec<Keyframe>; 3],
    /// Rotation keys in degrees.
    pub rotation: [Vec<Keyframe>; 3],
    pub translation: [Vec<Keyframe>; 3],
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ank1 {
    pub loop_mode: LoopMode,
    pub length: u16,
    /// One track per joint, in skeleton order.
    pub tracks: Vec<JointTrack>,
}

impl Ank1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let loop_mode = LoopMode::from_raw(reader.read_be::<u8>()?, CHUNK, options)?;
        let rotation_fraction_bits = reader.read_be::<u8>()?;
        let length = reader.read_be::<u16>()?;
        let joint_count = reader.read_be::<u16>()?;
        let scale_count = reader.read_be::<u16>()?;
        let rotation_count = reader.read_be::<u16>()?;
        let translation_count = reader.read_be::<u16>()?;

        let track_offset = reader.read_be::<u32>()?;
        let scale_offset = reader.read_be::<u32>()?;
        let rotation_offset = reader.read_be::<u32>()?;
        let translation_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(scale_offset)))?;
        let mut scale_pool = Vec::with_capacity(usize::from(scale_count));
        for _ in 0..scale_count {
            scale_pool.push(reader.read_be::<f32>()?);
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(rotation_offset)))?;
        let mut rotation_pool = Vec::with_capacity(usize::from(rotation_count));
        for _ in 0..rotation_count {
            rotation_pool.push(f32::from(reader.read_be::<i16>()?));
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(translation_offset)))?;
        let mut translation_pool = Vec::with_capacity(usize::from(translation_count));
        for _ in 0..translation_count {
            translation_pool.push(reader.read_be::<f32>()?);
        }

        // Angles store an extra power of two shift on top of the 16 bit
        // fixed point split. Key times keep their raw values, so only the
        // value and tangent components are rescaled.
        let angle_scale = ROTATION_SCALE * (1 << rotation_fraction_bits) as f32;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(track_offset)))?;
        let mut tracks = Vec::with_capacity(usize::from(joint_count));
        for _ in 0..joint_count {
            let mut track = JointTrack::default();
            for axis in 0..3 {
                let scale_index = read_anim_index(reader, CHUNK, options)?;
                let rotation_index = read_anim_index(reader, CHUNK, options)?;
                let translation_index = read_anim_index(reader, CHUNK, options)?;

                track.scale[axis] = read_keys(&scale_pool, &scale_index, CHUNK)?;
                track.rotation[axis] = read_keys(&rotation_pool, &rotation_index, CHUNK)?;
                scale_values(&mut track.rotation[axis], angle_scale, angle_scale);
                track.translation[axis] =
                    read_keys(&translation_pool, &translation_index, CHUNK)?;
            }
            tracks.push(track);
        }

        Ok(Ank1 {
            loop_mode,
            length,
            tracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_fixed_point_rotation_track() {
        let mut data = vec![0u8; 8];
        data.push(0); // play once
        data.push(1); // one extra angle bit
        data.extend_from_slice(&20u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // joints
        data.extend_from_slice(&1u16.to_be_bytes()); // scale pool
        data.extend_from_slice(&1u16.to_be_bytes()); // rotation pool
        data.extend_from_slice(&1u16.to_be_bytes()); // translation pool
        for offset in [36u32, 90, 94, 96] {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        assert_eq!(36, data.len());

        // Nine constant channels, all referencing pool entry zero.
        for _ in 0..9 {
            data.extend_from_slice(&1u16.to_be_bytes());
            data.extend_from_slice(&0u16.to_be_bytes());
            data.extend_from_slice(&0u16.to_be_bytes());
        }
        assert_eq!(90, data.len());

        data.extend_from_slice(&2.0f32.to_be_bytes()); // scale pool
        // 8192 raw with one fraction bit is a 90 degree angle.
        data.extend_from_slice(&8192i16.to_be_bytes());
        data.extend_from_slice(&(-5.0f32).to_be_bytes()); // translation pool

        let chunk_size = data.len() as u32;
        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let ank1 = Ank1::read(&mut reader, 0, chunk_size, &DecodeOptions::default()).unwrap();

        assert_eq!(LoopMode::Once, ank1.loop_mode);
        assert_eq!(20, ank1.length);
        assert_eq!(1, ank1.tracks.len());

        let track = &ank1.tracks[0];
        assert_eq!(2.0, track.scale[0][0].value);
        assert_eq!(90.0, track.rotation[0][0].value);
        assert_eq!(-5.0, track.translation[2][0].value);
    }
}
