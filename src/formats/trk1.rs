//! `TRK1` TEV register color animation decoding.
//!
//! Each target animates one of a named material's TEV or konst color
//! registers with four independent Hermite channels, one per RGBA
//! component. Channel values come from shared per component pools of
//! 16 bit integers; decoding normalizes values to the 0..1 color range
//! and tangents to the matching per frame scale.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::keys::{read_anim_index, read_keys, scale_values, AnimIndex};
use crate::strings::read_string_table;
use crate::{DecodeOptions, Keyframe, LoopMode};

const CHUNK: &str = "TRK1";

const VALUE_SCALE: f32 = 1.0 / 255.0;
const TANGENT_SCALE: f32 = 1.0 / 65535.0;

/// Animates one color register of one material.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorTarget {
    pub material_name: String,
    /// Which of the four registers of the targeted kind to write.
    pub register_index: u8,
    /// Hermite channels in R, G, B, A order.
    pub channels: [Vec<Keyframe>; 4],
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trk1 {
    pub loop_mode: LoopMode,
    pub length: u16,
    /// Targets writing TEV color registers.
    pub register_targets: Vec<ColorTarget>,
    /// Targets writing konst color registers.
    pub konst_targets: Vec<ColorTarget>,
}

impl Trk1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let loop_mode = LoopMode::from_raw(reader.read_be::<u8>()?, CHUNK, options)?;
        let _angle_multiplier = reader.read_be::<u8>()?;
        let length = reader.read_be::<u16>()?;
        let register_count = reader.read_be::<u16>()?;
        let konst_count = reader.read_be::<u16>()?;

        let mut pool_counts = [0u16; 8];
        for count in pool_counts.iter_mut() {
            *count = reader.read_be::<u16>()?;
        }

        let register_data_offset = reader.read_be::<u32>()?;
        let konst_data_offset = reader.read_be::<u32>()?;
        // Remap tables exist in the layout but observed files keep them as
        // identity; targets resolve by material name instead.
        let _register_remap_offset = reader.read_be::<u32>()?;
        let _konst_remap_offset = reader.read_be::<u32>()?;
        let register_names_offset = reader.read_be::<u32>()?;
        let konst_names_offset = reader.read_be::<u32>()?;

        let mut pool_offsets = [0u32; 8];
        for offset in pool_offsets.iter_mut() {
            *offset = reader.read_be::<u32>()?;
        }

        let mut pools: [Vec<f32>; 8] = Default::default();
        for (pool, (&count, &offset)) in pools
            .iter_mut()
            .zip(pool_counts.iter().zip(pool_offsets.iter()))
        {
            reader.seek(SeekFrom::Start(chunk_start + u64::from(offset)))?;
            pool.reserve(usize::from(count));
            for _ in 0..count {
                pool.push(f32::from(reader.read_be::<i16>()?));
            }
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(register_names_offset)))?;
        let register_names = read_string_table(reader, CHUNK)?;
        reader.seek(SeekFrom::Start(chunk_start + u64::from(konst_names_offset)))?;
        let konst_names = read_string_table(reader, CHUNK)?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(register_data_offset)))?;
        let register_targets = read_targets(
            reader,
            register_count,
            &pools[0..4],
            &register_names,
            options,
        )?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(konst_data_offset)))?;
        let konst_targets =
            read_targets(reader, konst_count, &pools[4..8], &konst_names, options)?;

        Ok(Trk1 {
            loop_mode,
            length,
            register_targets,
            konst_targets,
        })
    }
}

fn read_targets<R: Read + Seek>(
    reader: &mut R,
    count: u16,
    pools: &[Vec<f32>],
    names: &[String],
    options: &DecodeOptions,
) -> Result<Vec<ColorTarget>, Error> {
    let mut targets = Vec::with_capacity(usize::from(count));
    for i in 0..usize::from(count) {
        let mut indices: [AnimIndex; 4] = Default::default();
        for index in indices.iter_mut() {
            *index = read_anim_index(reader, CHUNK, options)?;
        }
        let register_index = reader.read_be::<u8>()?;
        reader.seek(SeekFrom::Current(3))?;

        let mut channels: [Vec<Keyframe>; 4] = Default::default();
        for (channel, (pool, index)) in
            channels.iter_mut().zip(pools.iter().zip(indices.iter()))
        {
            *channel = read_keys(pool, index, CHUNK)?;
            scale_values(channel, VALUE_SCALE, TANGENT_SCALE);
        }

        let material_name = names.get(i).cloned().unwrap_or_else(|| {
            tracing::warn!(target = i, "animation target has no material name");
            String::new()
        });

        targets.push(ColorTarget {
            material_name,
            register_index,
            channels,
        });
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_single_register_target() {
        let mut data = vec![0u8; 8];
        data.push(2); // loop
        data.push(0);
        data.extend_from_slice(&10u16.to_be_bytes()); // length
        data.extend_from_slice(&1u16.to_be_bytes()); // register targets
        data.extend_from_slice(&0u16.to_be_bytes()); // konst targets
        // Pool counts: red has six values, the rest one.
        for count in [6u16, 1, 1, 1, 0, 0, 0, 0] {
            data.extend_from_slice(&count.to_be_bytes());
        }
        // Section offsets. The konst sections are empty; their offsets
        // are never dereferenced.
        for offset in [88u32, 88, 0, 0, 116, 130] {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        // Pool offsets: red 134, green 146, blue 148, alpha 150.
        for offset in [134u32, 146, 148, 150, 0, 0, 0, 0] {
            data.extend_from_slice(&offset.to_be_bytes());
        }

        assert_eq!(88, data.len());
        // Target entry: red animates two keys, the others hold one value.
        data.extend_from_slice(&2u16.to_be_bytes()); // red count
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // shared tangent stride
        for _ in 0..3 {
            data.extend_from_slice(&1u16.to_be_bytes()); // count 1
            data.extend_from_slice(&0u16.to_be_bytes());
            data.extend_from_slice(&0u16.to_be_bytes());
        }
        data.push(1); // register index
        data.extend_from_slice(&[0, 0, 0]);

        assert_eq!(116, data.len());
        // Register name table.
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(b"body\0");
        data.push(0); // align to 130

        assert_eq!(130, data.len());
        // Empty konst name table.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);

        assert_eq!(134, data.len());
        // Red pool: keys (t=0, v=0) and (t=10, v=255) packed as
        // time/value/tangent triples sharing one stride of three.
        // With count 2 and stride 3: t0, v0, tan0, t1, v1, tan1.
        for value in [0i16, 0, 0, 10, 255, 0] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        // Green, blue, alpha pools hold single values.
        for value in [51i16, 102, 255] {
            data.extend_from_slice(&value.to_be_bytes());
        }

        let chunk_size = data.len() as u32;
        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let trk1 = Trk1::read(&mut reader, 0, chunk_size, &DecodeOptions::default()).unwrap();

        assert_eq!(LoopMode::Loop, trk1.loop_mode);
        assert_eq!(10, trk1.length);
        assert_eq!(1, trk1.register_targets.len());
        assert!(trk1.konst_targets.is_empty());

        let target = &trk1.register_targets[0];
        assert_eq!("body", target.material_name);
        assert_eq!(1, target.register_index);
        assert_eq!(2, target.channels[0].len());
        assert_eq!(0.0, target.channels[0][0].value);
        assert_eq!(10.0, target.channels[0][1].time);
        assert_eq!(1.0, target.channels[0][1].value);
        assert_eq!(1, target.channels[1].len());
        assert_eq!(51.0 / 255.0, target.channels[1][0].value);
    }
}
