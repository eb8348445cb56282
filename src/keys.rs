//! Keyframe storage shared by the animation chunks.
//!
//! `TRK1` and `ANK1` both pack their curves as shared pools of raw values
//! indexed by `(count, index, tangent mode)` triples. A count of one means a
//! constant channel holding a single value. Otherwise keys are packed with a
//! stride of three values `(time, value, tangent)` or four values
//! `(time, value, tangent in, tangent out)` depending on the tangent mode.

use std::io::{Read, Seek};

use binread::BinReaderExt;

use crate::error::Error;
use crate::DecodeOptions;

/// How playback continues after the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopMode {
    /// Play once and hold the final frame. Raw values 0 and 1 both map here.
    #[default]
    Once,
    /// Wrap back to frame zero. Raw value 2.
    Loop,
    /// Play forward then backward once. Raw value 3.
    YoYo,
    /// Play forward then backward, repeating. Raw value 4.
    YoYoLoop,
}

impl LoopMode {
    pub(crate) fn from_raw(
        value: u8,
        chunk: &'static str,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        match value {
            0 | 1 => Ok(LoopMode::Once),
            2 => Ok(LoopMode::Loop),
            3 => Ok(LoopMode::YoYo),
            4 => Ok(LoopMode::YoYoLoop),
            _ if options.strict => Err(Error::Unsupported {
                chunk,
                what: "loop mode",
                value: u32::from(value),
            }),
            _ => {
                tracing::warn!(chunk, value, "unknown loop mode, playing once");
                Ok(LoopMode::Once)
            }
        }
    }
}

/// A single Hermite key on an animation channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub tangent_in: f32,
    pub tangent_out: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TangentMode {
    /// One shared tangent per key, packed with a stride of three.
    #[default]
    In,
    /// Separate in and out tangents, packed with a stride of four.
    InOut,
}

/// The `(count, index, tangent mode)` triple referencing a value pool.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AnimIndex {
    pub count: u16,
    pub index: u16,
    pub tangent_mode: TangentMode,
}

pub(crate) fn read_anim_index<R: Read + Seek>(
    reader: &mut R,
    chunk: &'static str,
    options: &DecodeOptions,
) -> Result<AnimIndex, Error> {
    let count = reader.read_be::<u16>()?;
    let index = reader.read_be::<u16>()?;
    let raw_mode = reader.read_be::<u16>()?;

    let tangent_mode = match raw_mode {
        0 => TangentMode::In,
        1 => TangentMode::InOut,
        _ if options.strict => {
            return Err(Error::Unsupported {
                chunk,
                what: "tangent mode",
                value: u32::from(raw_mode),
            })
        }
        _ => {
            tracing::warn!(chunk, raw_mode, "unknown tangent mode, assuming shared");
            TangentMode::In
        }
    };

    Ok(AnimIndex {
        count,
        index,
        tangent_mode,
    })
}

/// Expands an index triple against its value pool into keyframes.
///
/// The pool bounds are checked up front, so a descriptor pointing past
/// its pool fails the decode instead of producing a truncated channel.
pub(crate) fn read_keys(
    pool: &[f32],
    index: &AnimIndex,
    chunk: &'static str,
) -> Result<Vec<Keyframe>, Error> {
    let base = index.index as usize;
    let stride = match index.tangent_mode {
        TangentMode::In => 3,
        TangentMode::InOut => 4,
    };
    let needed = if index.count == 1 {
        base + 1
    } else {
        base + stride * index.count as usize
    };
    if needed > pool.len() {
        return Err(Error::InvalidChunk {
            chunk,
            offset: 0,
            reason: format!(
                "keyframe descriptor needs {needed} pool values, pool has {}",
                pool.len()
            ),
        });
    }

    if index.count == 1 {
        return Ok(vec![Keyframe {
            time: 0.0,
            value: pool[base],
            tangent_in: 0.0,
            tangent_out: 0.0,
        }]);
    }

    let mut keys = Vec::with_capacity(index.count as usize);
    for j in 0..index.count as usize {
        let key = match index.tangent_mode {
            TangentMode::In => {
                let tangent = pool[base + 3 * j + 2];
                Keyframe {
                    time: pool[base + 3 * j],
                    value: pool[base + 3 * j + 1],
                    tangent_in: tangent,
                    tangent_out: tangent,
                }
            }
            TangentMode::InOut => Keyframe {
                time: pool[base + 4 * j],
                value: pool[base + 4 * j + 1],
                tangent_in: pool[base + 4 * j + 2],
                tangent_out: pool[base + 4 * j + 3],
            },
        };
        keys.push(key);
    }

    Ok(keys)
}

/// Scales values and tangents in place, used for fixed point rotation
/// channels and color normalization.
pub(crate) fn scale_values(keys: &mut [Keyframe], value_scale: f32, tangent_scale: f32) {
    for key in keys {
        key.value *= value_scale;
        key.tangent_in *= tangent_scale;
        key.tangent_out *= tangent_scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_is_constant_at_time_zero() {
        let pool = [7.0, 3.5];
        let index = AnimIndex {
            count: 1,
            index: 1,
            tangent_mode: TangentMode::In,
        };

        let keys = read_keys(&pool, &index, "TRK1").unwrap();
        assert_eq!(
            vec![Keyframe {
                time: 0.0,
                value: 3.5,
                tangent_in: 0.0,
                tangent_out: 0.0,
            }],
            keys
        );
    }

    #[test]
    fn shared_tangent_keys_use_stride_three() {
        let pool = [0.0, 1.0, 0.5, 10.0, 2.0, 0.25];
        let index = AnimIndex {
            count: 2,
            index: 0,
            tangent_mode: TangentMode::In,
        };

        let keys = read_keys(&pool, &index, "TRK1").unwrap();
        assert_eq!(2, keys.len());
        assert_eq!(10.0, keys[1].time);
        assert_eq!(2.0, keys[1].value);
        assert_eq!(0.25, keys[1].tangent_in);
        assert_eq!(0.25, keys[1].tangent_out);
    }

    #[test]
    fn split_tangent_keys_use_stride_four() {
        let pool = [0.0, 1.0, 0.5, -0.5, 10.0, 2.0, 0.25, -0.25];
        let index = AnimIndex {
            count: 2,
            index: 0,
            tangent_mode: TangentMode::InOut,
        };

        let keys = read_keys(&pool, &index, "ANK1").unwrap();
        assert_eq!(0.5, keys[0].tangent_in);
        assert_eq!(-0.5, keys[0].tangent_out);
        assert_eq!(0.25, keys[1].tangent_in);
        assert_eq!(-0.25, keys[1].tangent_out);
    }

    #[test]
    fn descriptor_past_the_pool_is_an_error() {
        let pool = [0.0, 1.0, 0.5];
        let index = AnimIndex {
            count: 2,
            index: 0,
            tangent_mode: TangentMode::In,
        };

        let result = read_keys(&pool, &index, "TRK1");
        assert!(matches!(result, Err(Error::InvalidChunk { .. })));
    }
}
