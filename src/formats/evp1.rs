//! `EVP1` weighted envelope decoding.
//!
//! Envelopes blend several joints into one skinning matrix. The chunk packs
//! per envelope influence counts, flat joint index and weight pools, and the
//! inverse bind matrices used when blending.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::{expect_pad_u16, SectionTable};
use crate::{DecodeOptions, Matrix3x4};

const CHUNK: &str = "EVP1";

/// One joint's contribution to an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Influence {
    pub joint: u16,
    pub weight: f32,
}

/// A weighted set of joint influences.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    pub influences: Vec<Influence>,
}

/// The decoded envelope chunk.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Evp1 {
    pub envelopes: Vec<Envelope>,
    /// Inverse bind matrices indexed by joint.
    pub inverse_binds: Vec<Matrix3x4>,
}

impl Evp1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        chunk_size: u32,
        _options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;

        // Influence counts, joint indices, weights, inverse binds.
        let sections = SectionTable::read(reader, CHUNK, chunk_start, chunk_size, 4)?;

        sections.seek_to(reader, 0)?;
        let mut influence_counts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            influence_counts.push(reader.read_be::<u8>()?);
        }

        let total: usize = influence_counts.iter().map(|&c| usize::from(c)).sum();

        sections.seek_to(reader, 1)?;
        let mut joints = Vec::with_capacity(total);
        for _ in 0..total {
            joints.push(reader.read_be::<u16>()?);
        }

        sections.seek_to(reader, 2)?;
        let mut weights = Vec::with_capacity(total);
        for _ in 0..total {
            weights.push(reader.read_be::<f32>()?);
        }

        let mut envelopes = Vec::with_capacity(count as usize);
        let mut cursor = 0;
        for influence_count in influence_counts {
            let influences = (0..influence_count)
                .map(|i| Influence {
                    joint: joints[cursor + usize::from(i)],
                    weight: weights[cursor + usize::from(i)],
                })
                .collect();
            cursor += usize::from(influence_count);
            envelopes.push(Envelope { influences });
        }

        // Inverse binds run to the end of the chunk. There is one per joint
        // referenced, not one per envelope.
        let matrix_count = sections.entry_count(3, 48);
        sections.seek_to(reader, 3)?;
        let mut inverse_binds = Vec::with_capacity(matrix_count);
        for _ in 0..matrix_count {
            let mut rows = [[0.0f32; 4]; 3];
            for row in rows.iter_mut() {
                for value in row.iter_mut() {
                    *value = reader.read_be::<f32>()?;
                }
            }
            inverse_binds.push(Matrix3x4 { rows });
        }

        Ok(Self {
            envelopes,
            inverse_binds,
        })
    }
}
