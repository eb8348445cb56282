//! `DRW1` draw matrix table decoding.
//!
//! Each entry selects how one draw matrix slot is sourced: directly from a
//! joint's world transform, or blended from a weighted envelope.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::expect_pad_u16;
use crate::DecodeOptions;

const CHUNK: &str = "DRW1";

/// One draw matrix source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrawMatrix {
    /// The world transform of the joint at this index.
    Joint(u16),
    /// The blended transform of the envelope at this index.
    Envelope(u16),
}

/// The decoded draw matrix table.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Drw1 {
    pub matrices: Vec<DrawMatrix>,
}

impl Drw1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;

        let weighted_offset = reader.read_be::<u32>()?;
        let index_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(weighted_offset)))?;
        let mut weighted = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let flag = reader.read_be::<u8>()?;
            match flag {
                0 => weighted.push(false),
                1 => weighted.push(true),
                _ if options.strict => {
                    return Err(Error::Unsupported {
                        chunk: CHUNK,
                        what: "weighted flag",
                        value: u32::from(flag),
                    })
                }
                _ => {
                    tracing::warn!(flag, "unknown weighted flag, treating as weighted");
                    weighted.push(true);
                }
            }
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(index_offset)))?;
        let mut matrices = Vec::with_capacity(count as usize);
        for is_weighted in weighted {
            let index = reader.read_be::<u16>()?;
            matrices.push(if is_weighted {
                DrawMatrix::Envelope(index)
            } else {
                DrawMatrix::Joint(index)
            });
        }

        Ok(Self { matrices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_direct_and_weighted_entries() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&23u32.to_be_bytes());
        data.extend_from_slice(&[0, 1, 0]);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());

        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let drw1 = Drw1::read(&mut reader, 0, 0, &DecodeOptions::default()).unwrap();

        assert_eq!(
            vec![
                DrawMatrix::Joint(0),
                DrawMatrix::Envelope(4),
                DrawMatrix::Joint(1),
            ],
            drw1.matrices
        );
    }
}
