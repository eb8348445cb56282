//! `TEX1` texture header decoding.
//!
//! Only the embedded BTI headers and the name table are decoded. Pixel
//! data stays in the file; `data_offset` locates it relative to each
//! header for callers that upload textures themselves.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::expect_pad_u16;
use crate::strings::read_string_table;
use crate::DecodeOptions;

const CHUNK: &str = "TEX1";

const HEADER_SIZE: u64 = 32;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureHeader {
    pub name: String,
    pub format: u8,
    pub alpha_enabled: bool,
    pub width: u16,
    pub height: u16,
    pub wrap_s: u8,
    pub wrap_t: u8,
    pub palette_format: u8,
    pub palette_count: u16,
    /// Palette bytes relative to this header's position in the file.
    pub palette_offset: u32,
    pub min_filter: u8,
    pub mag_filter: u8,
    pub min_lod: u8,
    pub max_lod: u8,
    pub mipmap_count: u8,
    pub lod_bias: i16,
    /// Pixel bytes relative to this header's position in the file.
    pub data_offset: u32,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tex1 {
    pub textures: Vec<TextureHeader>,
}

impl Tex1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        _options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;
        let header_offset = reader.read_be::<u32>()?;
        let name_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(name_offset)))?;
        let names = read_string_table(reader, CHUNK)?;
        if names.len() != usize::from(count) {
            tracing::warn!(
                names = names.len(),
                textures = count,
                "texture name count mismatch"
            );
        }

        let mut textures = Vec::with_capacity(usize::from(count));
        for i in 0..u64::from(count) {
            reader.seek(SeekFrom::Start(
                chunk_start + u64::from(header_offset) + i * HEADER_SIZE,
            ))?;
            let mut texture = read_header(reader)?;
            texture.name = names.get(i as usize).cloned().unwrap_or_default();
            textures.push(texture);
        }

        Ok(Tex1 { textures })
    }
}

fn read_header<R: Read + Seek>(reader: &mut R) -> Result<TextureHeader, Error> {
    let format = reader.read_be::<u8>()?;
    let alpha_enabled = reader.read_be::<u8>()? != 0;
    let width = reader.read_be::<u16>()?;
    let height = reader.read_be::<u16>()?;
    let wrap_s = reader.read_be::<u8>()?;
    let wrap_t = reader.read_be::<u8>()?;
    // Palettes enabled flag folds into palette_count being non zero.
    let _palettes_enabled = reader.read_be::<u8>()?;
    let palette_format = reader.read_be::<u8>()?;
    let palette_count = reader.read_be::<u16>()?;
    let palette_offset = reader.read_be::<u32>()?;
    // Border color, unused.
    reader.seek(SeekFrom::Current(4))?;
    let min_filter = reader.read_be::<u8>()?;
    let mag_filter = reader.read_be::<u8>()?;
    let min_lod = reader.read_be::<u8>()?;
    let max_lod = reader.read_be::<u8>()?;
    let mipmap_count = reader.read_be::<u8>()?;
    // One unknown byte.
    reader.seek(SeekFrom::Current(1))?;
    let lod_bias = reader.read_be::<i16>()?;
    let data_offset = reader.read_be::<u32>()?;

    Ok(TextureHeader {
        name: String::new(),
        format,
        alpha_enabled,
        width,
        height,
        wrap_s,
        wrap_t,
        palette_format,
        palette_count,
        palette_offset,
        min_filter,
        mag_filter,
        min_lod,
        max_lod,
        mipmap_count,
        lod_bias,
        data_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_header_and_name() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&52u32.to_be_bytes());

        // Header at 20: CMPR 64x32, one mipmap, pixels at 0x20.
        let mut header = vec![0u8; 32];
        header[0] = 0x0E;
        header[1] = 1;
        header[2..4].copy_from_slice(&64u16.to_be_bytes());
        header[4..6].copy_from_slice(&32u16.to_be_bytes());
        header[0x18] = 1;
        header[0x1C..0x20].copy_from_slice(&0x20u32.to_be_bytes());
        data.extend_from_slice(&header);

        // Name table at 52.
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(b"wood\0");

        let chunk_size = data.len() as u32;
        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let tex1 = Tex1::read(&mut reader, 0, chunk_size, &DecodeOptions::default()).unwrap();

        assert_eq!(1, tex1.textures.len());
        let texture = &tex1.textures[0];
        assert_eq!("wood", texture.name);
        assert_eq!(0x0E, texture.format);
        assert!(texture.alpha_enabled);
        assert_eq!((64, 32), (texture.width, texture.height));
        assert_eq!(1, texture.mipmap_count);
        assert_eq!(0x20, texture.data_offset);
    }
}
