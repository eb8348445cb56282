//! `VTX1` compressed vertex attribute pool decoding.
//!
//! The chunk holds one bank of values per vertex attribute, shared by every
//! shape in the model. A format table describes how each bank is packed:
//! component count, component type, and for integer types the number of
//! fraction bits of the fixed point encoding.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::section_len;
use crate::{Color4f, DecodeOptions, Vector2, Vector3};

const CHUNK: &str = "VTX1";

/// Which vertex attribute a value belongs to.
///
/// The discriminants are the GX attribute ids used on the wire, shared by
/// the format table here and the shape attribute descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArrayType {
    PositionMatrixIndex,
    Position,
    Normal,
    Color0,
    Color1,
    Tex0,
    Tex1,
    Tex2,
    Tex3,
    Tex4,
    Tex5,
    Tex6,
    Tex7,
}

impl ArrayType {
    pub(crate) fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(ArrayType::PositionMatrixIndex),
            9 => Some(ArrayType::Position),
            10 => Some(ArrayType::Normal),
            11 => Some(ArrayType::Color0),
            12 => Some(ArrayType::Color1),
            13 => Some(ArrayType::Tex0),
            14 => Some(ArrayType::Tex1),
            15 => Some(ArrayType::Tex2),
            16 => Some(ArrayType::Tex3),
            17 => Some(ArrayType::Tex4),
            18 => Some(ArrayType::Tex5),
            19 => Some(ArrayType::Tex6),
            20 => Some(ArrayType::Tex7),
            _ => None,
        }
    }

    /// Tex coordinate slot for `TexN` variants.
    pub fn tex_slot(&self) -> Option<usize> {
        match self {
            ArrayType::Tex0 => Some(0),
            ArrayType::Tex1 => Some(1),
            ArrayType::Tex2 => Some(2),
            ArrayType::Tex3 => Some(3),
            ArrayType::Tex4 => Some(4),
            ArrayType::Tex5 => Some(5),
            ArrayType::Tex6 => Some(6),
            ArrayType::Tex7 => Some(7),
            _ => None,
        }
    }
}

/// Terminator id in the format table.
const ARRAY_TYPE_NULL: u32 = 0xFF;

/// Scalar component packing for geometry banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum ComponentType {
    Unsigned8,
    Signed8,
    Unsigned16,
    Signed16,
    Float32,
}

impl ComponentType {
    fn size(&self) -> u32 {
        match self {
            ComponentType::Unsigned8 | ComponentType::Signed8 => 1,
            ComponentType::Unsigned16 | ComponentType::Signed16 => 2,
            ComponentType::Float32 => 4,
        }
    }
}

/// Color packing for the color banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum ColorType {
    Rgb565,
    Rgb8,
    Rgbx8,
    Rgba4,
    Rgba6,
    Rgba8,
}

impl ColorType {
    fn size(&self) -> u32 {
        match self {
            ColorType::Rgb565 | ColorType::Rgba4 => 2,
            ColorType::Rgb8 | ColorType::Rgba6 => 3,
            ColorType::Rgbx8 | ColorType::Rgba8 => 4,
        }
    }
}

/// One format table entry, kept for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeFormat {
    pub array_type: ArrayType,
    pub component_count: u32,
    pub data_type: u32,
    pub fraction_bits: u8,
}

/// The decoded attribute pools, normalized to floats.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vtx1 {
    pub formats: Vec<AttributeFormat>,
    pub positions: Vec<Vector3>,
    pub normals: Vec<Vector3>,
    pub colors: [Vec<Color4f>; 2],
    pub tex_coords: [Vec<Vector2>; 8],
}

impl Vtx1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        chunk_size: u32,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let format_offset = reader.read_be::<u32>()?;

        // Data bank offsets: positions, normals, an unused NBT bank, two
        // color banks, then eight tex coordinate banks.
        let mut bank_offsets = [0u32; 13];
        for offset in bank_offsets.iter_mut() {
            *offset = reader.read_be::<u32>()?;
        }

        reader.seek(SeekFrom::Start(chunk_start + u64::from(format_offset)))?;
        let mut formats = Vec::new();
        loop {
            let raw_array = reader.read_be::<u32>()?;
            if raw_array == ARRAY_TYPE_NULL {
                break;
            }
            let component_count = reader.read_be::<u32>()?;
            let data_type = reader.read_be::<u32>()?;
            let fraction_bits = reader.read_be::<u8>()?;
            // Three pad bytes.
            reader.seek(SeekFrom::Current(3))?;

            match ArrayType::from_raw(raw_array) {
                Some(array_type) => formats.push(AttributeFormat {
                    array_type,
                    component_count,
                    data_type,
                    fraction_bits,
                }),
                None if options.strict => {
                    return Err(Error::Unsupported {
                        chunk: CHUNK,
                        what: "attribute array type",
                        value: raw_array,
                    })
                }
                None => {
                    tracing::warn!(raw_array, "skipping unknown vertex attribute bank");
                }
            }
        }

        let mut vtx1 = Vtx1 {
            formats,
            ..Default::default()
        };

        for i in 0..vtx1.formats.len() {
            let format = vtx1.formats[i];
            let Some(slot) = bank_slot(format.array_type) else {
                tracing::warn!(?format.array_type, "attribute has no data bank, skipping");
                continue;
            };
            let section = section_len(&bank_offsets, slot, chunk_size);
            if section == 0 {
                continue;
            }
            reader.seek(SeekFrom::Start(
                chunk_start + u64::from(bank_offsets[slot]),
            ))?;
            vtx1.read_bank(reader, &format, section, options)?;
        }

        Ok(vtx1)
    }

    fn read_bank<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        format: &AttributeFormat,
        section_bytes: u32,
        options: &DecodeOptions,
    ) -> Result<(), Error> {
        match format.array_type {
            ArrayType::Color0 | ArrayType::Color1 => {
                let Some(color_type) = color_type(format.data_type) else {
                    return unsupported(options, "color data type", format.data_type);
                };
                let count = section_bytes / color_type.size();
                let bank = if format.array_type == ArrayType::Color0 {
                    &mut self.colors[0]
                } else {
                    &mut self.colors[1]
                };
                bank.reserve(count as usize);
                for _ in 0..count {
                    bank.push(read_color(reader, color_type)?);
                }
            }
            ArrayType::Position => {
                let Some(component_type) = component_type(format.data_type) else {
                    return unsupported(options, "position data type", format.data_type);
                };
                // Component count 0 packs XY pairs, 1 packs XYZ.
                let components = if format.component_count == 0 { 2 } else { 3 };
                let count = section_bytes / (component_type.size() * components);
                for _ in 0..count {
                    let x = read_component(reader, component_type, format.fraction_bits)?;
                    let y = read_component(reader, component_type, format.fraction_bits)?;
                    let z = if components == 3 {
                        read_component(reader, component_type, format.fraction_bits)?
                    } else {
                        0.0
                    };
                    self.positions.push(Vector3::new(x, y, z));
                }
            }
            ArrayType::Normal => {
                let Some(component_type) = component_type(format.data_type) else {
                    return unsupported(options, "normal data type", format.data_type);
                };
                let count = section_bytes / (component_type.size() * 3);
                for _ in 0..count {
                    let x = read_component(reader, component_type, format.fraction_bits)?;
                    let y = read_component(reader, component_type, format.fraction_bits)?;
                    let z = read_component(reader, component_type, format.fraction_bits)?;
                    self.normals.push(Vector3::new(x, y, z));
                }
            }
            _ => {
                let Some(tex_slot) = format.array_type.tex_slot() else {
                    tracing::warn!(?format.array_type, "ignoring non-bank attribute format");
                    return Ok(());
                };
                let Some(component_type) = component_type(format.data_type) else {
                    return unsupported(options, "tex coord data type", format.data_type);
                };
                // Component count 0 packs lone S values, 1 packs ST pairs.
                let components = if format.component_count == 0 { 1 } else { 2 };
                let count = section_bytes / (component_type.size() * components);
                for _ in 0..count {
                    let s = read_component(reader, component_type, format.fraction_bits)?;
                    let t = if components == 2 {
                        read_component(reader, component_type, format.fraction_bits)?
                    } else {
                        0.0
                    };
                    self.tex_coords[tex_slot].push(Vector2::new(s, t));
                }
            }
        }
        Ok(())
    }
}

fn unsupported(options: &DecodeOptions, what: &'static str, value: u32) -> Result<(), Error> {
    if options.strict {
        return Err(Error::Unsupported {
            chunk: CHUNK,
            what,
            value,
        });
    }
    tracing::warn!(what, value, "unsupported packing, bank left empty");
    Ok(())
}

fn bank_slot(array_type: ArrayType) -> Option<usize> {
    match array_type {
        ArrayType::Position => Some(0),
        ArrayType::Normal => Some(1),
        ArrayType::Color0 => Some(3),
        ArrayType::Color1 => Some(4),
        _ => array_type.tex_slot().map(|t| 5 + t),
    }
}

fn component_type(data_type: u32) -> Option<ComponentType> {
    match data_type {
        0 => Some(ComponentType::Unsigned8),
        1 => Some(ComponentType::Signed8),
        2 => Some(ComponentType::Unsigned16),
        3 => Some(ComponentType::Signed16),
        4 => Some(ComponentType::Float32),
        _ => None,
    }
}

fn color_type(data_type: u32) -> Option<ColorType> {
    match data_type {
        0 => Some(ColorType::Rgb565),
        1 => Some(ColorType::Rgb8),
        2 => Some(ColorType::Rgbx8),
        3 => Some(ColorType::Rgba4),
        4 => Some(ColorType::Rgba6),
        5 => Some(ColorType::Rgba8),
        _ => None,
    }
}

/// Reads one fixed point or float component and normalizes it.
fn read_component<R: Read + Seek>(
    reader: &mut R,
    component_type: ComponentType,
    fraction_bits: u8,
) -> Result<f32, Error> {
    let divisor = (1u32 << fraction_bits) as f32;
    Ok(match component_type {
        ComponentType::Unsigned8 => f32::from(reader.read_be::<u8>()?) / divisor,
        ComponentType::Signed8 => f32::from(reader.read_be::<i8>()?) / divisor,
        ComponentType::Unsigned16 => f32::from(reader.read_be::<u16>()?) / divisor,
        ComponentType::Signed16 => f32::from(reader.read_be::<i16>()?) / divisor,
        ComponentType::Float32 => reader.read_be::<f32>()?,
    })
}

fn read_color<R: Read + Seek>(reader: &mut R, color_type: ColorType) -> Result<Color4f, Error> {
    Ok(match color_type {
        ColorType::Rgb565 => {
            let v = reader.read_be::<u16>()?;
            Color4f::new(
                ((v >> 11) & 0x1F) as f32 / 31.0,
                ((v >> 5) & 0x3F) as f32 / 63.0,
                (v & 0x1F) as f32 / 31.0,
                1.0,
            )
        }
        ColorType::Rgb8 => Color4f::new(
            f32::from(reader.read_be::<u8>()?) / 255.0,
            f32::from(reader.read_be::<u8>()?) / 255.0,
            f32::from(reader.read_be::<u8>()?) / 255.0,
            1.0,
        ),
        ColorType::Rgbx8 => {
            let color = Color4f::new(
                f32::from(reader.read_be::<u8>()?) / 255.0,
                f32::from(reader.read_be::<u8>()?) / 255.0,
                f32::from(reader.read_be::<u8>()?) / 255.0,
                1.0,
            );
            // The fourth byte is padding.
            reader.read_be::<u8>()?;
            color
        }
        ColorType::Rgba4 => {
            let v = reader.read_be::<u16>()?;
            Color4f::new(
                ((v >> 12) & 0xF) as f32 / 15.0,
                ((v >> 8) & 0xF) as f32 / 15.0,
                ((v >> 4) & 0xF) as f32 / 15.0,
                (v & 0xF) as f32 / 15.0,
            )
        }
        ColorType::Rgba6 => {
            let bytes = [
                reader.read_be::<u8>()?,
                reader.read_be::<u8>()?,
                reader.read_be::<u8>()?,
            ];
            let v = (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]);
            Color4f::new(
                ((v >> 18) & 0x3F) as f32 / 63.0,
                ((v >> 12) & 0x3F) as f32 / 63.0,
                ((v >> 6) & 0x3F) as f32 / 63.0,
                (v & 0x3F) as f32 / 63.0,
            )
        }
        ColorType::Rgba8 => Color4f::new(
            f32::from(reader.read_be::<u8>()?) / 255.0,
            f32::from(reader.read_be::<u8>()?) / 255.0,
            f32::from(reader.read_be::<u8>()?) / 255.0,
            f32::from(reader.read_be::<u8>()?) / 255.0,
        ),
    })
}
