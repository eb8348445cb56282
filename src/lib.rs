//! # j3d_lib
//!
//! j3d_lib is a library for decoding the chunk based J3D binary formats used
//! by GameCube era games, including models (`.bmd`, `.bdl`), register color
//! animations (`.brk`), joint animations (`.bck`), and external material
//! tables (`.bmt`).
//!
//! Every file starts with the same container header: a four byte magic, a
//! four byte subtype, the total file size, a chunk count, and sixteen
//! reserved bytes. Chunks follow back to back, each starting with a four
//! byte tag and an inclusive byte size. Decoders seek freely inside their
//! chunk, so the dispatcher always advances to `chunk start + size` itself
//! rather than trusting the decoder's final position.
//!
//! All multi byte values are big endian.
//!
//! ## Reading
//! Use the typed entry points when the file kind is known up front:
/*!
```no_run
use j3d_lib::{Bmd, DecodeOptions};

let data = std::fs::read("model.bmd")?;
let model = Bmd::from_bytes(&data, &DecodeOptions::default())?;
println!("{} joints", model.joints.joints.len());
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
//! [J3dFile::read] dispatches on the subtype instead when the kind is not
//! known until runtime.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binread::{BinRead, BinReaderExt};

pub mod error;
pub mod formats;
pub mod keys;

pub(crate) mod section;
pub(crate) mod strings;

pub use error::Error;
pub use keys::{Keyframe, LoopMode};

use formats::ank1::Ank1;
use formats::drw1::Drw1;
use formats::evp1::Evp1;
use formats::inf1::Inf1;
use formats::jnt1::Jnt1;
use formats::mat3::Mat3;
use formats::shp1::Shp1;
use formats::tex1::Tex1;
use formats::trk1::Trk1;
use formats::vtx1::Vtx1;

/// The magic for model containers.
pub const MAGIC_J3D2: [u8; 4] = *b"J3D2";
/// The magic for animation containers.
pub const MAGIC_J3D1: [u8; 4] = *b"J3D1";

/// Settings controlling how tolerant decoding is.
///
/// Structural violations such as bad padding always fail. Semantic issues
/// such as unknown enum values normally log a warning and substitute a
/// default, but fail with [Error::Unsupported] when `strict` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub strict: bool,
}

/// A 2 component vector.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 3 component vector.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const ONE: Vector3 = Vector3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// An RGBA color with normalized float components.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4f {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// A row major 3x4 affine transform, the layout the envelope chunk stores
/// inverse bind matrices in.
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix3x4 {
    pub rows: [[f32; 4]; 3],
}

impl Default for Matrix3x4 {
    fn default() -> Self {
        Self {
            rows: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }
}

/// An axis aligned bounding box.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vector3,
    pub max: Vector3,
}

impl Aabb {
    /// A degenerate box suitable as the start of a union fold.
    pub(crate) fn empty() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    pub(crate) fn extend(&mut self, point: Vector3) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    pub(crate) fn union(&mut self, other: &Aabb) {
        self.extend(other.min);
        self.extend(other.max);
    }

    pub fn is_zero_volume(&self) -> bool {
        self.min == self.max
    }
}

pub(crate) fn read_vector3<R: Read + Seek>(reader: &mut R) -> Result<Vector3, Error> {
    Ok(Vector3::new(
        reader.read_be::<f32>()?,
        reader.read_be::<f32>()?,
        reader.read_be::<f32>()?,
    ))
}

/// The container header present at the start of every J3D file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub subtype: [u8; 4],
    pub file_size: u32,
    pub chunk_count: u32,
}

impl Header {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_J3D2 && magic != MAGIC_J3D1 {
            return Err(Error::UnexpectedMagic { found: magic });
        }

        let mut subtype = [0u8; 4];
        reader.read_exact(&mut subtype)?;

        let file_size = reader.read_be::<u32>()?;
        let chunk_count = reader.read_be::<u32>()?;

        // Sixteen reserved bytes, "SVR3" padding in shipped files.
        reader.seek(SeekFrom::Current(16))?;

        Ok(Self {
            magic,
            subtype,
            file_size,
            chunk_count,
        })
    }
}

/// One chunk's location inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkEntry {
    pub tag: [u8; 4],
    pub start: u64,
    pub size: u32,
}

/// Scans the chunk directory starting at the current position.
///
/// Only tags and sizes are read here. Chunk contents are decoded later by
/// seeking each entry, which keeps a misbehaving decoder from desyncing the
/// scan.
pub(crate) fn chunk_directory<R: Read + Seek>(
    reader: &mut R,
    chunk_count: u32,
) -> Result<Vec<ChunkEntry>, Error> {
    let mut entries = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        let start = reader.stream_position()?;
        let mut tag = [0u8; 4];
        reader.read_exact(&mut tag)?;
        let size = reader.read_be::<u32>()?;
        if size < 8 {
            return Err(Error::InvalidChunk {
                chunk: "container",
                offset: start,
                reason: format!("chunk size {size} is smaller than its own header"),
            });
        }
        entries.push(ChunkEntry { tag, start, size });

        reader.seek(SeekFrom::Start(start + u64::from(size)))?;
    }
    Ok(entries)
}

fn find_chunk<'a>(directory: &'a [ChunkEntry], tag: &[u8; 4]) -> Option<&'a ChunkEntry> {
    directory.iter().find(|e| &e.tag == tag)
}

fn require_chunk<'a>(
    directory: &'a [ChunkEntry],
    tag: &'static [u8; 4],
    name: &'static str,
) -> Result<&'a ChunkEntry, Error> {
    find_chunk(directory, tag).ok_or(Error::MissingChunk { tag: name })
}

fn seek_into_chunk<R: Read + Seek>(reader: &mut R, entry: &ChunkEntry) -> Result<(), Error> {
    // Skip the tag and size the directory scan already consumed.
    reader.seek(SeekFrom::Start(entry.start + 8))?;
    Ok(())
}

fn warn_unhandled(directory: &[ChunkEntry], handled: &[&[u8; 4]]) {
    for entry in directory {
        if !handled.iter().any(|tag| *tag == &entry.tag) {
            tracing::warn!(
                tag = %String::from_utf8_lossy(&entry.tag),
                offset = entry.start,
                "skipping unrecognized chunk"
            );
        }
    }
}

/// A decoded model container (`bmd3` or `bdl4` subtype).
///
/// `bdl4` files additionally carry an `MDL3` chunk of precompiled GPU
/// command lists, which duplicates the material data and is skipped.
#[derive(Debug)]
pub struct Bmd {
    pub header: Header,
    pub scene: Inf1,
    pub vertex_data: Vtx1,
    pub envelopes: Evp1,
    pub draw_table: Drw1,
    pub joints: Jnt1,
    pub shapes: Shp1,
    pub materials: Mat3,
    pub textures: Tex1,
}

impl Bmd {
    pub fn read<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self, Error> {
        let header = Header::read(reader)?;
        if &header.subtype != b"bmd3" && &header.subtype != b"bdl4" {
            return Err(Error::UnexpectedSubtype {
                found: header.subtype,
            });
        }

        let directory = chunk_directory(reader, header.chunk_count)?;
        warn_unhandled(
            &directory,
            &[
                b"INF1", b"VTX1", b"EVP1", b"DRW1", b"JNT1", b"SHP1", b"MAT3", b"TEX1", b"MDL3",
            ],
        );
        if find_chunk(&directory, b"MDL3").is_some() {
            tracing::debug!("skipping MDL3 precompiled display lists");
        }

        let entry = require_chunk(&directory, b"INF1", "INF1")?;
        seek_into_chunk(reader, entry)?;
        let scene = Inf1::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"VTX1", "VTX1")?;
        seek_into_chunk(reader, entry)?;
        let vertex_data = Vtx1::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"EVP1", "EVP1")?;
        seek_into_chunk(reader, entry)?;
        let envelopes = Evp1::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"DRW1", "DRW1")?;
        seek_into_chunk(reader, entry)?;
        let draw_table = Drw1::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"JNT1", "JNT1")?;
        seek_into_chunk(reader, entry)?;
        let mut joints = Jnt1::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"SHP1", "SHP1")?;
        seek_into_chunk(reader, entry)?;
        let shapes = Shp1::read(reader, entry.start, entry.size, &vertex_data, options)?;

        let entry = require_chunk(&directory, b"MAT3", "MAT3")?;
        seek_into_chunk(reader, entry)?;
        let materials = Mat3::read(reader, entry.start, entry.size, options)?;

        let entry = require_chunk(&directory, b"TEX1", "TEX1")?;
        seek_into_chunk(reader, entry)?;
        let textures = Tex1::read(reader, entry.start, entry.size, options)?;

        joints.assign_parents(&scene);

        Ok(Self {
            header,
            scene,
            vertex_data,
            envelopes,
            draw_table,
            joints,
            shapes,
            materials,
            textures,
        })
    }

    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(data), options)
    }

    /// The union of all shape bounding boxes.
    pub fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for shape in &self.shapes.shapes {
            bounds.union(&shape.bounds);
        }
        bounds
    }
}

/// A decoded register color animation container (`brk1` subtype).
#[derive(Debug)]
pub struct Brk {
    pub header: Header,
    pub register_anim: Trk1,
}

impl Brk {
    pub fn read<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self, Error> {
        let header = Header::read(reader)?;
        if &header.subtype != b"brk1" {
            return Err(Error::UnexpectedSubtype {
                found: header.subtype,
            });
        }

        let directory = chunk_directory(reader, header.chunk_count)?;
        warn_unhandled(&directory, &[b"TRK1"]);

        let entry = require_chunk(&directory, b"TRK1", "TRK1")?;
        seek_into_chunk(reader, entry)?;
        let register_anim = Trk1::read(reader, entry.start, entry.size, options)?;

        Ok(Self {
            header,
            register_anim,
        })
    }

    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(data), options)
    }
}

/// A decoded joint animation container (`bck1` subtype).
#[derive(Debug)]
pub struct Bck {
    pub header: Header,
    pub joint_anim: Ank1,
}

impl Bck {
    pub fn read<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self, Error> {
        let header = Header::read(reader)?;
        if &header.subtype != b"bck1" {
            return Err(Error::UnexpectedSubtype {
                found: header.subtype,
            });
        }

        let directory = chunk_directory(reader, header.chunk_count)?;
        warn_unhandled(&directory, &[b"ANK1"]);

        let entry = require_chunk(&directory, b"ANK1", "ANK1")?;
        seek_into_chunk(reader, entry)?;
        let joint_anim = Ank1::read(reader, entry.start, entry.size, options)?;

        Ok(Self { header, joint_anim })
    }

    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(data), options)
    }
}

/// A decoded external material table (`bmt3` subtype).
///
/// These carry replacement materials for a model, optionally with their own
/// textures. Either chunk may be absent.
#[derive(Debug)]
pub struct Bmt {
    pub header: Header,
    pub materials: Option<Mat3>,
    pub textures: Option<Tex1>,
}

impl Bmt {
    pub fn read<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self, Error> {
        let header = Header::read(reader)?;
        if &header.subtype != b"bmt3" {
            return Err(Error::UnexpectedSubtype {
                found: header.subtype,
            });
        }

        let directory = chunk_directory(reader, header.chunk_count)?;
        warn_unhandled(&directory, &[b"MAT3", b"TEX1"]);

        let materials = match find_chunk(&directory, b"MAT3") {
            Some(entry) => {
                seek_into_chunk(reader, entry)?;
                Some(Mat3::read(reader, entry.start, entry.size, options)?)
            }
            None => None,
        };

        let textures = match find_chunk(&directory, b"TEX1") {
            Some(entry) => {
                seek_into_chunk(reader, entry)?;
                Some(Tex1::read(reader, entry.start, entry.size, options)?)
            }
            None => None,
        };

        Ok(Self {
            header,
            materials,
            textures,
        })
    }

    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(data), options)
    }
}

/// Any supported J3D container, dispatched on the header subtype.
#[derive(Debug)]
pub enum J3dFile {
    Model(Bmd),
    RegisterAnimation(Brk),
    JointAnimation(Bck),
    MaterialTable(Bmt),
}

impl J3dFile {
    pub fn read<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self, Error> {
        let start = reader.stream_position()?;
        let header = Header::read(reader)?;
        reader.seek(SeekFrom::Start(start))?;

        match &header.subtype {
            b"bmd3" | b"bdl4" => Ok(J3dFile::Model(Bmd::read(reader, options)?)),
            b"brk1" => Ok(J3dFile::RegisterAnimation(Brk::read(reader, options)?)),
            b"bck1" => Ok(J3dFile::JointAnimation(Bck::read(reader, options)?)),
            b"bmt3" => Ok(J3dFile::MaterialTable(Bmt::read(reader, options)?)),
            _ => Err(Error::UnexpectedSubtype {
                found: header.subtype,
            }),
        }
    }

    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(data), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_unknown_magic() {
        let mut data = Vec::new();
        data.extend_from_slice(b"NARC");
        data.extend_from_slice(b"bmd3");
        data.extend_from_slice(&[0u8; 24]);

        let result = Header::read(&mut Cursor::new(data));
        assert!(matches!(
            result,
            Err(Error::UnexpectedMagic { found }) if &found == b"NARC"
        ));
    }

    #[test]
    fn directory_scan_is_insensitive_to_decoder_seeks() {
        // Two chunks back to back. The scan only trusts tag + size.
        let mut data = Vec::new();
        data.extend_from_slice(b"AAAA");
        data.extend_from_slice(&12u32.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(b"BBBB");
        data.extend_from_slice(&8u32.to_be_bytes());

        let directory = chunk_directory(&mut Cursor::new(data), 2).unwrap();
        assert_eq!(
            vec![
                ChunkEntry {
                    tag: *b"AAAA",
                    start: 0,
                    size: 12
                },
                ChunkEntry {
                    tag: *b"BBBB",
                    start: 12,
                    size: 8
                },
            ],
            directory
        );
    }

    #[test]
    fn directory_rejects_degenerate_chunk_size() {
        let mut data = Vec::new();
        data.extend_from_slice(b"AAAA");
        data.extend_from_slice(&4u32.to_be_bytes());

        let result = chunk_directory(&mut Cursor::new(data), 1);
        assert!(matches!(result, Err(Error::InvalidChunk { .. })));
    }
}
