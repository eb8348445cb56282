//! `SHP1` shape decoding.
//!
//! Shapes reference the shared attribute pools from `VTX1` through packed
//! index streams. Each shape carries a list of enabled attributes and a
//! series of packets; every packet pairs a primitive index stream with a
//! skin matrix table slice used for GPU side skinning. Primitives are
//! normalized to plain triangle lists while decoding, with the referenced
//! pool values copied out into dense per packet vertex buffers.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::formats::vtx1::{ArrayType, Vtx1};
use crate::section::{expect_pad_u16, expect_pad_u8};
use crate::{read_vector3, Aabb, Color4f, DecodeOptions, Vector2, Vector3};

const CHUNK: &str = "SHP1";

const SHAPE_ENTRY_SIZE: u64 = 0x28;

/// GX display list opcodes for the topologies we can triangulate.
const PRIM_TRIANGLES: u8 = 0x90;
const PRIM_TRIANGLE_STRIP: u8 = 0x98;
const PRIM_TRIANGLE_FAN: u8 = 0xA0;

/// Marks a skin matrix slot that reuses the value a prior packet loaded.
const MATRIX_SENTINEL: u16 = 0xFFFF;

/// One attribute enabled for a shape's index streams.
///
/// `array_type` is `None` for ids this crate does not consume; the index
/// bytes are still skipped so the stream stays aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexAttribute {
    pub array_type: Option<ArrayType>,
    pub data_type: u32,
}

/// A fully resolved triangle list vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vertex {
    /// Index into the packet's skin matrix table, 0 when the stream has no
    /// position matrix attribute.
    pub matrix_index: u16,
    pub position: Vector3,
    pub normal: Vector3,
    pub colors: [Color4f; 2],
    pub tex_coords: [Vector2; 8],
}

/// A drawable slice of a shape.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    /// Indices into the model's draw matrix array, sentinel free after the
    /// backfill pass.
    pub matrix_table: Vec<u16>,
    /// Triangle list vertices, three per triangle.
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    pub matrix_type: u8,
    pub attributes: Vec<VertexAttribute>,
    pub bounding_sphere: f32,
    pub bounds: Aabb,
    pub packets: Vec<Packet>,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shp1 {
    pub shapes: Vec<Shape>,
    pub remap: Vec<u16>,
}

impl Shp1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        vertex_data: &Vtx1,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let shape_count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;

        let shape_offset = reader.read_be::<u32>()?;
        let remap_offset = reader.read_be::<u32>()?;
        let unused = reader.read_be::<u32>()?;
        if unused != 0 {
            tracing::warn!(unused, "unexpected value in unused shape table slot");
        }
        let attribute_offset = reader.read_be::<u32>()?;
        let matrix_table_offset = reader.read_be::<u32>()?;
        let primitive_data_offset = reader.read_be::<u32>()?;
        let matrix_data_offset = reader.read_be::<u32>()?;
        let packet_location_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(remap_offset)))?;
        let mut remap = Vec::with_capacity(usize::from(shape_count));
        for _ in 0..shape_count {
            remap.push(reader.read_be::<u16>()?);
        }

        let mut shapes = Vec::with_capacity(usize::from(shape_count));
        for i in 0..u64::from(shape_count) {
            reader.seek(SeekFrom::Start(
                chunk_start + u64::from(shape_offset) + i * SHAPE_ENTRY_SIZE,
            ))?;
            let matrix_type = reader.read_be::<u8>()?;
            expect_pad_u8(reader, CHUNK)?;
            let packet_count = reader.read_be::<u16>()?;
            let attribute_byte_offset = reader.read_be::<u16>()?;
            let first_matrix_index = reader.read_be::<u16>()?;
            let first_packet_index = reader.read_be::<u16>()?;
            expect_pad_u16(reader, CHUNK)?;
            let bounding_sphere = reader.read_be::<f32>()?;
            let bounds = Aabb {
                min: read_vector3(reader)?,
                max: read_vector3(reader)?,
            };

            reader.seek(SeekFrom::Start(
                chunk_start + u64::from(attribute_offset) + u64::from(attribute_byte_offset),
            ))?;
            let attributes = read_attributes(reader, options)?;

            let mut packets = Vec::with_capacity(usize::from(packet_count));
            for p in 0..u64::from(packet_count) {
                let entry = u64::from(first_packet_index) + p;
                reader.seek(SeekFrom::Start(
                    chunk_start + u64::from(packet_location_offset) + entry * 8,
                ))?;
                let packet_size = reader.read_be::<u32>()?;
                let packet_offset = reader.read_be::<u32>()?;

                let entry = u64::from(first_matrix_index) + p;
                reader.seek(SeekFrom::Start(
                    chunk_start + u64::from(matrix_data_offset) + entry * 8,
                ))?;
                let _matrix_unknown = reader.read_be::<u16>()?;
                let matrix_count = reader.read_be::<u16>()?;
                let matrix_first_index = reader.read_be::<u32>()?;

                reader.seek(SeekFrom::Start(
                    chunk_start
                        + u64::from(matrix_table_offset)
                        + u64::from(matrix_first_index) * 2,
                ))?;
                let mut matrix_table = Vec::with_capacity(usize::from(matrix_count));
                for _ in 0..matrix_count {
                    matrix_table.push(reader.read_be::<u16>()?);
                }

                let mut packet = Packet {
                    matrix_table,
                    vertices: Vec::new(),
                };
                read_primitives(
                    reader,
                    chunk_start + u64::from(primitive_data_offset) + u64::from(packet_offset),
                    packet_size,
                    &attributes,
                    vertex_data,
                    options,
                    &mut packet,
                )?;
                packets.push(packet);
            }

            backfill_matrix_tables(&mut packets)?;

            let mut shape = Shape {
                matrix_type,
                attributes,
                bounding_sphere,
                bounds,
                packets,
            };
            // Some shapes store placeholder bounds with no extent.
            if shape.bounds.is_zero_volume() {
                shape.bounds = bounds_from_packets(&shape.packets);
            }
            shapes.push(shape);
        }

        Ok(Shp1 { shapes, remap })
    }
}

fn read_attributes<R: Read + Seek>(
    reader: &mut R,
    options: &DecodeOptions,
) -> Result<Vec<VertexAttribute>, Error> {
    let mut attributes = Vec::new();
    loop {
        let raw_array = reader.read_be::<u32>()?;
        if raw_array == 0xFF {
            break;
        }
        let data_type = reader.read_be::<u32>()?;
        let array_type = ArrayType::from_raw(raw_array);
        if array_type.is_none() {
            if options.strict {
                return Err(Error::Unsupported {
                    chunk: CHUNK,
                    what: "shape attribute array type",
                    value: raw_array,
                });
            }
            tracing::warn!(raw_array, "ignoring unknown shape attribute");
        }
        attributes.push(VertexAttribute {
            array_type,
            data_type,
        });
    }
    Ok(attributes)
}

fn read_primitives<R: Read + Seek>(
    reader: &mut R,
    stream_start: u64,
    stream_size: u32,
    attributes: &[VertexAttribute],
    vertex_data: &Vtx1,
    options: &DecodeOptions,
    packet: &mut Packet,
) -> Result<(), Error> {
    reader.seek(SeekFrom::Start(stream_start))?;
    let stream_end = stream_start + u64::from(stream_size);

    while reader.stream_position()? < stream_end {
        let primitive_type = reader.read_be::<u8>()?;
        if primitive_type == 0 {
            break;
        }
        let vertex_count = reader.read_be::<u16>()?;

        // The indices always have to be consumed to keep the stream
        // aligned, even for topologies we cannot triangulate.
        let mut vertices = Vec::with_capacity(usize::from(vertex_count));
        for _ in 0..vertex_count {
            vertices.push(read_vertex(reader, attributes, vertex_data, options)?);
        }

        emit_triangles(packet, primitive_type, &vertices);
    }

    Ok(())
}

/// Reads one vertex's per attribute indices and resolves them against the
/// shared pools.
fn read_vertex<R: Read + Seek>(
    reader: &mut R,
    attributes: &[VertexAttribute],
    vertex_data: &Vtx1,
    options: &DecodeOptions,
) -> Result<(Vertex, Vec<u16>), Error> {
    let mut vertex = Vertex::default();
    let mut raw_indices = Vec::with_capacity(attributes.len());

    for attribute in attributes {
        let offset = reader.stream_position()?;
        let index = match attribute.data_type {
            0 | 1 => u16::from(reader.read_be::<u8>()?),
            2 | 3 => reader.read_be::<u16>()?,
            other => {
                if options.strict {
                    return Err(Error::Unsupported {
                        chunk: CHUNK,
                        what: "attribute index width",
                        value: other,
                    });
                }
                tracing::warn!(data_type = other, "unsupported attribute index width");
                raw_indices.push(0);
                continue;
            }
        };
        raw_indices.push(index);

        let i = usize::from(index);
        match attribute.array_type {
            // The raw encoding stores the matrix index premultiplied by 3.
            Some(ArrayType::PositionMatrixIndex) => vertex.matrix_index = index / 3,
            Some(ArrayType::Position) => {
                vertex.position = pool_value(&vertex_data.positions, i, "position", offset)?;
            }
            Some(ArrayType::Normal) => {
                vertex.normal = pool_value(&vertex_data.normals, i, "normal", offset)?;
            }
            Some(ArrayType::Color0) => {
                vertex.colors[0] = pool_value(&vertex_data.colors[0], i, "color 0", offset)?;
            }
            Some(ArrayType::Color1) => {
                vertex.colors[1] = pool_value(&vertex_data.colors[1], i, "color 1", offset)?;
            }
            Some(tex) => {
                if let Some(slot) = tex.tex_slot() {
                    vertex.tex_coords[slot] =
                        pool_value(&vertex_data.tex_coords[slot], i, "tex coord", offset)?;
                }
            }
            None => {}
        }
    }

    Ok((vertex, raw_indices))
}

fn pool_value<T: Copy>(
    pool: &[T],
    index: usize,
    what: &str,
    offset: u64,
) -> Result<T, Error> {
    pool.get(index).copied().ok_or_else(|| Error::InvalidChunk {
        chunk: CHUNK,
        offset,
        reason: format!("{what} index {index} out of range ({} entries)", pool.len()),
    })
}

/// Normalizes one primitive into the packet's triangle list.
fn emit_triangles(packet: &mut Packet, primitive_type: u8, vertices: &[(Vertex, Vec<u16>)]) {
    match primitive_type {
        PRIM_TRIANGLES => {
            for triangle in vertices.chunks_exact(3) {
                push_triangle(packet, &triangle[0], &triangle[1], &triangle[2]);
            }
        }
        PRIM_TRIANGLE_STRIP => {
            for i in 2..vertices.len() {
                if i % 2 == 1 {
                    push_triangle(packet, &vertices[i - 2], &vertices[i], &vertices[i - 1]);
                } else {
                    push_triangle(packet, &vertices[i - 2], &vertices[i - 1], &vertices[i]);
                }
            }
        }
        PRIM_TRIANGLE_FAN => {
            for i in 1..vertices.len().saturating_sub(1) {
                push_triangle(packet, &vertices[i], &vertices[i + 1], &vertices[0]);
            }
        }
        other => {
            tracing::warn!(
                primitive_type = other,
                "unsupported primitive topology, skipping"
            );
        }
    }
}

fn push_triangle(
    packet: &mut Packet,
    a: &(Vertex, Vec<u16>),
    b: &(Vertex, Vec<u16>),
    c: &(Vertex, Vec<u16>),
) {
    // Two identical index tuples make the triangle degenerate.
    if a.1 == b.1 || b.1 == c.1 || a.1 == c.1 {
        tracing::debug!("skipping degenerate triangle");
        return;
    }
    packet.vertices.push(a.0);
    packet.vertices.push(b.0);
    packet.vertices.push(c.0);
}

/// Replaces skin matrix sentinels with the value a prior packet loaded at
/// the same table slot.
fn backfill_matrix_tables(packets: &mut [Packet]) -> Result<(), Error> {
    for i in 0..packets.len() {
        for j in 0..packets[i].matrix_table.len() {
            if packets[i].matrix_table[j] != MATRIX_SENTINEL {
                continue;
            }
            let inherited = packets[..i]
                .iter()
                .rev()
                .filter_map(|prior| prior.matrix_table.get(j).copied())
                .find(|&value| value != MATRIX_SENTINEL);
            match inherited {
                Some(value) => packets[i].matrix_table[j] = value,
                None => {
                    return Err(Error::InvalidChunk {
                        chunk: CHUNK,
                        offset: 0,
                        reason: format!(
                            "packet {i} matrix slot {j} has no prior value to inherit"
                        ),
                    })
                }
            }
        }
    }
    Ok(())
}

fn bounds_from_packets(packets: &[Packet]) -> Aabb {
    let mut bounds = Aabb::empty();
    let mut any = false;
    for packet in packets {
        for vertex in &packet.vertices {
            bounds.extend(vertex.position);
            any = true;
        }
    }
    if any {
        bounds
    } else {
        Aabb::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn indexed(index: u16) -> (Vertex, Vec<u16>) {
        let vertex = Vertex {
            position: Vector3::new(f32::from(index), 0.0, 0.0),
            ..Default::default()
        };
        (vertex, vec![index])
    }

    fn positions(packet: &Packet) -> Vec<f32> {
        packet.vertices.iter().map(|v| v.position.x).collect()
    }

    #[test]
    fn strip_alternates_winding() {
        let mut packet = Packet::default();
        let vertices: Vec<_> = (0..5).map(indexed).collect();
        emit_triangles(&mut packet, PRIM_TRIANGLE_STRIP, &vertices);

        assert_eq!(
            vec![0.0, 1.0, 2.0, 1.0, 3.0, 2.0, 2.0, 3.0, 4.0],
            positions(&packet)
        );
    }

    #[test]
    fn fan_pivots_on_first_vertex() {
        let mut packet = Packet::default();
        let vertices: Vec<_> = (0..5).map(indexed).collect();
        emit_triangles(&mut packet, PRIM_TRIANGLE_FAN, &vertices);

        assert_eq!(
            vec![1.0, 2.0, 0.0, 2.0, 3.0, 0.0, 3.0, 4.0, 0.0],
            positions(&packet)
        );
    }

    #[test]
    fn degenerate_strip_window_is_skipped() {
        let mut packet = Packet::default();
        let vertices = vec![indexed(0), indexed(0), indexed(1)];
        emit_triangles(&mut packet, PRIM_TRIANGLE_STRIP, &vertices);

        assert!(packet.vertices.is_empty());
    }

    #[test]
    fn sentinel_slots_inherit_from_prior_packets() {
        let mut packets = vec![
            Packet {
                matrix_table: vec![5],
                vertices: Vec::new(),
            },
            Packet {
                matrix_table: vec![MATRIX_SENTINEL],
                vertices: Vec::new(),
            },
            Packet {
                matrix_table: vec![MATRIX_SENTINEL],
                vertices: Vec::new(),
            },
        ];
        backfill_matrix_tables(&mut packets).unwrap();

        assert_eq!(vec![5], packets[1].matrix_table);
        assert_eq!(vec![5], packets[2].matrix_table);
    }

    #[test]
    fn sentinel_without_prior_value_fails() {
        let mut packets = vec![Packet {
            matrix_table: vec![MATRIX_SENTINEL],
            vertices: Vec::new(),
        }];

        assert!(backfill_matrix_tables(&mut packets).is_err());
    }

    #[test]
    fn decodes_single_packet_shape() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        for offset in [44u32, 84, 0, 88, 104, 124, 108, 116] {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        // Shape record at 44, placeholder bounds.
        data.push(0);
        data.push(0xFF);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        for _ in 0..7 {
            data.extend_from_slice(&0f32.to_be_bytes());
        }
        // Remap table at 84.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        // Attribute table at 88: positions with u16 indices.
        data.extend_from_slice(&9u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&0xFFu32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        // Skin index pool at 104.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        // Matrix data at 108.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        // Packet location at 116.
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        // Primitive stream at 124: one triangle then a terminator byte.
        data.push(PRIM_TRIANGLES);
        data.extend_from_slice(&3u16.to_be_bytes());
        for index in [0u16, 1, 2] {
            data.extend_from_slice(&index.to_be_bytes());
        }
        data.push(0);

        let vertex_data = Vtx1 {
            positions: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            ..Default::default()
        };

        let chunk_size = data.len() as u32;
        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let shp1 = Shp1::read(
            &mut reader,
            0,
            chunk_size,
            &vertex_data,
            &DecodeOptions::default(),
        )
        .unwrap();

        assert_eq!(1, shp1.shapes.len());
        let shape = &shp1.shapes[0];
        assert_eq!(1, shape.packets.len());
        assert_eq!(3, shape.packets[0].vertices.len());
        assert_eq!(vec![0], shape.packets[0].matrix_table);
        // Placeholder bounds are replaced by the packet extents.
        assert_eq!(Vector3::new(0.0, 0.0, 0.0), shape.bounds.min);
        assert_eq!(Vector3::new(1.0, 1.0, 0.0), shape.bounds.max);
    }
}
