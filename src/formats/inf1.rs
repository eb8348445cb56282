//! `INF1` scene hierarchy decoding.
//!
//! The chunk stores a flattened tree as a stream of `(type, value)` pairs.
//! Type 1 descends below the most recent node, type 2 ascends, and type 0
//! terminates the stream. The remaining types create joint, material, and
//! shape nodes whose values index the owning chunk's remap tables.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::expect_pad_u16;
use crate::DecodeOptions;

const CHUNK: &str = "INF1";

const NODE_END: u16 = 0x00;
const NODE_DOWN: u16 = 0x01;
const NODE_UP: u16 = 0x02;
const NODE_JOINT: u16 = 0x10;
const NODE_MATERIAL: u16 = 0x11;
const NODE_SHAPE: u16 = 0x12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Indexes the joint remap table.
    Joint(u16),
    /// Indexes the material remap table.
    Material(u16),
    /// Indexes the shape remap table.
    Shape(u16),
}

/// One node of the flattened hierarchy, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchyNode {
    pub kind: NodeKind,
    /// Index of the parent node in [Inf1::nodes], `None` for roots.
    pub parent: Option<usize>,
}

/// The decoded scene hierarchy.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inf1 {
    pub flags: u16,
    pub packet_count: u32,
    pub vertex_count: u32,
    /// Nodes in traversal order with resolved parent links.
    pub nodes: Vec<HierarchyNode>,
}

impl Inf1 {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        _chunk_size: u32,
        _options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let flags = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;
        let packet_count = reader.read_be::<u32>()?;
        let vertex_count = reader.read_be::<u32>()?;
        let hierarchy_offset = reader.read_be::<u32>()?;

        reader.seek(SeekFrom::Start(chunk_start + u64::from(hierarchy_offset)))?;

        // Parent links are resolved with an explicit stack. A "down" marker
        // pushes the most recent node, an "up" marker pops.
        let mut nodes = Vec::new();
        let mut stack: Vec<Option<usize>> = Vec::new();
        let mut last_node: Option<usize> = None;

        loop {
            let node_type = reader.read_be::<u16>()?;
            let value = reader.read_be::<u16>()?;

            match node_type {
                NODE_END => break,
                NODE_DOWN => stack.push(last_node),
                NODE_UP => {
                    if stack.pop().is_none() {
                        let offset = reader.stream_position()? - 4;
                        return Err(Error::InvalidChunk {
                            chunk: CHUNK,
                            offset,
                            reason: "hierarchy ascends above its root".to_string(),
                        });
                    }
                }
                NODE_JOINT | NODE_MATERIAL | NODE_SHAPE => {
                    let kind = match node_type {
                        NODE_JOINT => NodeKind::Joint(value),
                        NODE_MATERIAL => NodeKind::Material(value),
                        _ => NodeKind::Shape(value),
                    };
                    nodes.push(HierarchyNode {
                        kind,
                        parent: stack.last().copied().flatten(),
                    });
                    last_node = Some(nodes.len() - 1);
                }
                _ => {
                    tracing::warn!(node_type, value, "skipping unknown hierarchy node type");
                }
            }
        }

        Ok(Self {
            flags,
            packet_count,
            vertex_count,
            nodes,
        })
    }

    /// The nearest ancestor joint of `node`, if any.
    pub fn parent_joint(&self, node: usize) -> Option<u16> {
        let mut current = self.nodes[node].parent;
        while let Some(index) = current {
            if let NodeKind::Joint(joint) = self.nodes[index].kind {
                return Some(joint);
            }
            current = self.nodes[index].parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk_with_nodes(pairs: &[(u16, u16)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        // Hierarchy stream starts right after this 24 byte header, which
        // includes the 8 tag bytes the dispatcher consumed.
        data.extend_from_slice(&24u32.to_be_bytes());
        for (node_type, value) in pairs {
            data.extend_from_slice(&node_type.to_be_bytes());
            data.extend_from_slice(&value.to_be_bytes());
        }
        data
    }

    fn read_inf1(data: &[u8]) -> Result<Inf1, Error> {
        // The stream below lacks the tag and size, so chunk_start is -8
        // relative to the buffer. Prepend 8 dummy bytes instead.
        let mut full = vec![0u8; 8];
        full.extend_from_slice(data);
        let mut reader = Cursor::new(full);
        reader.set_position(8);
        Inf1::read(
            &mut reader,
            0,
            data.len() as u32 + 8,
            &DecodeOptions::default(),
        )
    }

    #[test]
    fn parents_follow_the_traversal_stack() {
        // joint 0 -> (material 0 -> (shape 0), joint 1)
        let inf1 = read_inf1(&chunk_with_nodes(&[
            (NODE_JOINT, 0),
            (NODE_DOWN, 0),
            (NODE_MATERIAL, 0),
            (NODE_DOWN, 0),
            (NODE_SHAPE, 0),
            (NODE_UP, 0),
            (NODE_JOINT, 1),
            (NODE_UP, 0),
            (NODE_END, 0),
        ]))
        .unwrap();

        assert_eq!(4, inf1.nodes.len());
        assert_eq!(None, inf1.nodes[0].parent);
        assert_eq!(Some(0), inf1.nodes[1].parent);
        assert_eq!(Some(1), inf1.nodes[2].parent);
        assert_eq!(Some(0), inf1.nodes[3].parent);

        assert_eq!(Some(0), inf1.parent_joint(3));
        assert_eq!(None, inf1.parent_joint(0));
    }

    #[test]
    fn unbalanced_up_marker_is_an_error() {
        let result = read_inf1(&chunk_with_nodes(&[(NODE_UP, 0), (NODE_END, 0)]));
        assert!(matches!(result, Err(Error::InvalidChunk { .. })));
    }
}
