//! Offset table resolution shared by the chunk decoders.
//!
//! Most J3D chunks start with a table of byte offsets relative to the chunk
//! start. Unused sections store an offset of zero, so the byte length of a
//! section is the distance to the next non-zero offset, or to the end of the
//! chunk for the last used section.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;

/// Returns the byte length of the section starting at `offsets[index]`.
///
/// A zero offset means the section is absent and has length zero.
pub(crate) fn section_len(offsets: &[u32], index: usize, chunk_len: u32) -> u32 {
    let current = offsets[index];
    if current == 0 {
        return 0;
    }

    for &next in &offsets[index + 1..] {
        if next != 0 {
            return next - current;
        }
    }

    chunk_len - current
}

/// A chunk's offset table together with the chunk bounds needed to resolve it.
pub(crate) struct SectionTable {
    chunk: &'static str,
    start: u64,
    len: u32,
    offsets: Vec<u32>,
}

impl SectionTable {
    /// Reads `count` offsets from the current position.
    pub fn read<R: Read + Seek>(
        reader: &mut R,
        chunk: &'static str,
        start: u64,
        len: u32,
        count: usize,
    ) -> Result<Self, Error> {
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(reader.read_be::<u32>()?);
        }
        Ok(Self {
            chunk,
            start,
            len,
            offsets,
        })
    }

    pub fn chunk(&self) -> &'static str {
        self.chunk
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn offset(&self, slot: usize) -> u32 {
        self.offsets[slot]
    }

    pub fn section_len(&self, slot: usize) -> u32 {
        section_len(&self.offsets, slot, self.len)
    }

    /// Number of `entry_size` byte entries in the section at `slot`.
    pub fn entry_count(&self, slot: usize, entry_size: u32) -> usize {
        (self.section_len(slot) / entry_size) as usize
    }

    /// Positions the reader at the start of the section at `slot`.
    pub fn seek_to<R: Seek>(&self, reader: &mut R, slot: usize) -> Result<(), Error> {
        reader.seek(SeekFrom::Start(self.start + u64::from(self.offsets[slot])))?;
        Ok(())
    }

    /// Decodes one entry from the section at `slot`, restoring the
    /// reader position afterwards.
    ///
    /// Returns `None` when the section is absent, letting the caller
    /// substitute a default value.
    pub fn read_entry<R, T, F>(
        &self,
        reader: &mut R,
        slot: usize,
        entry_size: u32,
        index: u32,
        f: F,
    ) -> Result<Option<T>, Error>
    where
        R: Read + Seek,
        F: FnOnce(&mut R) -> Result<T, Error>,
    {
        if self.offsets[slot] == 0 {
            return Ok(None);
        }

        let saved = reader.stream_position()?;
        reader.seek(SeekFrom::Start(
            self.start + u64::from(self.offsets[slot]) + u64::from(index) * u64::from(entry_size),
        ))?;
        let value = f(reader)?;
        reader.seek(SeekFrom::Start(saved))?;
        Ok(Some(value))
    }
}

/// Reads a single padding byte and checks it holds `0xFF`.
pub(crate) fn expect_pad_u8<R: Read + Seek>(
    reader: &mut R,
    chunk: &'static str,
) -> Result<(), Error> {
    let offset = reader.stream_position()?;
    let actual = reader.read_be::<u8>()?;
    if actual != 0xFF {
        return Err(Error::InvalidPadding {
            chunk,
            offset,
            expected: 0xFF,
            actual: u32::from(actual),
        });
    }
    Ok(())
}

/// Reads a two byte padding field and checks it holds `0xFFFF`.
pub(crate) fn expect_pad_u16<R: Read + Seek>(
    reader: &mut R,
    chunk: &'static str,
) -> Result<(), Error> {
    let offset = reader.stream_position()?;
    let actual = reader.read_be::<u16>()?;
    if actual != 0xFFFF {
        return Err(Error::InvalidPadding {
            chunk,
            offset,
            expected: 0xFFFF,
            actual: u32::from(actual),
        });
    }
    Ok(())
}
