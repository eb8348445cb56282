//! The string table layout shared by several chunks.
//!
//! Tables start with a `u16` entry count and a `0xFFFF` pad, followed by one
//! `(hash, offset)` pair per entry. String bytes are null terminated and the
//! offsets are relative to the start of the table.

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;

/// Reads a string table starting at the current reader position.
pub(crate) fn read_string_table<R: Read + Seek>(
    reader: &mut R,
    chunk: &'static str,
) -> Result<Vec<String>, Error> {
    let table_start = reader.stream_position()?;

    let count = reader.read_be::<u16>()?;
    crate::section::expect_pad_u16(reader, chunk)?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        // The hash is only used by the game's runtime lookup.
        let _hash = reader.read_be::<u16>()?;
        let offset = reader.read_be::<u16>()?;
        entries.push(offset);
    }

    let mut strings = Vec::with_capacity(count as usize);
    for offset in entries {
        reader.seek(SeekFrom::Start(table_start + u64::from(offset)))?;
        strings.push(read_null_terminated(reader)?);
    }

    Ok(strings)
}

fn read_null_terminated<R: Read + Seek>(reader: &mut R) -> Result<String, Error> {
    let mut bytes = Vec::new();
    loop {
        let b = reader.read_be::<u8>()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn read_two_entry_table() {
        // Count 2, pad, (hash, offset) pairs, then "a\0" and "bc\0".
        let data = hex!("0002 FFFF 0000 000C 0000 000E 6100 626300");
        let mut reader = Cursor::new(data);

        let strings = read_string_table(&mut reader, "TEST").unwrap();
        assert_eq!(vec!["a".to_string(), "bc".to_string()], strings);
    }

    #[test]
    fn bad_padding_is_an_error() {
        let data = hex!("0000 0000");
        let mut reader = Cursor::new(data);

        assert!(matches!(
            read_string_table(&mut reader, "TEST"),
            Err(Error::InvalidPadding { chunk: "TEST", .. })
        ));
    }
}
