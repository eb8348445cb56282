use thiserror::Error;

/// Errors while decoding a J3D container or one of its chunks.
#[derive(Debug, Error)]
pub enum Error {
    /// The first four bytes were not a recognized J3D magic.
    #[error("unexpected file magic {found:?}")]
    UnexpectedMagic { found: [u8; 4] },

    /// The subtype identifier after the magic was not recognized.
    #[error("unexpected file subtype {found:?}")]
    UnexpectedSubtype { found: [u8; 4] },

    /// A reserved padding field did not hold its expected fill value.
    #[error("{chunk}: padding at offset {offset:#x} was {actual:#x}, expected {expected:#x}")]
    InvalidPadding {
        chunk: &'static str,
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// A structural invariant of the chunk layout was violated.
    #[error("{chunk}: {reason} at offset {offset:#x}")]
    InvalidChunk {
        chunk: &'static str,
        offset: u64,
        reason: String,
    },

    /// A required chunk tag was missing from the container.
    #[error("missing required {tag} chunk")]
    MissingChunk { tag: &'static str },

    /// An enum or mode value had no known meaning.
    /// Only returned in strict mode. Otherwise the decoder logs a warning
    /// and substitutes the documented default.
    #[error("{chunk}: unsupported {what} value {value:#x}")]
    Unsupported {
        chunk: &'static str,
        what: &'static str,
        value: u32,
    },

    #[error(transparent)]
    BinRead(#[from] binread::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
