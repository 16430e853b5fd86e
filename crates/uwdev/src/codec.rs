//! Shared error type for the binary archive codecs.

use uw_utils::reader::ReadError;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data")]
    Truncated,
    #[error("huffman node {index} is out of range (tree has {count} nodes)")]
    InvalidNode { index: usize, count: usize },
    #[error("offset {offset:#x} is outside the file ({size} bytes)")]
    BadOffset { offset: u64, size: u64 },
    #[error("no huffman code for {symbol:?} and no space code to fall back on")]
    MissingSymbol { symbol: char },
    #[error("conversation header starts with {found:#06x}, expected 0x0828")]
    BadHeaderMarker { found: u16 },
    #[error("import record {field} holds unknown value {value:#06x}")]
    BadImportField { field: &'static str, value: u16 },
    #[error("slot {slot} does not exist (archive has {count} slots)")]
    NoSuchSlot { slot: u16, count: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ReadError> for CodecError {
    fn from(_: ReadError) -> Self {
        CodecError::Truncated
    }
}
