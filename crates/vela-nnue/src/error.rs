//! Errors raised while loading or saving network parameters.

use std::io;

use thiserror::Error;

/// Why a network file was rejected.
///
/// Every variant is fatal to the load that produced it and to nothing else:
/// the caller keeps whatever network it already had.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported network version {found:#010x}, expected {expected:#010x}")]
    Version { found: u32, expected: u32 },

    #[error("{section} hash mismatch: file has {found:#010x}, expected {expected:#010x}")]
    Hash { section: &'static str, found: u32, expected: u32 },

    #[error("compressed tensor is missing its LEB128 header")]
    Leb128Magic,

    #[error("corrupt LEB128 tensor: {0}")]
    Leb128(&'static str),

    #[error("network description is not valid UTF-8")]
    Description,

    #[error("unexpected data after the last parameter block")]
    TrailingData,

    #[error("truncated or unreadable parameter stream: {0}")]
    Io(#[from] io::Error),
}

impl FormatError {
    /// Return `true` for failures caused by the stream ending early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, FormatError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}
