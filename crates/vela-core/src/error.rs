//! Error types for FEN parsing, board validation and move application.

use thiserror::Error;

use crate::square::Square;

/// Errors that occur when parsing a FEN string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("expected 4 to 6 FEN fields, found {found}")]
    WrongFieldCount { found: usize },

    #[error("expected 8 ranks in piece placement, found {found}")]
    WrongRankCount { found: usize },

    /// Zero-based rank index counts from the eighth rank.
    #[error("rank {rank_index} describes {length} squares, expected 8")]
    BadRankLength { rank_index: usize, length: usize },

    #[error("invalid piece character: '{character}'")]
    InvalidPieceChar { character: char },

    #[error("invalid active color: \"{found}\"")]
    InvalidColor { found: String },

    #[error("invalid castling character: '{character}'")]
    InvalidCastlingChar { character: char },

    #[error("invalid en passant square: \"{found}\"")]
    InvalidEnPassant { found: String },

    #[error("invalid {field}: \"{found}\"")]
    InvalidMoveCounter { field: &'static str, found: String },

    #[error("invalid board: {0}")]
    InvalidBoard(#[from] BoardError),
}

/// Structural problems with a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("{color} has {count} kings, expected exactly 1")]
    InvalidKingCount { color: &'static str, count: u32 },

    #[error("pawns on the first or eighth rank")]
    PawnsOnBackRank,

    #[error("{count} pieces on the board, at most 32 allowed")]
    TooManyPieces { count: u32 },
}

/// Reasons a move cannot be applied to a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("malformed move text: \"{0}\"")]
    Malformed(String),

    #[error("no piece on {0}")]
    EmptySource(Square),

    #[error("piece on {0} does not belong to the side to move")]
    WrongSide(Square),

    #[error("cannot capture own piece on {0}")]
    OwnCapture(Square),

    #[error("cannot capture a king on {0}")]
    KingCapture(Square),

    #[error("promotion on {0} is not a pawn reaching the last rank")]
    BadPromotion(Square),

    #[error("no castling rook on {0}")]
    NoCastlingRook(Square),

    #[error("castling destination {0} is occupied")]
    Obstructed(Square),
}
