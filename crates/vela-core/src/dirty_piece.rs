//! The board delta produced by a single move.

use crate::color::Color;
use crate::piece::Piece;
use crate::piece_kind::PieceKind;
use crate::square::Square;

/// Pieces that changed when a move was made.
///
/// The moving piece leaves `from` and, unless it promoted, arrives on `to`.
/// `removed` carries a captured piece or the castling rook on its origin;
/// `added` carries a promoted piece or the castling rook on its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyPiece {
    pub piece: Piece,
    pub from: Square,
    pub to: Option<Square>,
    pub removed: Option<(Piece, Square)>,
    pub added: Option<(Piece, Square)>,
}

impl DirtyPiece {
    /// Delta of a quiet move.
    #[inline]
    pub const fn quiet(piece: Piece, from: Square, to: Square) -> DirtyPiece {
        DirtyPiece { piece, from, to: Some(to), removed: None, added: None }
    }

    /// Return `true` if the king of `color` moved.
    #[inline]
    pub fn king_moved(&self, color: Color) -> bool {
        self.piece == Piece::new(PieceKind::King, color)
    }
}
