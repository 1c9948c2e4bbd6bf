//! Copy-make move application that also reports the board delta.

use crate::board::Board;
use crate::chess_move::Move;
use crate::color::Color;
use crate::dirty_piece::DirtyPiece;
use crate::error::MoveError;
use crate::piece::Piece;
use crate::piece_kind::PieceKind;
use crate::square::Square;

impl Board {
    /// Apply `mv` and return the resulting board together with the
    /// [`DirtyPiece`] describing what changed. `self` is not modified.
    ///
    /// Moves are checked for consistency with the board (right side, no
    /// self-capture, promotions only on the last rank) but not for legality.
    pub fn make_move(&self, mv: Move) -> Result<(Board, DirtyPiece), MoveError> {
        let mut b = *self;
        let us = self.side_to_move();
        let them = !us;
        let (from, to) = (mv.from, mv.to);

        let piece = self.piece_on(from).ok_or(MoveError::EmptySource(from))?;
        if piece.color() != us {
            return Err(MoveError::WrongSide(from));
        }
        let target = self.piece_on(to);
        match target {
            Some(t) if t.color() == us => return Err(MoveError::OwnCapture(to)),
            Some(t) if t.kind() == PieceKind::King => return Err(MoveError::KingCapture(to)),
            _ => {}
        }

        let is_pawn = piece.kind() == PieceKind::Pawn;
        let reaches_last_rank = to.relative(us).rank() == 7;
        if mv.promotion.is_some() != (is_pawn && reaches_last_rank)
            || matches!(mv.promotion, Some(PieceKind::Pawn | PieceKind::King))
        {
            return Err(MoveError::BadPromotion(to));
        }

        let is_castle = piece.kind() == PieceKind::King
            && from.rank() == to.rank()
            && from.file().abs_diff(to.file()) == 2;
        let is_en_passant =
            is_pawn && target.is_none() && from.file() != to.file() && self.en_passant() == Some(to);

        let mut dp = DirtyPiece { piece, from, to: Some(to), removed: None, added: None };

        if is_castle {
            let (rook_from, rook_to) = if to.file() == 6 { (7, 5) } else { (0, 3) };
            let rank = from.rank();
            let rook_from = Square::from_coords(rook_from, rank).ok_or(MoveError::EmptySource(from))?;
            let rook_to = Square::from_coords(rook_to, rank).ok_or(MoveError::EmptySource(from))?;
            if self.piece_on(rook_from) != Some(Piece::new(PieceKind::Rook, us)) {
                return Err(MoveError::NoCastlingRook(rook_from));
            }
            // Only the castling king and rook may stand on their destinations.
            for sq in [to, rook_to] {
                if sq != from && sq != rook_from && self.piece_on(sq).is_some() {
                    return Err(MoveError::Obstructed(sq));
                }
            }
            let rook = b.remove_piece(rook_from).ok_or(MoveError::NoCastlingRook(rook_from))?;
            b.remove_piece(from);
            b.put_piece(piece, to);
            b.put_piece(rook, rook_to);
            dp.removed = Some((rook, rook_from));
            dp.added = Some((rook, rook_to));
        } else {
            let captured_sq = if is_en_passant {
                to.offset(-us.pawn_push()).ok_or(MoveError::EmptySource(to))?
            } else {
                to
            };
            if let Some(captured) = b.remove_piece(captured_sq) {
                dp.removed = Some((captured, captured_sq));
            }
            b.remove_piece(from);
            match mv.promotion {
                Some(kind) => {
                    let promoted = Piece::new(kind, us);
                    b.put_piece(promoted, to);
                    dp.to = None;
                    dp.added = Some((promoted, to));
                }
                None => b.put_piece(piece, to),
            }
        }

        let double_push = is_pawn && from.index().abs_diff(to.index()) == 16;
        let en_passant = if double_push { from.offset(us.pawn_push()) } else { None };
        let halfmove_clock = if is_pawn || (dp.removed.is_some() && !is_castle) {
            0
        } else {
            self.halfmove_clock().saturating_add(1)
        };
        let fullmove_number = self.fullmove_number() + u16::from(us == Color::Black);

        b.set_state(
            them,
            self.castling().after_move(from, to),
            en_passant,
            halfmove_clock,
            fullmove_number,
        );
        Ok((b, dp))
    }

    /// Parse and apply a sequence of UCI moves, returning every intermediate
    /// delta alongside the final board.
    pub fn play_line<'a, I>(&self, moves: I) -> Result<(Board, Vec<DirtyPiece>), MoveError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut board = *self;
        let mut deltas = Vec::new();
        for text in moves {
            let (next, dp) = board.make_move(text.parse()?)?;
            board = next;
            deltas.push(dp);
        }
        Ok((board, deltas))
    }
}
