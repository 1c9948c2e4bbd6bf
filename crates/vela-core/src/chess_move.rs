//! Moves in coordinate form.

use std::fmt;
use std::str::FromStr;

use crate::error::MoveError;
use crate::piece_kind::PieceKind;
use crate::square::Square;

/// A move given by its origin, destination and optional promotion.
///
/// Castling is written as the king's two-square step (`e1g1`). Special
/// move kinds are recognised against a board in [`Board::make_move`].
///
/// [`Board::make_move`]: crate::Board::make_move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl Move {
    #[inline]
    pub const fn new(from: Square, to: Square) -> Move {
        Move { from, to, promotion: None }
    }

    /// A promotion to `kind`, which must be a knight, bishop, rook or queen.
    #[inline]
    pub const fn with_promotion(from: Square, to: Square, kind: PieceKind) -> Result<Move, MoveError> {
        match kind {
            PieceKind::Pawn | PieceKind::King => Err(MoveError::BadPromotion(to)),
            _ => Ok(Move { from, to, promotion: Some(kind) }),
        }
    }
}

impl FromStr for Move {
    type Err = MoveError;

    /// Parse UCI long algebraic notation (`e2e4`, `e7e8q`).
    fn from_str(text: &str) -> Result<Move, MoveError> {
        let malformed = || MoveError::Malformed(text.to_string());
        let from = text.get(0..2).and_then(Square::from_algebraic).ok_or_else(malformed)?;
        let to = text.get(2..4).and_then(Square::from_algebraic).ok_or_else(malformed)?;
        let promotion = match text.get(4..) {
            Some("") => None,
            Some(suffix) if suffix.len() == 1 => {
                let kind = suffix
                    .chars()
                    .next()
                    .and_then(PieceKind::from_fen_char)
                    .filter(|k| !matches!(k, PieceKind::Pawn | PieceKind::King))
                    .ok_or_else(malformed)?;
                Some(kind)
            }
            _ => return Err(malformed()),
        };
        Ok(Move { from, to, promotion })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Move;
    use crate::error::MoveError;
    use crate::piece_kind::PieceKind;
    use crate::square::Square;

    #[test]
    fn parses_plain_and_promotion_moves() {
        assert_eq!("e2e4".parse::<Move>(), Ok(Move::new(Square::E2, Square::E4)));
        assert_eq!(
            "a7a8n".parse::<Move>(),
            Move::with_promotion(Square::A7, Square::A8, PieceKind::Knight)
        );
    }

    #[test]
    fn promotion_targets_exclude_pawn_and_king() {
        for kind in [PieceKind::Pawn, PieceKind::King] {
            assert_eq!(
                Move::with_promotion(Square::B7, Square::B8, kind),
                Err(MoveError::BadPromotion(Square::B8))
            );
        }
        assert!(Move::with_promotion(Square::B2, Square::B1, PieceKind::Rook).is_ok());
    }

    #[test]
    fn display_roundtrip() {
        for text in ["g1f3", "e1g1", "h2h1q"] {
            assert_eq!(text.parse::<Move>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "e2", "e2e9", "e7e8k", "e7e8qq", "e7e8p"] {
            assert!(
                matches!(bad.parse::<Move>(), Err(MoveError::Malformed(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
