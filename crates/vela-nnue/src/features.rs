//! `HalfKAv2_hm`: king-relative piece-square features with horizontal
//! mirroring and a single merged plane for both kings.
//!
//! Each perspective sees the board from its own side (ranks flipped for
//! Black) and mirrored so its king stands on files e–h. The king square then
//! selects one of 32 buckets of 704 piece-square slots.

use arrayvec::ArrayVec;
use vela_core::{Board, Color, DirtyPiece, Piece, Square};

/// Feature set name written into the trace header.
pub const NAME: &str = "HalfKAv2_hm(Friend)";

/// Hash folded into the feature transformer's structural hash.
pub const HASH_VALUE: u32 = 0x7F23_4CB8;

const PS_W_PAWN: u32 = 0;
const PS_B_PAWN: u32 = 64;
const PS_W_KNIGHT: u32 = 2 * 64;
const PS_B_KNIGHT: u32 = 3 * 64;
const PS_W_BISHOP: u32 = 4 * 64;
const PS_B_BISHOP: u32 = 5 * 64;
const PS_W_ROOK: u32 = 6 * 64;
const PS_B_ROOK: u32 = 7 * 64;
const PS_W_QUEEN: u32 = 8 * 64;
const PS_B_QUEEN: u32 = 9 * 64;
const PS_KING: u32 = 10 * 64;
const PS_NB: u32 = 11 * 64;

/// Number of distinct features per perspective.
pub const INPUT_DIMENSIONS: usize = 64 * PS_NB as usize / 2;

/// Upper bound on simultaneously active features per perspective. Counts
/// every piece including both kings, so at most 30 are non-king features.
pub const MAX_ACTIVE_DIMENSIONS: usize = 32;

/// Active or changed feature indices for one perspective.
pub type IndexList = ArrayVec<u32, MAX_ACTIVE_DIMENSIONS>;

/// Indices touched by a single move: at most two on each side.
pub type ChangeList = ArrayVec<u32, 2>;

/// Plane offset by `[perspective][piece.index()]`; own pieces use the
/// `W` planes, kings share one plane.
#[rustfmt::skip]
const PIECE_SQUARE_INDEX: [[u32; Piece::COUNT]; Color::COUNT] = [
    [PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING,
     PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING],
    [PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING,
     PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING],
];

/// Bucket offset by the perspective-relative king square. Mirrored files
/// share a bucket; the back rank gets the highest buckets.
const KING_BUCKETS: [u32; 64] = {
    let mut table = [0u32; 64];
    let mut sq = 0;
    while sq < 64 {
        let file = sq % 8;
        let rank = sq / 8;
        let mirrored_file = if file < 4 { file } else { 7 - file };
        table[sq] = ((7 - rank) * 4 + mirrored_file) as u32 * PS_NB;
        sq += 1;
    }
    table
};

/// XOR mask mirroring piece squares when the king is on files a–d.
const ORIENT: [u32; 64] = {
    let mut table = [0u32; 64];
    let mut sq = 0;
    while sq < 64 {
        table[sq] = if sq % 8 < 4 { 7 } else { 0 };
        sq += 1;
    }
    table
};

/// Feature index of `piece` on `sq` seen by `perspective` with its king on `king_sq`.
#[inline]
pub fn make_index(perspective: Color, sq: Square, piece: Piece, king_sq: Square) -> u32 {
    PIECE_SQUARE_INDEX[perspective.index()][piece.index()]
        + KING_BUCKETS[king_sq.relative(perspective).index()]
        + (ORIENT[king_sq.index()] ^ sq.relative(perspective).index() as u32)
}

/// Append the index of every piece on `board` as seen by `perspective`.
pub fn append_active_indices(perspective: Color, board: &Board, active: &mut IndexList) {
    let king_sq = board.king_square(perspective);
    for sq in board.occupied() {
        if let Some(piece) = board.piece_on(sq) {
            let pushed = active.try_push(make_index(perspective, sq, piece, king_sq));
            debug_assert!(pushed.is_ok(), "more than {MAX_ACTIVE_DIMENSIONS} active features");
        }
    }
}

/// Append the indices a move switched off and on, for a perspective whose
/// king stands on `king_sq` after the move.
pub fn append_changed_indices(
    perspective: Color,
    king_sq: Square,
    dp: &DirtyPiece,
    removed: &mut ChangeList,
    added: &mut ChangeList,
) {
    removed.push(make_index(perspective, dp.from, dp.piece, king_sq));
    if let Some(to) = dp.to {
        added.push(make_index(perspective, to, dp.piece, king_sq));
    }
    if let Some((piece, sq)) = dp.removed {
        removed.push(make_index(perspective, sq, piece, king_sq));
    }
    if let Some((piece, sq)) = dp.added {
        added.push(make_index(perspective, sq, piece, king_sq));
    }
}

/// A move of `perspective`'s own king changes every feature it sees.
#[inline]
pub fn requires_refresh(dp: &DirtyPiece, perspective: Color) -> bool {
    dp.king_moved(perspective)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use vela_core::{Board, Color, DirtyPiece, Piece, PieceKind, Square};

    use super::*;

    fn mirror_file(sq: Square) -> Square {
        Square::from_coords(7 - sq.file(), sq.rank()).unwrap()
    }

    fn all_pieces() -> impl Iterator<Item = Piece> {
        Color::ALL
            .into_iter()
            .flat_map(|c| PieceKind::ALL.into_iter().map(move |k| Piece::new(k, c)))
    }

    #[test]
    fn dimensions() {
        assert_eq!(INPUT_DIMENSIONS, 22528);
        assert_eq!(KING_BUCKETS[Square::E1.index()], 31 * PS_NB);
        assert_eq!(KING_BUCKETS[Square::A8.index()], 0);
    }

    #[test]
    fn every_index_is_in_range() {
        for perspective in Color::ALL {
            for king_sq in Square::all() {
                for piece in all_pieces() {
                    for sq in Square::all() {
                        let idx = make_index(perspective, sq, piece, king_sq) as usize;
                        assert!(idx < INPUT_DIMENSIONS, "{perspective:?} {piece:?} {sq} k={king_sq}: {idx}");
                    }
                }
            }
        }
    }

    #[test]
    fn king_on_queenside_mirrors_the_board() {
        for piece in all_pieces() {
            for sq in Square::all() {
                assert_eq!(
                    make_index(Color::White, sq, piece, Square::E1),
                    make_index(Color::White, mirror_file(sq), piece, Square::D1),
                );
            }
        }
    }

    #[test]
    fn black_sees_a_color_flipped_board() {
        for sq in Square::all() {
            for kind in PieceKind::ALL {
                let white_view = make_index(Color::White, sq, Piece::new(kind, Color::White), Square::G1);
                let black_view = make_index(
                    Color::Black,
                    sq.relative(Color::Black),
                    Piece::new(kind, Color::Black),
                    Square::G8,
                );
                assert_eq!(white_view, black_view, "{kind:?} on {sq}");
            }
        }
    }

    #[test]
    fn starting_position_features_are_distinct() {
        let board = Board::starting_position();
        for perspective in Color::ALL {
            let mut active = IndexList::new();
            append_active_indices(perspective, &board, &mut active);
            assert_eq!(active.len(), 32);
            let unique: HashSet<_> = active.iter().collect();
            assert_eq!(unique.len(), 32);
        }
    }

    #[test]
    fn promotion_capture_changes() {
        let dp = DirtyPiece {
            piece: Piece::WHITE_PAWN,
            from: Square::A7,
            to: None,
            removed: Some((Piece::BLACK_KNIGHT, Square::B8)),
            added: Some((Piece::WHITE_QUEEN, Square::B8)),
        };
        let (mut removed, mut added) = (ChangeList::new(), ChangeList::new());
        append_changed_indices(Color::Black, Square::E8, &dp, &mut removed, &mut added);
        assert_eq!(removed.len(), 2);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0], make_index(Color::Black, Square::B8, Piece::WHITE_QUEEN, Square::E8));
    }

    #[test]
    fn only_own_king_moves_force_refresh() {
        let dp = DirtyPiece::quiet(Piece::WHITE_KING, Square::E1, Square::E2);
        assert!(requires_refresh(&dp, Color::White));
        assert!(!requires_refresh(&dp, Color::Black));
    }
}
