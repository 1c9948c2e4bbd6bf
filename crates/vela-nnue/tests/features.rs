//! Property tests for active feature extraction over random legal-looking
//! placements, up to the full 32 pieces.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use proptest::prelude::*;
use proptest::sample::subsequence;
use vela_core::{Board, Color, Piece, PieceKind};
use vela_nnue::features::{self, INPUT_DIMENSIONS, IndexList, MAX_ACTIVE_DIMENSIONS};

const FILLERS: [Piece; 10] = [
    Piece::WHITE_PAWN,
    Piece::WHITE_KNIGHT,
    Piece::WHITE_BISHOP,
    Piece::WHITE_ROOK,
    Piece::WHITE_QUEEN,
    Piece::BLACK_PAWN,
    Piece::BLACK_KNIGHT,
    Piece::BLACK_BISHOP,
    Piece::BLACK_ROOK,
    Piece::BLACK_QUEEN,
];

fn placement_fen(cells: &[Option<Piece>; 64], black_to_move: bool) -> String {
    let mut fen = String::new();
    for rank in (0..8).rev() {
        let mut empty = 0;
        for file in 0..8 {
            match cells[rank * 8 + file] {
                Some(piece) => {
                    if empty > 0 {
                        fen.push_str(&empty.to_string());
                        empty = 0;
                    }
                    fen.push(piece.fen_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            fen.push_str(&empty.to_string());
        }
        if rank > 0 {
            fen.push('/');
        }
    }
    fen.push_str(if black_to_move { " b - - 0 1" } else { " w - - 0 1" });
    fen
}

prop_compose! {
    /// Two kings plus up to 30 other pieces on distinct squares. Pawns
    /// drawn for a back rank become knights so the piece count holds.
    fn arb_board(pieces: RangeInclusive<usize>)(
        squares in subsequence((0usize..64).collect::<Vec<_>>(), pieces.clone()).prop_shuffle(),
        kinds in proptest::collection::vec(0usize..FILLERS.len(), 30),
        black_to_move in any::<bool>(),
    ) -> Board {
        let mut cells: [Option<Piece>; 64] = [None; 64];
        cells[squares[0]] = Some(Piece::WHITE_KING);
        cells[squares[1]] = Some(Piece::BLACK_KING);
        for (&sq, &which) in squares[2..].iter().zip(&kinds) {
            let mut piece = FILLERS[which];
            if piece.kind() == PieceKind::Pawn && (sq < 8 || sq >= 56) {
                piece = Piece::new(PieceKind::Knight, piece.color());
            }
            cells[sq] = Some(piece);
        }
        placement_fen(&cells, black_to_move).parse().unwrap()
    }
}

proptest! {
    #[test]
    fn active_features_fit_the_input_layer(board in arb_board(2..=32)) {
        for perspective in Color::ALL {
            let mut active = IndexList::new();
            features::append_active_indices(perspective, &board, &mut active);

            prop_assert!(active.len() <= MAX_ACTIVE_DIMENSIONS);
            prop_assert_eq!(active.len(), board.piece_count() as usize);
            prop_assert!(active.iter().all(|&i| (i as usize) < INPUT_DIMENSIONS), "{:?}", active);
            let distinct: HashSet<u32> = active.iter().copied().collect();
            prop_assert_eq!(distinct.len(), active.len());
        }
    }

    #[test]
    fn full_boards_are_covered(board in arb_board(32..=32)) {
        prop_assert_eq!(board.piece_count(), 32);
        for perspective in Color::ALL {
            let mut active = IndexList::new();
            features::append_active_indices(perspective, &board, &mut active);
            prop_assert_eq!(active.len(), MAX_ACTIVE_DIMENSIONS);
            prop_assert!(active.iter().all(|&i| (i as usize) < INPUT_DIMENSIONS));
        }
    }
}
