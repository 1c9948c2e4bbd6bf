//! Per-thread refresh cache, keyed by king square and perspective.
//!
//! Each entry remembers the accumulation of the last position refreshed
//! with that king placement and the occupancy that produced it. A refresh
//! only applies the pieces that differ from that occupancy, which after a
//! king move is usually a handful of features instead of thirty.

use vela_core::{Bitboard, Board, Color, Piece, PieceKind, Square};

use crate::accumulator::Accumulator;
use crate::architecture::{BIG_L1, PSQT_BUCKETS, SMALL_L1};
use crate::feature_transformer::FeatureTransformer;
use crate::features::{IndexList, make_index};
use crate::network::Networks;
use crate::simd::Active;

#[derive(Clone)]
#[repr(C, align(64))]
struct Entry<const L1: usize> {
    accumulation: [i16; L1],
    psqt: [i32; PSQT_BUCKETS],
    by_kind: [Bitboard; PieceKind::COUNT],
    by_color: [Bitboard; Color::COUNT],
}

impl<const L1: usize> Entry<L1> {
    /// The accumulation of an empty board.
    fn empty(ft: &FeatureTransformer<L1>) -> Self {
        let mut accumulation = [0; L1];
        accumulation.copy_from_slice(&ft.biases);
        Entry {
            accumulation,
            psqt: [0; PSQT_BUCKETS],
            by_kind: [Bitboard::EMPTY; PieceKind::COUNT],
            by_color: [Bitboard::EMPTY; Color::COUNT],
        }
    }
}

/// Refresh cache for one network width.
pub struct Cache<const L1: usize> {
    entries: Vec<[Entry<L1>; Color::COUNT]>,
}

impl<const L1: usize> Cache<L1> {
    pub fn new(ft: &FeatureTransformer<L1>) -> Self {
        let entries = (0..Square::COUNT).map(|_| [Entry::empty(ft), Entry::empty(ft)]).collect();
        Cache { entries }
    }

    /// Reset every entry to the empty-board baseline of `ft`.
    pub fn clear(&mut self, ft: &FeatureTransformer<L1>) {
        for pair in &mut self.entries {
            *pair = [Entry::empty(ft), Entry::empty(ft)];
        }
    }

    /// Bring `perspective`'s half of `acc` up to date with `board` through
    /// the entry for its king square, and store the result in the entry.
    pub(crate) fn refresh(
        &mut self,
        ft: &FeatureTransformer<L1>,
        board: &Board,
        perspective: Color,
        acc: &mut Accumulator<L1>,
    ) {
        let king_sq = board.king_square(perspective);
        let entry = &mut self.entries[king_sq.index()][perspective.index()];

        let mut removed = IndexList::new();
        let mut added = IndexList::new();
        for color in Color::ALL {
            for kind in PieceKind::ALL {
                let piece = Piece::new(kind, color);
                let old = entry.by_color[color.index()] & entry.by_kind[kind.index()];
                let new = board.pieces_of(color, kind);
                for sq in old & !new {
                    removed.push(make_index(perspective, sq, piece, king_sq));
                }
                for sq in new & !old {
                    added.push(make_index(perspective, sq, piece, king_sq));
                }
            }
        }

        ft.update_in_place::<Active>(&mut entry.accumulation, &removed, &added);
        ft.update_psqt(&mut entry.psqt, &removed, &added);

        for color in Color::ALL {
            entry.by_color[color.index()] = board.side(color);
        }
        for kind in PieceKind::ALL {
            entry.by_kind[kind.index()] = board.pieces(kind);
        }

        let p = perspective.index();
        acc.accumulation[p] = entry.accumulation;
        acc.psqt[p] = entry.psqt;
        acc.computed[p] = true;
    }
}

/// One cache per network width, owned by a single search thread.
pub struct AccumulatorCaches {
    pub big: Cache<BIG_L1>,
    pub small: Cache<SMALL_L1>,
}

impl AccumulatorCaches {
    pub fn new(networks: &Networks) -> Self {
        AccumulatorCaches {
            big: Cache::new(&networks.big.feature_transformer),
            small: Cache::new(&networks.small.feature_transformer),
        }
    }

    /// Forget every cached position, e.g. after the networks were reloaded.
    pub fn clear(&mut self, networks: &Networks) {
        self.big.clear(&networks.big.feature_transformer);
        self.small.clear(&networks.small.feature_transformer);
        tracing::debug!("accumulator caches cleared");
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;

    fn transformer() -> FeatureTransformer<SMALL_L1> {
        let mut ft = FeatureTransformer::zeroed();
        ft.randomize(&mut Xoshiro256PlusPlus::seed_from_u64(99));
        ft
    }

    fn from_scratch(ft: &FeatureTransformer<SMALL_L1>, board: &Board, perspective: Color) -> ([i16; SMALL_L1], [i32; PSQT_BUCKETS]) {
        let mut acc = [0; SMALL_L1];
        let mut psqt = [0; PSQT_BUCKETS];
        ft.compute_full(board, perspective, &mut acc, &mut psqt);
        (acc, psqt)
    }

    #[test]
    fn first_refresh_equals_full_computation() {
        let ft = transformer();
        let mut cache = Cache::new(&ft);
        let board = Board::starting_position();

        let mut acc = Accumulator::default();
        for perspective in Color::ALL {
            cache.refresh(&ft, &board, perspective, &mut acc);
            let (expected, psqt) = from_scratch(&ft, &board, perspective);
            assert_eq!(acc.accumulation[perspective.index()], expected);
            assert_eq!(acc.psqt[perspective.index()], psqt);
        }
        assert_eq!(acc.computed, [true, true]);
    }

    #[test]
    fn refresh_applies_the_occupancy_difference() {
        let ft = transformer();
        let mut cache = Cache::new(&ft);
        let mut acc = Accumulator::default();

        // Same king squares, different material: the second refresh diffs
        // against the first one's occupancy.
        let first: Board = "r3k2r/pppq1ppp/2n5/8/8/2N5/PPPQ1PPP/R3K2R w KQkq - 0 1".parse().unwrap();
        let second: Board = "4k2r/ppp2ppp/8/3n4/8/5N2/PP3PPP/R3K3 w Q - 0 1".parse().unwrap();
        for board in [&first, &second, &first] {
            for perspective in Color::ALL {
                cache.refresh(&ft, board, perspective, &mut acc);
                let (expected, psqt) = from_scratch(&ft, board, perspective);
                assert_eq!(acc.accumulation[perspective.index()], expected);
                assert_eq!(acc.psqt[perspective.index()], psqt);
            }
        }
    }

    #[test]
    fn clear_restores_the_empty_baseline() {
        let ft = transformer();
        let mut cache = Cache::new(&ft);
        let mut acc = Accumulator::default();
        let board = Board::starting_position();
        cache.refresh(&ft, &board, Color::White, &mut acc);

        cache.clear(&ft);
        let entry = &cache.entries[Square::E1.index()][Color::White.index()];
        assert_eq!(entry.accumulation[..], ft.biases[..]);
        assert!(entry.by_color.iter().all(|bb| bb.is_clear()));
        assert_eq!(entry.psqt, [0; PSQT_BUCKETS]);
    }
}
