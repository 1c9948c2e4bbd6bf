//! Integration tests for incremental accumulator maintenance.
//!
//! Every accumulator the stack hands out must be bit-identical to one
//! built from scratch for the same board, however it was reached.

use std::sync::OnceLock;

use proptest::prelude::*;
use vela_core::{Board, Color, DirtyPiece, Move};
use vela_nnue::architecture::PSQT_BUCKETS;
use vela_nnue::cache::Cache;
use vela_nnue::{AccumulatorStack, Network, NetworkOutput, SMALL_L1};

/// Castling, a capture and a pawn double push.
const ITALIAN: &str = "e2e4 e7e5 g1f3 b8c6 f1c4 f8c5 e1g1 g8f6 d2d3 e8g8 c1g5 h7h6 g5f6 d8f6";

/// En passant, castling queenside and a promotion recaptured by the king.
const TACTICS_FEN: &str = "r3k2r/1P6/8/3pP3/8/8/8/R3K2R w KQkq d6 0 1";
const TACTICS: &str = "e5d6 e8c8 b7b8q c8b8 a1a7 h8h1 e1d2 h1h2";

fn network() -> &'static Network<SMALL_L1> {
    static NET: OnceLock<Network<SMALL_L1>> = OnceLock::new();
    NET.get_or_init(|| Network::synthetic(7))
}

/// Every position of `line` after `start`, with the move that reached it.
fn replay(start: &Board, line: &str) -> Vec<(Board, DirtyPiece)> {
    let mut board = *start;
    line.split_whitespace()
        .map(|uci| {
            let mv: Move = uci.parse().unwrap();
            let (next, dp) = board.make_move(mv).unwrap();
            board = next;
            (next, dp)
        })
        .collect()
}

/// Assert the top of `stack` equals a full computation for `board`.
fn assert_fresh(stack: &AccumulatorStack, board: &Board) {
    let acc = stack.latest::<SMALL_L1>();
    for perspective in Color::ALL {
        let p = perspective.index();
        let mut expected = [0i16; SMALL_L1];
        let mut psqt = [0i32; PSQT_BUCKETS];
        network().feature_transformer().compute_full(board, perspective, &mut expected, &mut psqt);
        assert!(acc.computed[p], "{perspective:?} accumulator not computed");
        assert_eq!(acc.accumulation[p], expected, "{perspective:?} accumulation differs");
        assert_eq!(acc.psqt[p], psqt, "{perspective:?} psqt differs");
    }
}

/// Output of a brand-new stack and cache, i.e. a pure refresh.
fn refreshed_output(board: &Board) -> NetworkOutput {
    let net = network();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(board, &mut stack, &mut cache)
}

// ── Incremental versus refresh ───────────────────────────────────────────────

#[test]
fn incremental_updates_match_refresh_along_a_game() {
    let net = network();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    let start = Board::starting_position();
    net.evaluate(&start, &mut stack, &mut cache);

    for (board, dp) in replay(&start, ITALIAN) {
        stack.push(dp);
        let out = net.evaluate(&board, &mut stack, &mut cache);
        assert_fresh(&stack, &board);
        assert_eq!(out, refreshed_output(&board), "after {dp:?}");
    }
}

#[test]
fn special_moves_update_exactly() {
    let net = network();
    let start: Board = TACTICS_FEN.parse().unwrap();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(&start, &mut stack, &mut cache);

    for (board, dp) in replay(&start, TACTICS) {
        stack.push(dp);
        net.evaluate(&board, &mut stack, &mut cache);
        assert_fresh(&stack, &board);
    }
}

#[test]
fn deep_lazy_line_matches_refresh() {
    let net = network();
    let start = Board::starting_position();
    let plies = replay(&start, ITALIAN);
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(&start, &mut stack, &mut cache);

    // Nothing is evaluated until the end of the line.
    for (_, dp) in &plies {
        stack.push(*dp);
    }
    let (last, _) = plies[plies.len() - 1];
    let out = net.evaluate(&last, &mut stack, &mut cache);
    assert_fresh(&stack, &last);
    assert_eq!(out, refreshed_output(&last));
}

// ── Push / pop ───────────────────────────────────────────────────────────────

#[test]
fn pop_restores_the_parent_exactly() {
    let net = network();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    let board = Board::starting_position();
    let before = net.evaluate(&board, &mut stack, &mut cache);
    let snapshot = stack.latest::<SMALL_L1>().clone();

    for (child, dp) in replay(&board, "e2e4 c7c5 g1f3") {
        stack.push(dp);
        net.evaluate(&child, &mut stack, &mut cache);
    }
    for _ in 0..3 {
        stack.pop();
    }

    assert_eq!(stack.len(), 1);
    assert_eq!(*stack.latest::<SMALL_L1>(), snapshot);
    assert_eq!(net.evaluate(&board, &mut stack, &mut cache), before);
}

#[test]
fn sibling_moves_reuse_the_parent() {
    let net = network();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    let board = Board::starting_position();
    net.evaluate(&board, &mut stack, &mut cache);

    for uci in ["e2e4", "d2d4", "g1f3", "b1c3"] {
        let (child, dp) = board.make_move(uci.parse().unwrap()).unwrap();
        stack.push(dp);
        let out = net.evaluate(&child, &mut stack, &mut cache);
        assert_fresh(&stack, &child);
        assert_eq!(out, refreshed_output(&child), "{uci}");
        stack.pop();
    }
}

// ── Refresh policy ───────────────────────────────────────────────────────────

#[cfg(feature = "nnue-stats")]
#[test]
fn own_king_move_forces_a_refresh_for_that_side_only() {
    let net = network();
    let start: Board = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1".parse().unwrap();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(&start, &mut stack, &mut cache);
    stack.reset_stats();

    let plies = replay(&start, "e1d1");
    let (board, dp) = plies[0];
    stack.push(dp);
    net.evaluate(&board, &mut stack, &mut cache);
    assert_fresh(&stack, &board);

    let white = stack.stats(Color::White);
    assert_eq!((white.refreshes, white.forward_steps, white.backward_steps), (1, 0, 0));
    let black = stack.stats(Color::Black);
    assert_eq!((black.refreshes, black.forward_steps, black.backward_steps), (0, 1, 0));
}

#[cfg(feature = "nnue-stats")]
#[test]
fn no_update_chain_crosses_a_king_move() {
    let net = network();
    let start: Board = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1".parse().unwrap();
    let mut stack = AccumulatorStack::new();
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(&start, &mut stack, &mut cache);
    stack.reset_stats();

    // White king, black king, white pawn; only the last ply is evaluated.
    let plies = replay(&start, "e1d1 e8d8 e2e4");
    for (_, dp) in &plies {
        stack.push(*dp);
    }
    let (last, _) = plies[2];
    net.evaluate(&last, &mut stack, &mut cache);
    assert_fresh(&stack, &last);

    // Refresh at ply 3, then ply 2 and the king-move ply 1 are filled backward.
    let white = stack.stats(Color::White);
    assert_eq!((white.refreshes, white.forward_steps, white.backward_steps), (1, 0, 2));
    // Black's king moved at ply 2: refresh ply 3, fill ply 2 backward.
    let black = stack.stats(Color::Black);
    assert_eq!((black.refreshes, black.forward_steps, black.backward_steps), (1, 0, 1));

    // Ply 2 was filled for both sides on the way down.
    stack.pop();
    assert_fresh(&stack, &plies[1].0);

    // Ply 1 only for White; Black completes it from the root.
    stack.pop();
    stack.reset_stats();
    net.evaluate(&plies[0].0, &mut stack, &mut cache);
    assert_fresh(&stack, &plies[0].0);
    assert_eq!(stack.stats(Color::White), Default::default());
    assert_eq!(stack.stats(Color::Black).forward_steps, 1);
}

#[cfg(feature = "nnue-stats")]
#[test]
fn scan_limit_bounds_the_backward_walk() {
    let net = network();
    let start = Board::starting_position();
    let plies = replay(&start, ITALIAN);
    let mut stack = AccumulatorStack::with_scan_limit(2);
    let mut cache = Cache::new(net.feature_transformer());
    net.evaluate(&start, &mut stack, &mut cache);
    stack.reset_stats();

    // White's castling at ply 7 lies beyond the two plies inspected.
    for (_, dp) in &plies[..11] {
        stack.push(*dp);
    }
    let (board, _) = plies[10];
    net.evaluate(&board, &mut stack, &mut cache);
    assert_fresh(&stack, &board);

    let white = stack.stats(Color::White);
    assert_eq!((white.refreshes, white.forward_steps, white.backward_steps), (1, 0, 0));
}

// ── Random walks ─────────────────────────────────────────────────────────────

/// One step of a random walk over a scripted line.
#[derive(Clone, Copy, Debug)]
enum Step {
    Push,
    Pop,
    Evaluate,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![3 => Just(Step::Push), 2 => Just(Step::Pop), 2 => Just(Step::Evaluate)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_push_pop_sequences_stay_exact(
        tactics in any::<bool>(),
        scan_limit in 0usize..6,
        steps in proptest::collection::vec(step(), 1..40),
    ) {
        let net = network();
        let start: Board = if tactics { TACTICS_FEN.parse().unwrap() } else { Board::starting_position() };
        let plies = replay(&start, if tactics { TACTICS } else { ITALIAN });
        let mut stack = AccumulatorStack::with_scan_limit(scan_limit);
        let mut cache = Cache::new(net.feature_transformer());
        let mut depth = 0usize;

        for step in steps {
            match step {
                Step::Push if depth < plies.len() => {
                    stack.push(plies[depth].1);
                    depth += 1;
                }
                Step::Pop if depth > 0 => {
                    stack.pop();
                    depth -= 1;
                }
                _ => {
                    let board = if depth == 0 { start } else { plies[depth - 1].0 };
                    net.evaluate(&board, &mut stack, &mut cache);
                    assert_fresh(&stack, &board);
                }
            }
            prop_assert_eq!(stack.len(), depth + 1);
        }
    }
}
