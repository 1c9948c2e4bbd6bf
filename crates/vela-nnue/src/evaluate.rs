//! Final evaluation: network selection, the psqt/positional blend and
//! the adjustments for optimism, material and the fifty-move counter.

use std::fmt;

use vela_core::{Board, Color, PieceKind};

use crate::accumulator::{AccumulatorStack, MAX_PLY};
use crate::cache::AccumulatorCaches;
use crate::network::{NetworkOutput, NetworkTrace, Networks};

pub const PAWN_VALUE: i32 = 208;
pub const KNIGHT_VALUE: i32 = 781;
pub const BISHOP_VALUE: i32 = 825;
pub const ROOK_VALUE: i32 = 1276;
pub const QUEEN_VALUE: i32 = 2538;

const PLY: i32 = MAX_PLY as i32;

pub const VALUE_NONE: i32 = 0x7FFF;
pub const VALUE_INFINITE: i32 = VALUE_NONE - 1;
pub const VALUE_MATE: i32 = VALUE_INFINITE - 1;
pub const VALUE_MATES_IN_MAX_PLY: i32 = VALUE_MATE - PLY;
pub const VALUE_TB: i32 = VALUE_MATES_IN_MAX_PLY - 1;
pub const VALUE_TB_WIN_IN_MAX_PLY: i32 = VALUE_TB - PLY;

/// Scores beyond this bound are reserved for tablebase and mate results.
pub const MAX_EVAL: i32 = VALUE_TB_WIN_IN_MAX_PLY - 1;

/// Above this material imbalance the small network is good enough.
const SMALL_NET_THRESHOLD: i32 = 962;
/// Small network scores closer to zero than this are redone with the big one.
const SMALL_NET_UNSURE: i32 = 277;

pub fn non_pawn_material(board: &Board, color: Color) -> i32 {
    board.count(color, PieceKind::Knight) as i32 * KNIGHT_VALUE
        + board.count(color, PieceKind::Bishop) as i32 * BISHOP_VALUE
        + board.count(color, PieceKind::Rook) as i32 * ROOK_VALUE
        + board.count(color, PieceKind::Queen) as i32 * QUEEN_VALUE
}

/// Material balance from the side to move's point of view.
pub fn simple_eval(board: &Board) -> i32 {
    let us = board.side_to_move();
    let them = !us;
    PAWN_VALUE * (board.count(us, PieceKind::Pawn) as i32 - board.count(them, PieceKind::Pawn) as i32)
        + non_pawn_material(board, us)
        - non_pawn_material(board, them)
}

/// Total material on the board, pawns weighted for the scaling term.
pub fn material(board: &Board) -> i32 {
    534 * board.pieces(PieceKind::Pawn).count() as i32
        + non_pawn_material(board, Color::White)
        + non_pawn_material(board, Color::Black)
}

#[inline]
pub fn use_small_net(board: &Board) -> bool {
    simple_eval(board).abs() > SMALL_NET_THRESHOLD
}

/// Static evaluation of `board` from the side to move's point of view.
///
/// The top of `stack` must correspond to `board`.
pub fn evaluate(
    networks: &Networks,
    board: &Board,
    stack: &mut AccumulatorStack,
    caches: &mut AccumulatorCaches,
    optimism: i32,
) -> i32 {
    let out = if use_small_net(board) {
        let small = networks.small.evaluate(board, stack, &mut caches.small);
        if blend(small).abs() < SMALL_NET_UNSURE {
            networks.big.evaluate(board, stack, &mut caches.big)
        } else {
            small
        }
    } else {
        networks.big.evaluate(board, stack, &mut caches.big)
    };

    adjust(out, optimism, material(board), board.halfmove_clock())
}

/// Weighted sum of the two network terms.
#[inline]
pub fn blend(out: NetworkOutput) -> i32 {
    (125 * out.psqt + 131 * out.positional) / 128
}

/// Scale the blended score by how much the two terms disagree, mix in
/// optimism in proportion to material and damp towards a fifty-move draw.
fn adjust(out: NetworkOutput, optimism: i32, material: i32, rule50: u16) -> i32 {
    let complexity = f64::from((out.psqt - out.positional).abs());
    let nnue = (f64::from(blend(out)) * (1.0 - 54.8366e-6 * complexity)) as i32;
    let optimism = (f64::from(optimism) * (1.0 + 21.0084e-4 * complexity)) as i32;

    let v = nnue + round(15.2588e-6 * f64::from(nnue + optimism) * f64::from(material));

    let damp = (1.0 - 5.0505e-3 * f64::from(rule50)).max(0.0);
    let v = (f64::from(v) * damp) as i32;
    v.clamp(-MAX_EVAL, MAX_EVAL)
}

/// Round half away from zero, nudged just under the half.
fn round(x: f64) -> i32 {
    if x >= 0.0 { (x + 0.4999) as i32 } else { (x - 0.4999) as i32 }
}

/// Per-bucket breakdown of the big network plus the final score, all
/// from White's point of view.
pub struct EvalTrace {
    pub network: NetworkTrace,
    /// Raw big-network score, psqt plus positional.
    pub nnue: i32,
    /// What [`evaluate`] returns with zero optimism.
    pub final_eval: i32,
    /// See [`win_rate_material`].
    pub material: i32,
}

impl EvalTrace {
    fn pawns(&self, v: i32) -> f64 {
        0.01 * f64::from(to_cp(v, self.material))
    }
}

/// Trace `board` on a fresh stack and cache set.
pub fn trace(networks: &Networks, board: &Board) -> EvalTrace {
    let mut stack = AccumulatorStack::new();
    let mut caches = AccumulatorCaches::new(networks);

    let network = networks.big.trace(board, &mut stack, &mut caches.big);
    let out = networks.big.evaluate(board, &mut stack, &mut caches.big);
    let v = evaluate(networks, board, &mut stack, &mut caches, 0);

    let white = |x: i32| if board.side_to_move() == Color::White { x } else { -x };
    EvalTrace {
        network,
        nnue: white(out.psqt + out.positional),
        final_eval: white(v),
        material: win_rate_material(board),
    }
}

/// Material in pawn units as the win-rate model counts it.
pub fn win_rate_material(board: &Board) -> i32 {
    board.pieces(PieceKind::Pawn).count() as i32
        + 3 * board.pieces(PieceKind::Knight).count() as i32
        + 3 * board.pieces(PieceKind::Bishop).count() as i32
        + 5 * board.pieces(PieceKind::Rook).count() as i32
        + 9 * board.pieces(PieceKind::Queen).count() as i32
}

/// Internal units that give a 50% win rate at this much material.
fn win_rate_scale(material: i32) -> f64 {
    const AS: [f64; 4] = [-37.45051876, 121.19101539, -132.78783573, 420.70576692];
    let m = f64::from(material.clamp(17, 78)) / 58.0;
    AS.iter().fold(0.0, |a, &c| a * m + c)
}

/// Internal units as centipawns, where 100 means a 50% chance to win.
pub fn to_cp(v: i32, material: i32) -> i32 {
    (100.0 * f64::from(v) / win_rate_scale(material)).round() as i32
}

impl fmt::Display for EvalTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.network.side_to_move == Color::White { 1 } else { -1 };
        writeln!(f, " NNUE network contributions ({} to move)", self.network.side_to_move)?;
        writeln!(f, "+------------+------------+------------+------------+")?;
        writeln!(f, "|   Bucket   |  Material  | Positional |   Total    |")?;
        writeln!(f, "|            |   (PSQT)   |  (Layers)  |            |")?;
        writeln!(f, "+------------+------------+------------+------------+")?;
        for (bucket, out) in self.network.outputs.iter().enumerate() {
            let psqt = sign * out.psqt;
            let positional = sign * out.positional;
            write!(
                f,
                "|  {bucket:^8}  |  {:>+8.2}  |  {:>+8.2}  |  {:>+8.2}  |",
                self.pawns(psqt),
                self.pawns(positional),
                self.pawns(psqt + positional)
            )?;
            if bucket == self.network.bucket {
                write!(f, " <-- this bucket is used")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "+------------+------------+------------+------------+")?;
        writeln!(f)?;
        writeln!(f, "NNUE evaluation      {:+.2} (white side)", self.pawns(self.nnue))?;
        write!(f, "Final evaluation     {:+.2} (white side)", self.pawns(self.final_eval))
    }
}
