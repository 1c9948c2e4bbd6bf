//! Accumulators and the stack that mirrors the search's make/unmake.
//!
//! States are filled lazily. Evaluating the top state walks down to the
//! nearest state that is already computed, or to the last move of the
//! perspective's own king, and then either updates forward from the
//! computed state or refreshes the top through the cache and updates
//! backward so the intermediate states become reusable too.

use vela_core::{Board, Color, DirtyPiece};

use crate::architecture::{BIG_L1, PSQT_BUCKETS, SMALL_L1};
use crate::cache::{AccumulatorCaches, Cache};
use crate::evaluate::use_small_net;
use crate::feature_transformer::FeatureTransformer;
use crate::features::{self, ChangeList};
use crate::network::Networks;
use crate::simd::Active;

/// Deepest supported search ply. The stack holds `MAX_PLY + 1` states,
/// the root included.
pub const MAX_PLY: usize = 254;

/// Both perspectives' embeddings for one network width.
#[derive(Clone, PartialEq, Debug)]
#[repr(C, align(64))]
pub struct Accumulator<const L1: usize> {
    pub accumulation: [[i16; L1]; Color::COUNT],
    pub psqt: [[i32; PSQT_BUCKETS]; Color::COUNT],
    pub computed: [bool; Color::COUNT],
}

impl<const L1: usize> Default for Accumulator<L1> {
    fn default() -> Self {
        Accumulator {
            accumulation: [[0; L1]; Color::COUNT],
            psqt: [[0; PSQT_BUCKETS]; Color::COUNT],
            computed: [false; Color::COUNT],
        }
    }
}

/// One search node: the move that produced it and an accumulator per
/// network width.
#[derive(Clone, Default)]
pub struct AccumulatorState {
    /// `None` only for the root.
    pub dirty_piece: Option<DirtyPiece>,
    big: Accumulator<BIG_L1>,
    small: Accumulator<SMALL_L1>,
}

/// Picks the accumulator of width `L1` out of a state.
pub trait AccumulatorFor<const L1: usize> {
    fn accumulator(&self) -> &Accumulator<L1>;
    fn accumulator_mut(&mut self) -> &mut Accumulator<L1>;
}

impl AccumulatorFor<BIG_L1> for AccumulatorState {
    #[inline]
    fn accumulator(&self) -> &Accumulator<BIG_L1> {
        &self.big
    }

    #[inline]
    fn accumulator_mut(&mut self) -> &mut Accumulator<BIG_L1> {
        &mut self.big
    }
}

impl AccumulatorFor<SMALL_L1> for AccumulatorState {
    #[inline]
    fn accumulator(&self) -> &Accumulator<SMALL_L1> {
        &self.small
    }

    #[inline]
    fn accumulator_mut(&mut self) -> &mut Accumulator<SMALL_L1> {
        &mut self.small
    }
}

impl AccumulatorState {
    #[inline]
    fn acc<const L1: usize>(&self) -> &Accumulator<L1>
    where
        Self: AccumulatorFor<L1>,
    {
        AccumulatorFor::<L1>::accumulator(self)
    }

    #[inline]
    fn acc_mut<const L1: usize>(&mut self) -> &mut Accumulator<L1>
    where
        Self: AccumulatorFor<L1>,
    {
        AccumulatorFor::<L1>::accumulator_mut(self)
    }

    fn invalidate(&mut self) {
        self.big.computed = [false; Color::COUNT];
        self.small.computed = [false; Color::COUNT];
    }
}

/// How an accumulator got computed, per perspective.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Cache-assisted refreshes.
    pub refreshes: u64,
    /// Plies updated from their parent.
    pub forward_steps: u64,
    /// Plies updated from their child.
    pub backward_steps: u64,
}

/// A fixed-capacity stack of [`AccumulatorState`]s, one per ply.
pub struct AccumulatorStack {
    states: Vec<AccumulatorState>,
    size: usize,
    scan_limit: usize,
    #[cfg(feature = "nnue-stats")]
    stats: [AccumulatorStats; Color::COUNT],
}

impl Default for AccumulatorStack {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatorStack {
    pub fn new() -> Self {
        Self::with_scan_limit(MAX_PLY)
    }

    /// Build a stack that looks at most `limit` plies below the top for a
    /// computed accumulator before refreshing the top through the cache.
    /// A limit of 0 refreshes whenever the top is not already computed.
    pub fn with_scan_limit(limit: usize) -> Self {
        let states = (0..=MAX_PLY).map(|_| AccumulatorState::default()).collect();
        AccumulatorStack {
            states,
            size: 1,
            scan_limit: limit,
            #[cfg(feature = "nnue-stats")]
            stats: [AccumulatorStats::default(); Color::COUNT],
        }
    }

    /// Drop every ply and mark the root stale. The next evaluation
    /// recomputes it.
    pub fn reset(&mut self) {
        self.size = 1;
        self.states[0].dirty_piece = None;
        self.states[0].invalidate();
    }

    /// Enter the position reached by the move described by `dp`.
    ///
    /// # Panics
    ///
    /// If the stack already holds `MAX_PLY + 1` states.
    pub fn push(&mut self, dp: DirtyPiece) {
        assert!(self.size < self.states.len(), "accumulator stack overflow");
        let state = &mut self.states[self.size];
        state.dirty_piece = Some(dp);
        state.invalidate();
        self.size += 1;
    }

    pub fn pop(&mut self) {
        debug_assert!(self.size > 1, "popped the root accumulator");
        self.size -= 1;
    }

    /// Number of live states, the root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn latest<const L1: usize>(&self) -> &Accumulator<L1>
    where
        AccumulatorState: AccumulatorFor<L1>,
    {
        self.states[self.size - 1].acc::<L1>()
    }

    /// Make sure both perspectives of the top accumulator match `board`.
    pub fn evaluate<const L1: usize>(&mut self, board: &Board, ft: &FeatureTransformer<L1>, cache: &mut Cache<L1>)
    where
        AccumulatorState: AccumulatorFor<L1>,
    {
        for perspective in Color::ALL {
            self.evaluate_side(board, perspective, ft, cache);
        }
    }

    /// Compute the top accumulator of whichever network the next
    /// evaluation of `board` will most likely use.
    pub fn hint_common_access(&mut self, board: &Board, networks: &Networks, caches: &mut AccumulatorCaches) {
        if use_small_net(board) {
            self.evaluate(board, &networks.small.feature_transformer, &mut caches.small);
        } else {
            self.evaluate(board, &networks.big.feature_transformer, &mut caches.big);
        }
    }

    fn evaluate_side<const L1: usize>(
        &mut self,
        board: &Board,
        perspective: Color,
        ft: &FeatureTransformer<L1>,
        cache: &mut Cache<L1>,
    ) where
        AccumulatorState: AccumulatorFor<L1>,
    {
        let top = self.size - 1;
        let p = perspective.index();
        if self.states[top].acc::<L1>().computed[p] {
            return;
        }

        let last = self.find_last_usable::<L1>(perspective);
        if self.states[last].acc::<L1>().computed[p] {
            for next in last + 1..=top {
                self.forward_step(board, perspective, ft, next);
            }
            self.record(perspective, |s| s.forward_steps += (top - last) as u64);
        } else {
            cache.refresh(ft, board, perspective, self.states[top].acc_mut::<L1>());
            for next in (last..top).rev() {
                self.backward_step(board, perspective, ft, next);
            }
            self.record(perspective, |s| {
                s.refreshes += 1;
                s.backward_steps += (top - last) as u64;
            });
        }
    }

    /// Index of the highest state below the top that is either computed
    /// for `perspective` or begins with a move of its king. Falls back to
    /// the top itself once `scan_limit` plies were inspected.
    fn find_last_usable<const L1: usize>(&self, perspective: Color) -> usize
    where
        AccumulatorState: AccumulatorFor<L1>,
    {
        let top = self.size - 1;
        for idx in (1..=top).rev() {
            let state = &self.states[idx];
            if state.acc::<L1>().computed[perspective.index()]
                || state.dirty_piece.is_some_and(|dp| features::requires_refresh(&dp, perspective))
            {
                return idx;
            }
            if top - idx >= self.scan_limit {
                return top;
            }
        }
        0
    }

    /// Compute state `next` from `next - 1`.
    fn forward_step<const L1: usize>(&mut self, board: &Board, perspective: Color, ft: &FeatureTransformer<L1>, next: usize)
    where
        AccumulatorState: AccumulatorFor<L1>,
    {
        let (before, after) = self.states.split_at_mut(next);
        let dst_state = &mut after[0];
        let Some(dp) = dst_state.dirty_piece else {
            debug_assert!(false, "non-root state without a move");
            return;
        };

        let (mut removed, mut added) = (ChangeList::new(), ChangeList::new());
        features::append_changed_indices(perspective, board.king_square(perspective), &dp, &mut removed, &mut added);

        let src = before[next - 1].acc::<L1>();
        apply_change(ft, perspective, src, dst_state.acc_mut::<L1>(), &removed, &added);
    }

    /// Compute state `next` from `next + 1` by undoing the latter's move.
    fn backward_step<const L1: usize>(&mut self, board: &Board, perspective: Color, ft: &FeatureTransformer<L1>, next: usize)
    where
        AccumulatorState: AccumulatorFor<L1>,
    {
        let (before, after) = self.states.split_at_mut(next + 1);
        let src_state = &after[0];
        let Some(dp) = src_state.dirty_piece else {
            debug_assert!(false, "non-root state without a move");
            return;
        };

        let (mut removed, mut added) = (ChangeList::new(), ChangeList::new());
        features::append_changed_indices(perspective, board.king_square(perspective), &dp, &mut removed, &mut added);

        apply_change(ft, perspective, src_state.acc::<L1>(), before[next].acc_mut::<L1>(), &added, &removed);
    }

    #[inline]
    fn record(&mut self, perspective: Color, f: impl FnOnce(&mut AccumulatorStats)) {
        #[cfg(feature = "nnue-stats")]
        f(&mut self.stats[perspective.index()]);
        #[cfg(not(feature = "nnue-stats"))]
        let _ = (perspective, f);
    }

    #[cfg(feature = "nnue-stats")]
    pub fn stats(&self, perspective: Color) -> AccumulatorStats {
        self.stats[perspective.index()]
    }

    /// Log the counters at debug level and zero them.
    #[cfg(feature = "nnue-stats")]
    pub fn reset_stats(&mut self) {
        for perspective in Color::ALL {
            let s = self.stats[perspective.index()];
            tracing::debug!(
                %perspective,
                refreshes = s.refreshes,
                forward_steps = s.forward_steps,
                backward_steps = s.backward_steps,
                "accumulator stats"
            );
        }
        self.stats = [AccumulatorStats::default(); Color::COUNT];
    }
}

fn apply_change<const L1: usize>(
    ft: &FeatureTransformer<L1>,
    perspective: Color,
    src: &Accumulator<L1>,
    dst: &mut Accumulator<L1>,
    removed: &[u32],
    added: &[u32],
) {
    let p = perspective.index();
    ft.update::<Active>(&src.accumulation[p], &mut dst.accumulation[p], removed, added);
    dst.psqt[p] = src.psqt[p];
    ft.update_psqt(&mut dst.psqt[p], removed, added);
    dst.computed[p] = true;
}
