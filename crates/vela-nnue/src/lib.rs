//! Efficiently updatable neural network evaluation.
//!
//! A [`Networks`] bundle is loaded once and shared by every search thread.
//! Each thread owns an [`AccumulatorStack`] that follows its make/unmake
//! moves and an [`AccumulatorCaches`] set used to refresh accumulators
//! after king moves.

pub mod accumulator;
pub mod aligned;
pub mod architecture;
pub mod cache;
mod error;
pub mod evaluate;
pub mod feature_transformer;
pub mod features;
pub mod io;
pub mod layers;
pub mod network;
pub mod simd;

pub use accumulator::{Accumulator, AccumulatorStack, AccumulatorState, AccumulatorStats, MAX_PLY};
pub use architecture::{BIG_L1, SMALL_L1};
pub use cache::AccumulatorCaches;
pub use error::FormatError;
pub use evaluate::{EvalTrace, evaluate, trace};
pub use network::{EvalFiles, Network, NetworkOutput, NetworkTrace, Networks};
