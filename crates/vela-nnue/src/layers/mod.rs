//! Building blocks of the propagation pipeline.

mod affine_transform;
mod affine_transform_sparse_input;
mod clipped_relu;
mod sqr_clipped_relu;

pub use affine_transform::AffineTransform;
pub use affine_transform_sparse_input::AffineTransformSparseInput;
pub use clipped_relu::ClippedReLU;
pub use sqr_clipped_relu::SqrClippedReLU;

/// Fixed-point scale of layer weights: activations carry six fraction bits.
pub const WEIGHT_SCALE_BITS: u32 = 6;

/// Largest value an activation may take.
pub const ACTIVATION_MAX: i32 = 127;

/// Input widths are padded to a multiple of this many bytes.
pub const INPUT_PADDING: usize = 32;

/// `n` rounded up to [`INPUT_PADDING`].
pub const fn padded(n: usize) -> usize {
    n.div_ceil(INPUT_PADDING) * INPUT_PADDING
}

/// Structural hash of an affine layer with `outputs` outputs on top of `prev`.
pub const fn affine_hash(outputs: usize, prev: u32) -> u32 {
    let mut h = 0xCC03_DAE4u32.wrapping_add(outputs as u32);
    h ^= prev >> 1;
    h ^= prev << 31;
    h
}
