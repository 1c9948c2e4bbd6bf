//! `min((x * x) >> 19, 127)`: the squared activation branch.

use super::{ACTIVATION_MAX, WEIGHT_SCALE_BITS};

/// Squaring doubles the fraction bits; seven more bits keep the output
/// on the same scale as [`super::ClippedReLU`].
const SHIFT: u32 = 2 * WEIGHT_SCALE_BITS + 7;

pub struct SqrClippedReLU;

impl SqrClippedReLU {
    #[inline]
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        for (out, &x) in output.iter_mut().zip(input) {
            let sq = i64::from(x) * i64::from(x);
            *out = (sq >> SHIFT).min(i64::from(ACTIVATION_MAX)) as u8;
        }
    }
}
