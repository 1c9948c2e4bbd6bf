//! `clamp(x >> 6, 0, 127)`.

use super::{ACTIVATION_MAX, WEIGHT_SCALE_BITS};

pub struct ClippedReLU;

impl ClippedReLU {
    pub const fn hash_value(prev: u32) -> u32 {
        0x538D_24C7u32.wrapping_add(prev)
    }

    #[inline]
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        for (out, &x) in output.iter_mut().zip(input) {
            *out = (x >> WEIGHT_SCALE_BITS).clamp(0, ACTIVATION_MAX) as u8;
        }
    }
}
