//! Input layer: feature weights, the accumulator update kernels and the
//! clipped pairwise-product output.
//!
//! Parameters are held at twice their trained scale and with 16-byte blocks
//! reordered for the active backend's saturating pack. Both transforms are
//! undone when writing, so a saved file matches the one that was loaded.

use std::io::{self, Read, Write};

use rand::Rng;
use vela_core::{Board, Color};

use crate::accumulator::Accumulator;
use crate::aligned::AlignedBox;
use crate::architecture::PSQT_BUCKETS;
use crate::error::FormatError;
use crate::features::{self, INPUT_DIMENSIONS, IndexList};
use crate::io::{read_leb128, write_leb128};
use crate::simd::{Active, VectorOps, inverse_order, permute};

/// Size in bytes of the blocks moved by the pack permutation.
const PACK_BLOCK_BYTES: usize = 16;

/// Upper clip of a doubled-scale activation (127 canonical).
const CLIP_MAX: i16 = 254;

/// Registers held across one tile of an accumulator update.
const TILE_REGISTERS: usize = 8;

#[derive(Clone, PartialEq, Debug)]
pub struct FeatureTransformer<const L1: usize> {
    pub(crate) biases: AlignedBox<i16>,
    /// Feature-major: column `f` is `weights[f * L1..(f + 1) * L1]`.
    pub(crate) weights: AlignedBox<i16>,
    pub(crate) psqt_weights: AlignedBox<i32>,
}

impl<const L1: usize> FeatureTransformer<L1> {
    const VALID: () = assert!(L1 % 128 == 0, "L1 must fill whole update tiles");

    pub fn zeroed() -> Self {
        let () = Self::VALID;
        FeatureTransformer {
            biases: AlignedBox::zeroed(L1),
            weights: AlignedBox::zeroed(INPUT_DIMENSIONS * L1),
            psqt_weights: AlignedBox::zeroed(INPUT_DIMENSIONS * PSQT_BUCKETS),
        }
    }

    pub const fn hash_value() -> u32 {
        features::HASH_VALUE ^ (L1 as u32 * 2)
    }

    #[inline]
    pub(crate) fn weight_column(&self, index: u32) -> &[i16] {
        let start = index as usize * L1;
        &self.weights[start..start + L1]
    }

    #[inline]
    pub(crate) fn psqt_column(&self, index: u32) -> &[i32] {
        let start = index as usize * PSQT_BUCKETS;
        &self.psqt_weights[start..start + PSQT_BUCKETS]
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> Result<(), FormatError> {
        read_leb128(reader, &mut self.biases)?;
        read_leb128(reader, &mut self.weights)?;
        read_leb128(reader, &mut self.psqt_weights)?;

        if self.biases.iter().chain(self.weights.iter()).any(|&v| v.checked_mul(2).is_none()) {
            return Err(FormatError::Leb128("feature weight too large for the doubled scale"));
        }
        self.to_runtime_layout::<Active>();
        Ok(())
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut biases = self.biases.clone();
        let mut weights = self.weights.clone();
        to_storage::<Active>(&mut biases);
        to_storage::<Active>(&mut weights);

        write_leb128(writer, &biases)?;
        write_leb128(writer, &weights)?;
        write_leb128(writer, &self.psqt_weights)
    }

    /// Double the canonical values and reorder them for `V`.
    pub(crate) fn to_runtime_layout<V: VectorOps>(&mut self) {
        for v in self.biases.iter_mut().chain(self.weights.iter_mut()) {
            *v *= 2;
        }
        permute(&mut self.biases, PACK_BLOCK_BYTES, &V::PACK_ORDER);
        permute(&mut self.weights, PACK_BLOCK_BYTES, &V::PACK_ORDER);
    }

    /// Fill with canonical-scale random parameters, then convert for the
    /// active backend.
    pub(crate) fn randomize<G: Rng>(&mut self, rng: &mut G) {
        self.randomize_canonical(rng);
        self.to_runtime_layout::<Active>();
    }

    pub(crate) fn randomize_canonical<G: Rng>(&mut self, rng: &mut G) {
        for b in self.biases.iter_mut() {
            *b = rng.random_range(-64..=64);
        }
        for w in self.weights.iter_mut() {
            *w = rng.random_range(-40..=40);
        }
        for w in self.psqt_weights.iter_mut() {
            *w = rng.random_range(-2000..=2000);
        }
    }

    /// Compute one perspective's accumulation from nothing but the board.
    pub fn compute_full(&self, board: &Board, perspective: Color, acc: &mut [i16; L1], psqt: &mut [i32; PSQT_BUCKETS]) {
        let mut active = IndexList::new();
        features::append_active_indices(perspective, board, &mut active);

        acc.copy_from_slice(&self.biases);
        *psqt = [0; PSQT_BUCKETS];
        self.update_in_place::<Active>(acc, &[], &active);
        self.update_psqt(psqt, &[], &active);
    }

    /// `dst = src - Σ removed + Σ added`, one register tile at a time.
    #[inline]
    pub(crate) fn update<V: VectorOps>(&self, src: &[i16; L1], dst: &mut [i16; L1], removed: &[u32], added: &[u32]) {
        // SAFETY: both arrays hold L1 elements and the kernel stays in bounds.
        unsafe { self.update_tiles::<V>(src.as_ptr(), dst.as_mut_ptr(), removed, added) }
    }

    #[inline]
    pub(crate) fn update_in_place<V: VectorOps>(&self, acc: &mut [i16; L1], removed: &[u32], added: &[u32]) {
        let ptr = acc.as_mut_ptr();
        // SAFETY: each tile is fully loaded before it is stored, so reading
        // and writing the same buffer is sound.
        unsafe { self.update_tiles::<V>(ptr, ptr, removed, added) }
    }

    /// # Safety
    ///
    /// `src` and `dst` must be valid for `L1` elements. They may be equal
    /// but must not otherwise overlap.
    unsafe fn update_tiles<V: VectorOps>(&self, src: *const i16, dst: *mut i16, removed: &[u32], added: &[u32]) {
        let tile = TILE_REGISTERS * V::LANES;
        debug_assert_eq!(L1 % tile, 0);

        for base in (0..L1).step_by(tile) {
            // SAFETY: base + k * LANES + LANES <= L1 for every register.
            unsafe {
                let mut regs: [V::Vec; TILE_REGISTERS] =
                    std::array::from_fn(|k| V::load(src.add(base + k * V::LANES)));
                for &index in removed {
                    let column = self.weight_column(index).as_ptr().add(base);
                    for (k, reg) in regs.iter_mut().enumerate() {
                        *reg = V::sub(*reg, V::load(column.add(k * V::LANES)));
                    }
                }
                for &index in added {
                    let column = self.weight_column(index).as_ptr().add(base);
                    for (k, reg) in regs.iter_mut().enumerate() {
                        *reg = V::add(*reg, V::load(column.add(k * V::LANES)));
                    }
                }
                for (k, reg) in regs.iter().enumerate() {
                    V::store(dst.add(base + k * V::LANES), *reg);
                }
            }
        }
    }

    pub(crate) fn update_psqt(&self, psqt: &mut [i32; PSQT_BUCKETS], removed: &[u32], added: &[u32]) {
        for &index in removed {
            for (p, &w) in psqt.iter_mut().zip(self.psqt_column(index)) {
                *p -= w;
            }
        }
        for &index in added {
            for (p, &w) in psqt.iter_mut().zip(self.psqt_column(index)) {
                *p += w;
            }
        }
    }

    /// Write the clipped activations of both perspectives, side to move
    /// first, and return the auxiliary score for `bucket`.
    pub fn transform(&self, acc: &Accumulator<L1>, side_to_move: Color, bucket: usize, output: &mut [u8; L1]) -> i32 {
        transform_with::<Active, L1>(acc, side_to_move, bucket, output)
    }
}

fn transform_with<V: VectorOps, const L1: usize>(
    acc: &Accumulator<L1>,
    side_to_move: Color,
    bucket: usize,
    output: &mut [u8; L1],
) -> i32 {
    debug_assert!(acc.computed == [true; 2], "transforming a stale accumulator");
    let perspectives = [side_to_move, !side_to_move];

    let half = L1 / 2;
    for (p, perspective) in perspectives.into_iter().enumerate() {
        pack_half::<V>(&acc.accumulation[perspective.index()], &mut output[p * half..(p + 1) * half]);
    }

    let us = side_to_move.index();
    let them = (!side_to_move).index();
    (acc.psqt[us][bucket] - acc.psqt[them][bucket]) / 2
}

/// `out[j] = clamp(a[j], 0, 254) * min(a[j + n], 254) / 512` for the two
/// halves of `acc`, saturated to bytes.
#[inline]
fn pack_half<V: VectorOps>(acc: &[i16], out: &mut [u8]) {
    let half = acc.len() / 2;
    debug_assert_eq!(out.len(), half);
    debug_assert_eq!(half % (2 * V::LANES), 0);

    // SAFETY: every load reads LANES elements below acc.len() and every
    // store writes 2 * LANES bytes below out.len().
    unsafe {
        let zero = V::splat(0);
        let top = V::splat(CLIP_MAX);
        let a = acc.as_ptr();
        for j in (0..half).step_by(2 * V::LANES) {
            let s0a = V::max(V::min(V::load(a.add(j)), top), zero);
            let s0b = V::max(V::min(V::load(a.add(j + V::LANES)), top), zero);
            let s1a = V::min(V::load(a.add(half + j)), top);
            let s1b = V::min(V::load(a.add(half + j + V::LANES)), top);
            V::pack_store(out.as_mut_ptr().add(j), V::mul_product(s0a, s1a), V::mul_product(s0b, s1b));
        }
    }
}

/// Undo [`FeatureTransformer::to_runtime_layout`] on a copy.
fn to_storage<V: VectorOps>(values: &mut [i16]) {
    permute(values, PACK_BLOCK_BYTES, &inverse_order(&V::PACK_ORDER));
    for v in values.iter_mut() {
        *v /= 2;
    }
}

/// Scalar reference for the transformer output on natural-order data.
#[cfg(test)]
pub(crate) fn reference_output<const L1: usize>(acc: &[i16; L1]) -> Vec<u8> {
    let half = L1 / 2;
    (0..half)
        .map(|j| {
            let a = i32::from(acc[j]).clamp(0, i32::from(CLIP_MAX));
            let b = i32::from(acc[half + j]).min(i32::from(CLIP_MAX));
            ((a * b) >> 9).clamp(0, 255) as u8
        })
        .collect()
}
