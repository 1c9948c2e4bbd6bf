//! Vector arithmetic behind the feature transformer.
//!
//! [`VectorOps`] is the capability set the embedding code needs: lane-wise
//! 16-bit add/sub/min/max, a scaled high multiply and a saturating pack to
//! bytes. One implementation exists per instruction set plus a portable
//! [`Scalar`] fallback; [`Active`] names the one chosen by the build's
//! target features, so the hot path never branches on CPU capabilities.

/// Right shift the activation product must net: `(a * b) / 512` maps the
/// doubled load-time scale back to the canonical `0..=127` range.
pub const PRODUCT_SHIFT: i32 = 9;

/// Left shift applied to the first operand before a 16-bit high multiply.
///
/// A high multiply shifts the product right by 16; a doubling variant
/// shifts it left by one first. Solving `16 - doubling - pre = 9`.
pub const fn mulhi_preshift(doubling: bool) -> i32 {
    16 - doubling as i32 - PRODUCT_SHIFT
}

/// Lane-wise operations on vectors of `i16`.
///
/// # Safety
///
/// Pointer arguments must be valid for `LANES` elements (`2 * LANES` bytes
/// for [`VectorOps::pack_store`]). No alignment is required.
pub trait VectorOps {
    /// Human readable backend name.
    const NAME: &'static str;
    /// `i16` lanes per register.
    const LANES: usize;
    /// Order of 16-byte blocks that makes [`VectorOps::pack_store`] emit
    /// bytes in natural order. Applied to weights and biases at load time.
    const PACK_ORDER: [usize; 8];

    type Vec: Copy;

    unsafe fn load(src: *const i16) -> Self::Vec;
    unsafe fn store(dst: *mut i16, v: Self::Vec);
    unsafe fn splat(value: i16) -> Self::Vec;
    unsafe fn add(a: Self::Vec, b: Self::Vec) -> Self::Vec;
    unsafe fn sub(a: Self::Vec, b: Self::Vec) -> Self::Vec;
    unsafe fn min(a: Self::Vec, b: Self::Vec) -> Self::Vec;
    unsafe fn max(a: Self::Vec, b: Self::Vec) -> Self::Vec;

    /// `(a * b) >> 9` per lane, for `a` in `0..=254` and `b <= 254`.
    unsafe fn mul_product(a: Self::Vec, b: Self::Vec) -> Self::Vec;

    /// Saturate `lo` then `hi` to `u8` and store `2 * LANES` bytes.
    unsafe fn pack_store(dst: *mut u8, lo: Self::Vec, hi: Self::Vec);
}

/// Identity block order.
pub const NATURAL_ORDER: [usize; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Portable reference implementation.
pub struct Scalar;

const SCALAR_LANES: usize = 16;

impl VectorOps for Scalar {
    const NAME: &'static str = "scalar";
    const LANES: usize = SCALAR_LANES;
    const PACK_ORDER: [usize; 8] = NATURAL_ORDER;

    type Vec = [i16; SCALAR_LANES];

    #[inline]
    unsafe fn load(src: *const i16) -> Self::Vec {
        // SAFETY: caller guarantees LANES readable elements.
        unsafe { std::ptr::read_unaligned(src.cast::<Self::Vec>()) }
    }

    #[inline]
    unsafe fn store(dst: *mut i16, v: Self::Vec) {
        // SAFETY: caller guarantees LANES writable elements.
        unsafe { std::ptr::write_unaligned(dst.cast::<Self::Vec>(), v) }
    }

    #[inline]
    unsafe fn splat(value: i16) -> Self::Vec {
        [value; SCALAR_LANES]
    }

    #[inline]
    unsafe fn add(a: Self::Vec, b: Self::Vec) -> Self::Vec {
        std::array::from_fn(|i| a[i].wrapping_add(b[i]))
    }

    #[inline]
    unsafe fn sub(a: Self::Vec, b: Self::Vec) -> Self::Vec {
        std::array::from_fn(|i| a[i].wrapping_sub(b[i]))
    }

    #[inline]
    unsafe fn min(a: Self::Vec, b: Self::Vec) -> Self::Vec {
        std::array::from_fn(|i| a[i].min(b[i]))
    }

    #[inline]
    unsafe fn max(a: Self::Vec, b: Self::Vec) -> Self::Vec {
        std::array::from_fn(|i| a[i].max(b[i]))
    }

    #[inline]
    unsafe fn mul_product(a: Self::Vec, b: Self::Vec) -> Self::Vec {
        std::array::from_fn(|i| ((i32::from(a[i]) * i32::from(b[i])) >> PRODUCT_SHIFT) as i16)
    }

    #[inline]
    unsafe fn pack_store(dst: *mut u8, lo: Self::Vec, hi: Self::Vec) {
        let bytes: [u8; 2 * SCALAR_LANES] = std::array::from_fn(|i| {
            let v = if i < SCALAR_LANES { lo[i] } else { hi[i - SCALAR_LANES] };
            v.clamp(0, 255) as u8
        });
        // SAFETY: caller guarantees 2 * LANES writable bytes.
        unsafe { std::ptr::write_unaligned(dst.cast::<[u8; 2 * SCALAR_LANES]>(), bytes) }
    }
}

#[cfg(target_arch = "x86_64")]
pub use x86::Sse2;
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
pub use x86::Avx2;
#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
pub use arm::Neon;

/// Backend selected at build time.
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
pub type Active = Avx2;
#[cfg(all(target_arch = "x86_64", not(target_feature = "avx2")))]
pub type Active = Sse2;
#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
pub type Active = Neon;
#[cfg(not(any(target_arch = "x86_64", all(target_arch = "aarch64", target_feature = "neon"))))]
pub type Active = Scalar;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    use super::{NATURAL_ORDER, VectorOps, mulhi_preshift};

    const PRESHIFT: i32 = mulhi_preshift(false);

    /// 128-bit SSE2, baseline on every x86-64 CPU.
    pub struct Sse2;

    impl VectorOps for Sse2 {
        const NAME: &'static str = "sse2";
        const LANES: usize = 8;
        const PACK_ORDER: [usize; 8] = NATURAL_ORDER;

        type Vec = __m128i;

        #[inline]
        unsafe fn load(src: *const i16) -> __m128i {
            unsafe { _mm_loadu_si128(src.cast()) }
        }

        #[inline]
        unsafe fn store(dst: *mut i16, v: __m128i) {
            unsafe { _mm_storeu_si128(dst.cast(), v) }
        }

        #[inline]
        unsafe fn splat(value: i16) -> __m128i {
            unsafe { _mm_set1_epi16(value) }
        }

        #[inline]
        unsafe fn add(a: __m128i, b: __m128i) -> __m128i {
            unsafe { _mm_add_epi16(a, b) }
        }

        #[inline]
        unsafe fn sub(a: __m128i, b: __m128i) -> __m128i {
            unsafe { _mm_sub_epi16(a, b) }
        }

        #[inline]
        unsafe fn min(a: __m128i, b: __m128i) -> __m128i {
            unsafe { _mm_min_epi16(a, b) }
        }

        #[inline]
        unsafe fn max(a: __m128i, b: __m128i) -> __m128i {
            unsafe { _mm_max_epi16(a, b) }
        }

        #[inline]
        unsafe fn mul_product(a: __m128i, b: __m128i) -> __m128i {
            unsafe { _mm_mulhi_epi16(_mm_slli_epi16::<PRESHIFT>(a), b) }
        }

        #[inline]
        unsafe fn pack_store(dst: *mut u8, lo: __m128i, hi: __m128i) {
            unsafe { _mm_storeu_si128(dst.cast(), _mm_packus_epi16(lo, hi)) }
        }
    }

    /// 256-bit AVX2. `packus` works per 128-bit lane, which interleaves the
    /// two inputs; the block order undoes that.
    #[cfg(target_feature = "avx2")]
    pub struct Avx2;

    #[cfg(target_feature = "avx2")]
    impl VectorOps for Avx2 {
        const NAME: &'static str = "avx2";
        const LANES: usize = 16;
        const PACK_ORDER: [usize; 8] = [0, 2, 1, 3, 4, 6, 5, 7];

        type Vec = __m256i;

        #[inline]
        unsafe fn load(src: *const i16) -> __m256i {
            unsafe { _mm256_loadu_si256(src.cast()) }
        }

        #[inline]
        unsafe fn store(dst: *mut i16, v: __m256i) {
            unsafe { _mm256_storeu_si256(dst.cast(), v) }
        }

        #[inline]
        unsafe fn splat(value: i16) -> __m256i {
            unsafe { _mm256_set1_epi16(value) }
        }

        #[inline]
        unsafe fn add(a: __m256i, b: __m256i) -> __m256i {
            unsafe { _mm256_add_epi16(a, b) }
        }

        #[inline]
        unsafe fn sub(a: __m256i, b: __m256i) -> __m256i {
            unsafe { _mm256_sub_epi16(a, b) }
        }

        #[inline]
        unsafe fn min(a: __m256i, b: __m256i) -> __m256i {
            unsafe { _mm256_min_epi16(a, b) }
        }

        #[inline]
        unsafe fn max(a: __m256i, b: __m256i) -> __m256i {
            unsafe { _mm256_max_epi16(a, b) }
        }

        #[inline]
        unsafe fn mul_product(a: __m256i, b: __m256i) -> __m256i {
            unsafe { _mm256_mulhi_epi16(_mm256_slli_epi16::<PRESHIFT>(a), b) }
        }

        #[inline]
        unsafe fn pack_store(dst: *mut u8, lo: __m256i, hi: __m256i) {
            unsafe { _mm256_storeu_si256(dst.cast(), _mm256_packus_epi16(lo, hi)) }
        }
    }
}

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
mod arm {
    use std::arch::aarch64::*;

    use super::{NATURAL_ORDER, VectorOps, mulhi_preshift};

    // vqdmulhq doubles the product before taking the high half.
    const PRESHIFT: i32 = mulhi_preshift(true);

    /// 128-bit NEON.
    pub struct Neon;

    impl VectorOps for Neon {
        const NAME: &'static str = "neon";
        const LANES: usize = 8;
        const PACK_ORDER: [usize; 8] = NATURAL_ORDER;

        type Vec = int16x8_t;

        #[inline]
        unsafe fn load(src: *const i16) -> int16x8_t {
            unsafe { vld1q_s16(src) }
        }

        #[inline]
        unsafe fn store(dst: *mut i16, v: int16x8_t) {
            unsafe { vst1q_s16(dst, v) }
        }

        #[inline]
        unsafe fn splat(value: i16) -> int16x8_t {
            unsafe { vdupq_n_s16(value) }
        }

        #[inline]
        unsafe fn add(a: int16x8_t, b: int16x8_t) -> int16x8_t {
            unsafe { vaddq_s16(a, b) }
        }

        #[inline]
        unsafe fn sub(a: int16x8_t, b: int16x8_t) -> int16x8_t {
            unsafe { vsubq_s16(a, b) }
        }

        #[inline]
        unsafe fn min(a: int16x8_t, b: int16x8_t) -> int16x8_t {
            unsafe { vminq_s16(a, b) }
        }

        #[inline]
        unsafe fn max(a: int16x8_t, b: int16x8_t) -> int16x8_t {
            unsafe { vmaxq_s16(a, b) }
        }

        #[inline]
        unsafe fn mul_product(a: int16x8_t, b: int16x8_t) -> int16x8_t {
            unsafe { vqdmulhq_s16(vshlq_n_s16::<PRESHIFT>(a), b) }
        }

        #[inline]
        unsafe fn pack_store(dst: *mut u8, lo: int16x8_t, hi: int16x8_t) {
            unsafe { vst1q_u8(dst, vcombine_u8(vqmovun_s16(lo), vqmovun_s16(hi))) }
        }
    }
}

/// Reorder `data` in groups of `order.len()` blocks of `block_bytes` bytes:
/// block `j` of every group receives the group's block `order[j]`.
pub fn permute<T: Copy>(data: &mut [T], block_bytes: usize, order: &[usize]) {
    let block = block_bytes / size_of::<T>();
    let group = block * order.len();
    debug_assert!(block > 0 && data.len() % group == 0, "length must be a whole number of groups");

    let mut scratch = Vec::with_capacity(group);
    for chunk in data.chunks_exact_mut(group) {
        scratch.clear();
        scratch.extend_from_slice(chunk);
        for (dst, &src) in chunk.chunks_exact_mut(block).zip(order) {
            dst.copy_from_slice(&scratch[src * block..(src + 1) * block]);
        }
    }
}

/// The order that undoes `order`.
pub fn inverse_order<const N: usize>(order: &[usize; N]) -> [usize; N] {
    let mut inverse = [0; N];
    for (j, &src) in order.iter().enumerate() {
        inverse[src] = j;
    }
    inverse
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const AVX2_ORDER: [usize; 8] = [0, 2, 1, 3, 4, 6, 5, 7];
    const AVX512_ORDER: [usize; 8] = [0, 2, 4, 6, 1, 3, 5, 7];

    #[test]
    fn preshift_follows_multiply_semantics() {
        assert_eq!(mulhi_preshift(false), 7);
        assert_eq!(mulhi_preshift(true), 6);
    }

    #[test]
    fn permute_moves_whole_blocks() {
        // One group of eight 16-byte blocks = 64 i16 values.
        let mut data: Vec<i16> = (0..64).collect();
        permute(&mut data, 16, &AVX2_ORDER);
        assert_eq!(&data[0..8], &(0..8).collect::<Vec<i16>>()[..]);
        assert_eq!(&data[8..16], &(16..24).collect::<Vec<i16>>()[..]);
        assert_eq!(&data[16..24], &(8..16).collect::<Vec<i16>>()[..]);
    }

    #[test]
    fn inverse_of_inverse_is_original() {
        for order in [AVX2_ORDER, AVX512_ORDER, NATURAL_ORDER] {
            assert_eq!(inverse_order(&inverse_order(&order)), order);
        }
    }

    #[test]
    fn scalar_product_matches_reference_formula() {
        let a: [i16; 16] = std::array::from_fn(|i| (i as i16) * 16);
        let b: [i16; 16] = std::array::from_fn(|i| 254 - (i as i16) * 20);
        // SAFETY: plain array values.
        let p = unsafe { Scalar::mul_product(a, b) };
        for i in 0..16 {
            let expected = (i32::from(a[i]) * i32::from(b[i])) >> 9;
            assert_eq!(i32::from(p[i]), expected, "lane {i}");
        }
    }

    #[test]
    fn active_backend_matches_scalar_on_every_op() {
        let a: Vec<i16> = (0..64).map(|i| (i * 37 % 300) as i16 - 20).collect();
        let b: Vec<i16> = (0..64).map(|i| (i * 53 % 290) as i16 - 30).collect();
        assert_eq!(run_ops::<Active>(&a, &b), run_ops::<Scalar>(&a, &b), "backend {}", Active::NAME);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn sse2_matches_scalar_on_every_op() {
        let a: Vec<i16> = (0..64).map(|i| (i * 91 % 260) as i16).collect();
        let b: Vec<i16> = (0..64).map(|i| (i * 17 % 512) as i16 - 256).collect();
        assert_eq!(run_ops::<Sse2>(&a, &b), run_ops::<Scalar>(&a, &b));
    }

    /// Clamp-multiply-pack over 64 lanes, the same sequence the transformer
    /// output runs. Packing is done pairwise on natural-order data, so this
    /// only compares backends whose packs are order-preserving or restores
    /// order through `PACK_ORDER`.
    fn run_ops<V: VectorOps>(a: &[i16], b: &[i16]) -> (Vec<i16>, Vec<u8>) {
        let mut arith = vec![0i16; a.len()];
        let mut permuted_a = a.to_vec();
        let mut permuted_b = b.to_vec();
        permute(&mut permuted_a, 16, &V::PACK_ORDER);
        permute(&mut permuted_b, 16, &V::PACK_ORDER);
        let mut packed = vec![0u8; a.len()];
        // SAFETY: every pointer stays within the 64-element buffers.
        unsafe {
            let zero = V::splat(0);
            let top = V::splat(254);
            for i in (0..a.len()).step_by(V::LANES) {
                let x = V::load(a.as_ptr().add(i));
                let y = V::load(b.as_ptr().add(i));
                let mixed = V::sub(V::add(x, y), V::max(V::min(x, y), zero));
                V::store(arith.as_mut_ptr().add(i), mixed);
            }
            for i in (0..a.len()).step_by(2 * V::LANES) {
                let x0 = V::max(V::min(V::load(permuted_a.as_ptr().add(i)), top), zero);
                let x1 = V::max(V::min(V::load(permuted_a.as_ptr().add(i + V::LANES)), top), zero);
                let y0 = V::min(V::load(permuted_b.as_ptr().add(i)), top);
                let y1 = V::min(V::load(permuted_b.as_ptr().add(i + V::LANES)), top);
                V::pack_store(packed.as_mut_ptr().add(i), V::mul_product(x0, y0), V::mul_product(x1, y1));
            }
        }
        (arith, packed)
    }

    proptest! {
        #[test]
        fn permutation_then_inverse_is_identity(values in proptest::collection::vec(any::<i16>(), 64 * 4)) {
            for order in [AVX2_ORDER, AVX512_ORDER] {
                let mut data = values.clone();
                permute(&mut data, 16, &order);
                permute(&mut data, 16, &inverse_order(&order));
                prop_assert_eq!(&data, &values);
            }
        }

        #[test]
        fn i32_permutation_then_inverse_is_identity(values in proptest::collection::vec(any::<i32>(), 32 * 3)) {
            let mut data = values.clone();
            permute(&mut data, 16, &AVX2_ORDER);
            permute(&mut data, 16, &inverse_order(&AVX2_ORDER));
            prop_assert_eq!(data, values);
        }
    }
}
