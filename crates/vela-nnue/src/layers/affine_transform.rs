//! Dense affine layer with `i8` weights and `i32` accumulators.

use std::io::{self, Read, Write};

use super::{affine_hash, padded};
use crate::aligned::AlignedBox;
use crate::error::FormatError;
use crate::io::{read_i8s, read_i32s, write_i8s, write_i32s};

/// `out[k] = bias[k] + Σ weight[k][c] * in[c]` over the padded input width.
///
/// Weights are row-major, `OUT` rows of `padded(IN)` columns, which is
/// also their order on disk.
#[derive(Clone, PartialEq, Debug)]
pub struct AffineTransform<const IN: usize, const OUT: usize> {
    pub(crate) biases: [i32; OUT],
    pub(crate) weights: AlignedBox<i8>,
}

impl<const IN: usize, const OUT: usize> AffineTransform<IN, OUT> {
    /// Input width including padding columns.
    pub const PADDED_INPUT: usize = padded(IN);

    pub fn zeroed() -> Self {
        AffineTransform { biases: [0; OUT], weights: AlignedBox::zeroed(OUT * Self::PADDED_INPUT) }
    }

    pub const fn hash_value(prev: u32) -> u32 {
        affine_hash(OUT, prev)
    }

    /// `input` must hold [`Self::PADDED_INPUT`] bytes; padding bytes are zero.
    #[inline]
    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUT]) {
        debug_assert_eq!(input.len(), Self::PADDED_INPUT);
        for ((out, &bias), row) in output
            .iter_mut()
            .zip(&self.biases)
            .zip(self.weights.chunks_exact(Self::PADDED_INPUT))
        {
            *out = bias + row.iter().zip(input).map(|(&w, &x)| i32::from(w) * i32::from(x)).sum::<i32>();
        }
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> Result<(), FormatError> {
        read_i32s(reader, &mut self.biases)?;
        read_i8s(reader, &mut self.weights)?;
        Ok(())
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_i32s(writer, &self.biases)?;
        write_i8s(writer, &self.weights)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::AffineTransform;

    #[test]
    fn dense_product_with_bias() {
        let mut layer = AffineTransform::<30, 2>::zeroed();
        layer.biases = [10, -10];
        for c in 0..30 {
            layer.weights[c] = 1;
            layer.weights[32 + c] = -2;
        }
        let mut input = [0u8; 32];
        input[..30].fill(3);
        let mut out = [0; 2];
        layer.propagate(&input, &mut out);
        assert_eq!(out, [10 + 90, -10 - 180]);
    }

    #[test]
    fn padding_columns_do_not_contribute() {
        let mut layer = AffineTransform::<30, 1>::zeroed();
        layer.weights[30] = 100;
        layer.weights[31] = 100;
        let mut input = [1u8; 32];
        input[30] = 0;
        input[31] = 0;
        let mut out = [0; 1];
        layer.propagate(&input, &mut out);
        assert_eq!(out, [0]);
    }

    #[test]
    fn parameters_roundtrip() {
        let mut layer = AffineTransform::<32, 1>::zeroed();
        layer.biases = [-12345];
        for (i, w) in layer.weights.iter_mut().enumerate() {
            *w = (i as i8).wrapping_mul(7);
        }
        let mut buf = Vec::new();
        layer.write_parameters(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 32);

        let mut back = AffineTransform::<32, 1>::zeroed();
        back.read_parameters(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, layer);
    }

    #[test]
    fn hash_depends_on_output_width_and_previous() {
        assert_ne!(AffineTransform::<32, 1>::hash_value(0), AffineTransform::<32, 2>::hash_value(0));
        assert_ne!(AffineTransform::<32, 1>::hash_value(1), AffineTransform::<32, 1>::hash_value(2));
        assert_eq!(AffineTransform::<32, 1>::hash_value(0), 0xCC03_DAE5);
    }
}
