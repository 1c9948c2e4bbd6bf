//! Affine layer that skips zero input groups.
//!
//! The transformed features are mostly zero after clipping, so the input is
//! scanned in 4-byte groups and only non-zero groups touch the weights.

use std::io::{self, Read, Write};

use arrayvec::ArrayVec;

use super::affine_hash;
use crate::aligned::AlignedBox;
use crate::error::FormatError;
use crate::io::{read_i32s, write_i32s};

/// Input bytes consumed per weight block.
const GROUP: usize = 4;

/// Largest supported input width.
pub const MAX_INPUT: usize = crate::architecture::BIG_L1;

#[derive(Clone, PartialEq, Debug)]
pub struct AffineTransformSparseInput<const IN: usize, const OUT: usize> {
    pub(crate) biases: [i32; OUT],
    /// Group-major: block `g` holds `OUT` rows of the 4 weights for inputs
    /// `4g..4g + 4`.
    pub(crate) weights: AlignedBox<i8>,
}

impl<const IN: usize, const OUT: usize> AffineTransformSparseInput<IN, OUT> {
    const VALID: () = assert!(IN % 32 == 0 && IN <= MAX_INPUT);

    pub fn zeroed() -> Self {
        let () = Self::VALID;
        AffineTransformSparseInput { biases: [0; OUT], weights: AlignedBox::zeroed(OUT * IN) }
    }

    pub const fn hash_value(prev: u32) -> u32 {
        affine_hash(OUT, prev)
    }

    /// Memory slot of the weight found at row-major position `i` on disk.
    #[inline]
    pub const fn weight_index(i: usize) -> usize {
        (i / GROUP) % (IN / GROUP) * OUT * GROUP + i / IN * GROUP + i % GROUP
    }

    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUT]) {
        debug_assert_eq!(input.len(), IN);
        let mut nnz = ArrayVec::<u16, { MAX_INPUT / GROUP }>::new();
        for (g, chunk) in input.chunks_exact(GROUP).enumerate() {
            if chunk != [0; GROUP] {
                nnz.push(g as u16);
            }
        }

        *output = self.biases;
        for &g in &nnz {
            let g = usize::from(g);
            let x = &input[g * GROUP..(g + 1) * GROUP];
            let block = &self.weights[g * OUT * GROUP..(g + 1) * OUT * GROUP];
            for (out, w) in output.iter_mut().zip(block.chunks_exact(GROUP)) {
                *out += w.iter().zip(x).map(|(&w, &x)| i32::from(w) * i32::from(x)).sum::<i32>();
            }
        }
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> Result<(), FormatError> {
        read_i32s(reader, &mut self.biases)?;
        let mut raw = vec![0u8; OUT * IN];
        reader.read_exact(&mut raw)?;
        for (i, &b) in raw.iter().enumerate() {
            self.weights[Self::weight_index(i)] = b as i8;
        }
        Ok(())
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_i32s(writer, &self.biases)?;
        let raw: Vec<u8> = (0..OUT * IN).map(|i| self.weights[Self::weight_index(i)] as u8).collect();
        writer.write_all(&raw)
    }
}
