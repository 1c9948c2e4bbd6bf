//! Network dimensions and the per-bucket propagation pipeline.

use std::io::{self, Read, Write};

use rand::Rng;

use crate::error::FormatError;
use crate::layers::{
    AffineTransform, AffineTransformSparseInput, ClippedReLU, SqrClippedReLU, WEIGHT_SCALE_BITS,
};

/// Embedding width of the big network.
pub const BIG_L1: usize = 3072;
/// Embedding width of the small network.
pub const SMALL_L1: usize = 128;
/// Width of the first hidden layer, excluding the forward output.
pub const L2: usize = 15;
pub const L3: usize = 32;

/// Buckets of the linear auxiliary score.
pub const PSQT_BUCKETS: usize = 8;
/// Independent pipelines, selected by piece count like the PSQT buckets.
pub const LAYER_STACKS: usize = 8;

/// Network output units per centipawn-like internal unit.
pub const OUTPUT_SCALE: i32 = 16;

const FC_0_OUT: usize = L2 + 1;
const FC_1_IN: usize = 2 * L2;

/// One layer stack: sparse affine, a squared and a plain clip of the same
/// pre-activation, a dense affine, a clip and a final affine.
#[derive(Clone, PartialEq, Debug)]
pub struct Architecture<const L1: usize> {
    pub(crate) fc_0: AffineTransformSparseInput<L1, FC_0_OUT>,
    pub(crate) fc_1: AffineTransform<FC_1_IN, L3>,
    pub(crate) fc_2: AffineTransform<L3, 1>,
}

impl<const L1: usize> Architecture<L1> {
    pub fn zeroed() -> Self {
        Architecture {
            fc_0: AffineTransformSparseInput::zeroed(),
            fc_1: AffineTransform::zeroed(),
            fc_2: AffineTransform::zeroed(),
        }
    }

    /// Structural hash of the stack; the squared branch has no parameters
    /// of its own and does not contribute.
    pub const fn hash_value() -> u32 {
        let mut h = 0xEC42_E90Du32 ^ (L1 as u32 * 2);
        h = AffineTransformSparseInput::<L1, FC_0_OUT>::hash_value(h);
        h = ClippedReLU::hash_value(h);
        h = AffineTransform::<FC_1_IN, L3>::hash_value(h);
        h = ClippedReLU::hash_value(h);
        h = AffineTransform::<L3, 1>::hash_value(h);
        h
    }

    /// Map the transformed features to the positional output.
    pub fn propagate(&self, transformed: &[u8]) -> i32 {
        let mut fc_0_out = [0i32; FC_0_OUT];
        self.fc_0.propagate(transformed, &mut fc_0_out);

        let mut fc_1_in = [0u8; AffineTransform::<FC_1_IN, L3>::PADDED_INPUT];
        SqrClippedReLU::propagate(&fc_0_out[..L2], &mut fc_1_in[..L2]);
        ClippedReLU::propagate(&fc_0_out[..L2], &mut fc_1_in[L2..FC_1_IN]);

        let mut fc_1_out = [0i32; L3];
        self.fc_1.propagate(&fc_1_in, &mut fc_1_out);

        let mut fc_2_in = [0u8; L3];
        ClippedReLU::propagate(&fc_1_out, &mut fc_2_in);

        let mut fc_2_out = [0i32; 1];
        self.fc_2.propagate(&fc_2_in, &mut fc_2_out);

        // The last fc_0 output bypasses the hidden layers, rescaled from
        // activation units to output units.
        let forward = fc_0_out[L2] * (600 * OUTPUT_SCALE) / (127 * (1 << WEIGHT_SCALE_BITS));
        fc_2_out[0] + forward
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> Result<(), FormatError> {
        self.fc_0.read_parameters(reader)?;
        self.fc_1.read_parameters(reader)?;
        self.fc_2.read_parameters(reader)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.fc_0.write_parameters(writer)?;
        self.fc_1.write_parameters(writer)?;
        self.fc_2.write_parameters(writer)
    }

    /// Random parameters of roughly trained magnitude.
    pub(crate) fn randomize<G: Rng>(&mut self, rng: &mut G) {
        for b in &mut self.fc_0.biases {
            *b = rng.random_range(-2000..=2000);
        }
        for w in self.fc_0.weights.iter_mut() {
            *w = rng.random_range(-24..=24);
        }
        for b in &mut self.fc_1.biases {
            *b = rng.random_range(-1000..=1000);
        }
        for w in self.fc_1.weights.iter_mut() {
            *w = rng.random_range(-32..=32);
        }
        self.fc_2.biases[0] = rng.random_range(-500..=500);
        for w in self.fc_2.weights.iter_mut() {
            *w = rng.random_range(-64..=64);
        }
    }
}
