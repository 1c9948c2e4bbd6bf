//! A complete network: feature transformer plus one layer stack per
//! bucket, its file format and the big/small bundle used for evaluation.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use vela_core::{Board, Color};

use crate::accumulator::{AccumulatorFor, AccumulatorStack, AccumulatorState};
use crate::architecture::{Architecture, BIG_L1, LAYER_STACKS, OUTPUT_SCALE, SMALL_L1};
use crate::cache::Cache;
use crate::error::FormatError;
use crate::feature_transformer::FeatureTransformer;
use crate::io::{read_u32, write_u32};

/// Format version of every supported network file.
pub const VERSION: u32 = 0x7AF3_2F20;

/// Default file name of the big network.
pub const DEFAULT_BIG_NET: &str = "nn-c0ae49f08b40.nnue";
/// Default file name of the small network.
pub const DEFAULT_SMALL_NET: &str = "nn-37f18f62d772.nnue";

/// The two terms a network contributes, in internal units.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct NetworkOutput {
    pub psqt: i32,
    pub positional: i32,
}

/// Both terms for every bucket of one position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkTrace {
    pub side_to_move: Color,
    /// Bucket a real evaluation would use.
    pub bucket: usize,
    pub outputs: [NetworkOutput; LAYER_STACKS],
}

#[derive(Clone, PartialEq, Debug)]
pub struct Network<const L1: usize> {
    pub(crate) feature_transformer: FeatureTransformer<L1>,
    pub(crate) stacks: Vec<Architecture<L1>>,
    description: String,
}

impl<const L1: usize> Network<L1> {
    pub fn zeroed() -> Self {
        Network {
            feature_transformer: FeatureTransformer::zeroed(),
            stacks: (0..LAYER_STACKS).map(|_| Architecture::zeroed()).collect(),
            description: String::new(),
        }
    }

    /// Deterministic random network, for tests and benchmarks.
    pub fn synthetic(seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut net = Self::zeroed();
        net.feature_transformer.randomize(&mut rng);
        for stack in &mut net.stacks {
            stack.randomize(&mut rng);
        }
        net.description = format!("synthetic L1={L1} seed={seed}");
        net
    }

    pub const fn hash_value() -> u32 {
        FeatureTransformer::<L1>::hash_value() ^ Architecture::<L1>::hash_value()
    }

    pub fn feature_transformer(&self) -> &FeatureTransformer<L1> {
        &self.feature_transformer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Size of the in-memory parameters in bytes.
    pub fn parameter_bytes(&self) -> usize {
        let ft = &self.feature_transformer;
        let ft_bytes = size_of_val(&*ft.biases) + size_of_val(&*ft.weights) + size_of_val(&*ft.psqt_weights);
        let stack_bytes: usize = self
            .stacks
            .iter()
            .map(|s| {
                size_of_val(&s.fc_0.biases)
                    + s.fc_0.weights.len()
                    + size_of_val(&s.fc_1.biases)
                    + s.fc_1.weights.len()
                    + size_of_val(&s.fc_2.biases)
                    + s.fc_2.weights.len()
            })
            .sum();
        ft_bytes + stack_bytes
    }

    /// Decode a whole network. Nothing is kept on failure.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(FormatError::Version { found: version, expected: VERSION });
        }
        check_hash(reader, "network", Self::hash_value())?;

        let len = read_u32(reader)? as usize;
        let mut bytes = Vec::new();
        reader.take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        let description = String::from_utf8(bytes).map_err(|_| FormatError::Description)?;

        let mut net = Self::zeroed();
        net.description = description;

        check_hash(reader, "feature transformer", FeatureTransformer::<L1>::hash_value())?;
        net.feature_transformer.read_parameters(reader)?;
        for stack in &mut net.stacks {
            check_hash(reader, "layer stack", Architecture::<L1>::hash_value())?;
            stack.read_parameters(reader)?;
        }

        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(FormatError::TrailingData);
        }
        Ok(net)
    }

    /// Encode the network; the exact inverse of [`Network::read`].
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32(writer, VERSION)?;
        write_u32(writer, Self::hash_value())?;
        let len = u32::try_from(self.description.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "description too long"))?;
        write_u32(writer, len)?;
        writer.write_all(self.description.as_bytes())?;

        write_u32(writer, FeatureTransformer::<L1>::hash_value())?;
        self.feature_transformer.write_parameters(writer)?;
        for stack in &self.stacks {
            write_u32(writer, Architecture::<L1>::hash_value())?;
            stack.write_parameters(writer)?;
        }
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        match Self::read(&mut BufReader::new(file)) {
            Ok(net) => {
                tracing::info!(
                    path = %path.display(),
                    l1 = L1,
                    hash = format_args!("{:#010x}", Self::hash_value()),
                    description = %net.description,
                    "network loaded"
                );
                Ok(net)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), l1 = L1, error = %e, "network rejected");
                Err(e)
            }
        }
    }

    pub fn save_file(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), l1 = L1, "network saved");
        Ok(())
    }

    /// Replace the parameters with those read from `reader`. On error the
    /// current network stays untouched.
    pub fn reload<R: Read>(&mut self, reader: &mut R) -> Result<(), FormatError> {
        *self = Self::read(reader)?;
        Ok(())
    }
}

impl<const L1: usize> Network<L1>
where
    AccumulatorState: AccumulatorFor<L1>,
{
    /// Evaluate the top of `stack`, which must correspond to `board`.
    pub fn evaluate(&self, board: &Board, stack: &mut AccumulatorStack, cache: &mut Cache<L1>) -> NetworkOutput {
        let bucket = bucket_of(board);
        stack.evaluate(board, &self.feature_transformer, cache);

        let mut transformed = [0u8; L1];
        let psqt = self.feature_transformer.transform(stack.latest::<L1>(), board.side_to_move(), bucket, &mut transformed);
        let positional = self.stacks[bucket].propagate(&transformed);
        NetworkOutput { psqt: psqt / OUTPUT_SCALE, positional: positional / OUTPUT_SCALE }
    }

    /// Run every layer stack on the same accumulator.
    pub fn trace(&self, board: &Board, stack: &mut AccumulatorStack, cache: &mut Cache<L1>) -> NetworkTrace {
        stack.evaluate(board, &self.feature_transformer, cache);

        let mut outputs = [NetworkOutput::default(); LAYER_STACKS];
        let mut transformed = [0u8; L1];
        for (bucket, out) in outputs.iter_mut().enumerate() {
            let psqt =
                self.feature_transformer.transform(stack.latest::<L1>(), board.side_to_move(), bucket, &mut transformed);
            let positional = self.stacks[bucket].propagate(&transformed);
            *out = NetworkOutput { psqt: psqt / OUTPUT_SCALE, positional: positional / OUTPUT_SCALE };
        }
        NetworkTrace { side_to_move: board.side_to_move(), bucket: bucket_of(board), outputs }
    }
}

fn bucket_of(board: &Board) -> usize {
    (board.piece_count() as usize - 1) / 4
}

fn check_hash<R: Read>(reader: &mut R, section: &'static str, expected: u32) -> Result<(), FormatError> {
    let found = read_u32(reader)?;
    if found != expected {
        return Err(FormatError::Hash { section, found, expected });
    }
    Ok(())
}

/// Where the two networks are loaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalFiles {
    pub big: PathBuf,
    pub small: PathBuf,
}

impl Default for EvalFiles {
    fn default() -> Self {
        EvalFiles { big: PathBuf::from(DEFAULT_BIG_NET), small: PathBuf::from(DEFAULT_SMALL_NET) }
    }
}

/// The big and small networks, shared read-only by every search thread.
#[derive(Clone, Debug)]
pub struct Networks {
    pub big: Network<BIG_L1>,
    pub small: Network<SMALL_L1>,
}

impl Networks {
    pub fn new(big: Network<BIG_L1>, small: Network<SMALL_L1>) -> Self {
        Networks { big, small }
    }

    pub fn load(files: &EvalFiles) -> Result<Self, FormatError> {
        Ok(Networks { big: Network::load_file(&files.big)?, small: Network::load_file(&files.small)? })
    }

    pub fn synthetic(seed: u64) -> Self {
        Networks { big: Network::synthetic(seed), small: Network::synthetic(seed.wrapping_add(1)) }
    }

    /// Load both files, replacing the current networks only if both load.
    pub fn reload(&mut self, files: &EvalFiles) -> Result<(), FormatError> {
        *self = Self::load(files)?;
        Ok(())
    }
}
