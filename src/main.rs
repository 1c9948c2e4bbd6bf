use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vela_core::{Board, Color, DirtyPiece, Move, STARTING_FEN};
use vela_nnue::architecture::L2;
use vela_nnue::features::INPUT_DIMENSIONS;
use vela_nnue::network::VERSION;
use vela_nnue::{
    AccumulatorCaches, AccumulatorStack, AccumulatorStats, BIG_L1, EvalFiles, Network, Networks, SMALL_L1,
};

#[derive(Parser, Debug)]
#[command(name = "vela", about = "NNUE evaluation tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate positions and print the per-bucket trace
    Eval(EvalArgs),
    /// Check a network file and print its header
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Load a network file and write it back out
    Export(ExportArgs),
    /// Drive accumulator stacks on synthetic networks and report throughput
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct NetArgs {
    /// Big network file
    #[arg(long, value_name = "FILE")]
    big: Option<PathBuf>,
    /// Small network file
    #[arg(long, value_name = "FILE")]
    small: Option<PathBuf>,
    /// Use random networks built from this seed instead of files
    #[arg(long, value_name = "SEED", conflicts_with_all = ["big", "small"])]
    synthetic: Option<u64>,
}

#[derive(Args, Debug)]
struct EvalArgs {
    #[command(flatten)]
    nets: NetArgs,
    /// Positions to evaluate (defaults to the starting position)
    #[arg(value_name = "FEN")]
    fens: Vec<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    #[arg(value_name = "OUT")]
    out: PathBuf,
    /// Replace the description stored in the file
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Worker threads
    #[arg(long, value_name = "N", default_value_t = 1)]
    threads: usize,
    /// Seed of the synthetic networks
    #[arg(long, value_name = "SEED", default_value_t = 1)]
    seed: u64,
    /// Passes over the scripted lines per thread
    #[arg(long, value_name = "N", default_value_t = 200)]
    iterations: usize,
    /// Accumulator scan limit in plies
    #[arg(long, value_name = "PLIES")]
    scan_limit: Option<usize>,
}

/// Opening lines walked by `bench`, forward then back.
const BENCH_LINES: &[&str] = &[
    "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6 b5a4 g8f6 e1g1 f8e7 f1e1 b7b5 a4b3 d7d6 c2c3 e8g8",
    "d2d4 d7d5 c2c4 e7e6 b1c3 g8f6 c1g5 f8e7 e2e3 e8g8 g1f3 b8d7 a1c1 c7c6 f1d3 d5c4 d3c4",
    "e2e4 c7c5 g1f3 d7d6 d2d4 c5d4 f3d4 g8f6 b1c3 a7a6 c1e3 e7e5 d4b3 c8e6 f2f3 f8e7 d1d2 e8g8 e1c1",
    "e2e4 d7d5 e4d5 d8d5 b1c3 d5a5 d2d4 c7c6 g1f3 c8f5 f1c4 e7e6 c1d2 b8d7 d1e2 f8b4 e1c1",
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Eval(args) => run_eval(args),
        Commands::Verify { file } => run_verify(&file),
        Commands::Export(args) => run_export(args),
        Commands::Bench(args) => run_bench(args),
    }
}

fn load_networks(args: &NetArgs) -> Result<Networks> {
    if let Some(seed) = args.synthetic {
        info!(seed, "building synthetic networks");
        return Ok(Networks::synthetic(seed));
    }

    let defaults = EvalFiles::default();
    let files = EvalFiles {
        big: args.big.clone().unwrap_or(defaults.big),
        small: args.small.clone().unwrap_or(defaults.small),
    };
    let big = Network::load_file(&files.big)
        .with_context(|| format!("failed to load big network {}", files.big.display()))?;
    let small = Network::load_file(&files.small)
        .with_context(|| format!("failed to load small network {}", files.small.display()))?;
    Ok(Networks::new(big, small))
}

fn run_eval(args: EvalArgs) -> Result<()> {
    let networks = load_networks(&args.nets)?;
    let fens = if args.fens.is_empty() { vec![STARTING_FEN.to_string()] } else { args.fens };

    for fen in &fens {
        let board: Board = fen.parse().with_context(|| format!("invalid FEN {fen:?}"))?;
        println!("{}", board.pretty());
        println!("{}", vela_nnue::trace(&networks, &board));
        println!();
    }
    Ok(())
}

/// Network width a file was written for, from its header hash.
fn detect_width(path: &Path) -> Result<usize> {
    let mut header = [0u8; 8];
    BufReader::new(File::open(path).with_context(|| format!("cannot open {}", path.display()))?)
        .read_exact(&mut header)
        .with_context(|| format!("{} is too short for a network header", path.display()))?;

    let version = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let hash = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        bail!("{}: unsupported network version {version:#010x}", path.display());
    }
    match hash {
        h if h == Network::<BIG_L1>::hash_value() => Ok(BIG_L1),
        h if h == Network::<SMALL_L1>::hash_value() => Ok(SMALL_L1),
        h => bail!("{}: unknown network hash {h:#010x}", path.display()),
    }
}

fn run_verify(path: &Path) -> Result<()> {
    match detect_width(path)? {
        BIG_L1 => verify::<BIG_L1>(path),
        _ => verify::<SMALL_L1>(path),
    }
}

fn verify<const L1: usize>(path: &Path) -> Result<()> {
    let net = Network::<L1>::load_file(path).with_context(|| format!("failed to load {}", path.display()))?;
    println!(
        "NNUE evaluation using {} ({}MiB, ({INPUT_DIMENSIONS}, {L1}, {}, 32, 1))",
        path.display(),
        net.parameter_bytes() / (1024 * 1024),
        L2 + 1,
    );
    println!("hash        {:#010x}", Network::<L1>::hash_value());
    println!("description {}", net.description());
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    match detect_width(&args.file)? {
        BIG_L1 => export::<BIG_L1>(&args),
        _ => export::<SMALL_L1>(&args),
    }
}

fn export<const L1: usize>(args: &ExportArgs) -> Result<()> {
    let mut net =
        Network::<L1>::load_file(&args.file).with_context(|| format!("failed to load {}", args.file.display()))?;
    if let Some(description) = &args.description {
        net.set_description(description.as_str());
    }
    net.save_file(&args.out).with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("Network saved successfully to {}", args.out.display());
    Ok(())
}

struct BenchReport {
    nodes: u64,
    stats: [AccumulatorStats; Color::COUNT],
}

fn run_bench(args: BenchArgs) -> Result<()> {
    let lines = BENCH_LINES.iter().map(|line| replay_line(line)).collect::<Result<Vec<_>>>()?;

    let start = Instant::now();
    let networks = Networks::synthetic(args.seed);
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "synthetic networks ready");

    let threads = args.threads.max(1);
    let start = Instant::now();
    let reports: Vec<BenchReport> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let networks = &networks;
                let lines = &lines;
                s.spawn(move || bench_worker(networks, lines, args.iterations, args.scan_limit))
            })
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });
    if reports.len() != threads {
        bail!("a bench worker panicked");
    }
    let elapsed = start.elapsed();

    let nodes: u64 = reports.iter().map(|r| r.nodes).sum();
    let nps = nodes as f64 / elapsed.as_secs_f64().max(1e-9);
    println!("threads     {threads}");
    println!("evaluations {nodes}");
    println!("time        {} ms", elapsed.as_millis());
    println!("evals/s     {nps:.0}");
    for color in Color::ALL {
        let total = reports.iter().fold(AccumulatorStats::default(), |acc, r| {
            let s = r.stats[color.index()];
            AccumulatorStats {
                refreshes: acc.refreshes + s.refreshes,
                forward_steps: acc.forward_steps + s.forward_steps,
                backward_steps: acc.backward_steps + s.backward_steps,
            }
        });
        if total != AccumulatorStats::default() {
            println!(
                "{color:<5} refreshes {} forward {} backward {}",
                total.refreshes, total.forward_steps, total.backward_steps
            );
        }
    }
    Ok(())
}

/// Every position of `line` from the starting position, with the move
/// that reached it.
fn replay_line(line: &str) -> Result<Vec<(Board, DirtyPiece)>> {
    let mut board = Board::starting_position();
    let mut plies = Vec::new();
    for uci in line.split_whitespace() {
        let mv: Move = uci.parse().with_context(|| format!("bad bench move {uci:?}"))?;
        let (next, dp) = board.make_move(mv).with_context(|| format!("bench move {uci} does not apply"))?;
        plies.push((next, dp));
        board = next;
    }
    Ok(plies)
}

/// Walk every line forward and back, evaluating at each ply.
fn bench_worker(
    networks: &Networks,
    lines: &[Vec<(Board, DirtyPiece)>],
    iterations: usize,
    scan_limit: Option<usize>,
) -> BenchReport {
    let mut stack = scan_limit.map_or_else(AccumulatorStack::new, AccumulatorStack::with_scan_limit);
    let mut caches = AccumulatorCaches::new(networks);
    let root = Board::starting_position();
    let mut nodes = 0u64;

    for _ in 0..iterations {
        for plies in lines {
            stack.reset();
            for (board, dp) in plies {
                stack.push(*dp);
                stack.hint_common_access(board, networks, &mut caches);
                std::hint::black_box(vela_nnue::evaluate(networks, board, &mut stack, &mut caches, 0));
                nodes += 1;
            }
            for depth in (0..plies.len()).rev() {
                stack.pop();
                let board = if depth == 0 { &root } else { &plies[depth - 1].0 };
                std::hint::black_box(vela_nnue::evaluate(networks, board, &mut stack, &mut caches, 0));
                nodes += 1;
            }
        }
    }

    BenchReport { nodes, stats: stats_of(&stack) }
}

#[cfg(feature = "nnue-stats")]
fn stats_of(stack: &AccumulatorStack) -> [AccumulatorStats; Color::COUNT] {
    [stack.stats(Color::White), stack.stats(Color::Black)]
}

#[cfg(not(feature = "nnue-stats"))]
fn stats_of(_: &AccumulatorStack) -> [AccumulatorStats; Color::COUNT] {
    [AccumulatorStats::default(); Color::COUNT]
}
