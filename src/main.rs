use clap::{Parser, Subcommand, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use foldsynth::ir::Sort;
use foldsynth::parser::{parse_value, parse_values};
use foldsynth::{ExplorationMode, Session, SynthesisConfig, Value, Z3Oracle};

// --- Command Line Arguments ---

#[derive(Parser)]
#[command(name = "foldsynth")]
#[command(about = "foldsynth - shape automata for sequential folds")]
#[command(version)]
#[command(subcommand_required = true)]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// CLI exploration mode selection
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum CliMode {
    /// Synthesize strategies as the input reaches new states
    #[default]
    Lazy,
    /// Synthesize every reachable strategy before folding
    AheadOfTime,
}

impl From<CliMode> for ExplorationMode {
    fn from(cli: CliMode) -> Self {
        match cli {
            CliMode::Lazy => ExplorationMode::Lazy,
            CliMode::AheadOfTime => ExplorationMode::AheadOfTime,
        }
    }
}

/// Options shared by every subcommand
#[derive(clap::Args)]
struct SynthesisArgs {
    /// Reducer in closure syntax, e.g. `|s: int, i: int| if i > s { i } else { s }`
    reducer: Option<String>,
    /// Read the reducer from a file instead
    #[arg(long, short)]
    file: Option<PathBuf>,
    /// Maximum number of automaton states
    #[arg(long, default_value = "64")]
    max_shapes: usize,
    /// Maximum number of rewrite passes per fixpoint
    #[arg(long, default_value = "64")]
    max_rewrite_passes: usize,
    /// Solver timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize an automaton and fold input through it
    Run {
        #[command(flatten)]
        synthesis: SynthesisArgs,
        /// Comma-separated input values, e.g. `[3, 1, 4]` or `(true, 2), (false, 0)`
        #[arg(long, conflicts_with = "random")]
        inputs: Option<String>,
        /// Generate this many random inputs instead
        #[arg(long)]
        random: Option<usize>,
        /// Random seed for reproducibility
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Initial state value (defaults to zero/false)
        #[arg(long)]
        initial: Option<String>,
        /// Fold this many partitions independently and merge them
        #[arg(long, default_value = "1")]
        partitions: usize,
        /// When strategies get synthesized
        #[arg(long, value_enum, default_value = "lazy")]
        mode: CliMode,
    },
    /// Synthesize every reachable state ahead of time and print the automaton
    Explore {
        #[command(flatten)]
        synthesis: SynthesisArgs,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

impl SynthesisArgs {
    fn source(&self) -> CliResult<String> {
        match (&self.reducer, &self.file) {
            (Some(text), None) => Ok(text.clone()),
            (None, Some(path)) => Ok(fs::read_to_string(path)?),
            (Some(_), Some(_)) => Err("give either a reducer or --file, not both".into()),
            (None, None) => Err("no reducer given (pass it inline or with --file)".into()),
        }
    }

    fn config(&self, mode: ExplorationMode) -> SynthesisConfig {
        let mut config = SynthesisConfig::default()
            .with_max_shapes(self.max_shapes)
            .with_max_rewrite_passes(self.max_rewrite_passes)
            .with_mode(mode);
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }

    fn session(&self, mode: ExplorationMode) -> CliResult<Session> {
        let source = self.source()?;
        let config = self.config(mode);
        let oracle = Z3Oracle::new(config.solver.clone());
        Ok(Session::from_source(&source, oracle, config)?)
    }
}

// --- Random input generation ---

fn random_value(rng: &mut ChaCha8Rng, sort: &Sort) -> Value {
    match sort {
        Sort::Bool => Value::Bool(rng.random_bool(0.5)),
        Sort::Int => Value::Int(rng.random_range(-100..=100)),
        Sort::Tuple(fields) => Value::Tuple(fields.iter().map(|f| random_value(rng, f)).collect()),
    }
}

fn format_values(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

// --- Subcommands ---

fn run_command(
    synthesis: &SynthesisArgs,
    inputs: Option<&str>,
    random: Option<usize>,
    seed: u64,
    initial: Option<&str>,
    partitions: usize,
    mode: ExplorationMode,
) -> CliResult<()> {
    let start = Instant::now();
    let mut session = synthesis.session(mode)?;
    let state_sort = session.aggregation().state_sort(session.store()).clone();
    let input_sort = session.aggregation().input_sort(session.store()).clone();

    let inputs = match (inputs, random) {
        (Some(text), _) => parse_values(text)?,
        (None, Some(count)) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..count).map(|_| random_value(&mut rng, &input_sort)).collect()
        }
        (None, None) => Vec::new(),
    };
    let initial = match initial {
        Some(text) => parse_value(text)?,
        None => Value::default_of(&state_sort),
    };

    if synthesis.verbose {
        println!("State sort: {}", state_sort);
        println!("Input sort: {}", input_sort);
        println!("Mode: {}", mode);
        println!("Inputs: {}", format_values(&inputs));
    }

    let result = if partitions > 1 {
        let chunk_len = inputs.len().div_ceil(partitions).max(1);
        let chunks: Vec<&[Value]> = inputs.chunks(chunk_len).collect();
        session.fold_partitioned(&initial, &chunks)?
    } else {
        session.fold(&initial, &inputs)?
    };
    let expected = session.fold_sequential(&initial, &inputs)?;

    println!("Result: {}", result);
    if result == expected {
        println!("Sequential fold agrees");
    } else {
        println!("MISMATCH: sequential fold gives {}", expected);
    }

    if synthesis.verbose {
        println!("\nAutomaton:");
        print!("{}", session.automaton());
        println!("\nStatistics:");
        print!("{}", session.statistics().format_summary());
        println!("Total time: {:.2?}", start.elapsed());
    }

    if result == expected {
        Ok(())
    } else {
        Err("automaton disagrees with the sequential fold".into())
    }
}

fn explore_command(synthesis: &SynthesisArgs) -> CliResult<()> {
    let session = synthesis.session(ExplorationMode::AheadOfTime)?;
    print!("{}", session.automaton());
    if synthesis.verbose {
        println!("\nStatistics:");
        print!("{}", session.statistics().format_summary());
    }
    Ok(())
}

// --- Main Function ---
fn main() {
    let args = Args::parse();

    let verbose = match &args.command {
        Commands::Run { synthesis, .. } | Commands::Explore { synthesis } => synthesis.verbose,
    };
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match &args.command {
        Commands::Run {
            synthesis,
            inputs,
            random,
            seed,
            initial,
            partitions,
            mode,
        } => run_command(
            synthesis,
            inputs.as_deref(),
            *random,
            *seed,
            initial.as_deref(),
            *partitions,
            (*mode).into(),
        ),
        Commands::Explore { synthesis } => explore_command(synthesis),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
