//! forage - CLI Entry Point
//!
//! Foraging simulations, batches and behaviour inspection.

use clap::{Parser, Subcommand};
use forage::pathfinder::AllPairsPathfinder;
use forage::results::ResultStore;
use forage::simulation::{run_hidden, run_seed};
use forage::{benchmark, navigator_source, runner, Brain, Config, Map, RunResult, Simulation};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "forage")]
#[command(version)]
#[command(about = "Multi-agent foraging simulator with evolvable automata and behaviour trees")]
struct Cli {
    /// Configuration file (YAML); defaults are used when it does not exist
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single simulation
    Run {
        /// Number of ticks (defaults to simulation.t_max)
        #[arg(short, long)]
        steps: Option<u64>,

        /// Random seed for reproducibility (defaults to map.seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Store the result under the results directory
        #[arg(short, long)]
        record: bool,

        /// Quiet mode (minimal output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run many independent simulations in parallel
    Batch {
        /// Number of runs (defaults to runner.runs)
        #[arg(short, long)]
        runs: Option<usize>,

        /// Do not store results
        #[arg(long)]
        no_record: bool,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Build the all-pairs pathfinding tables for the configured map and cache them
    Precompute,

    /// Print the configured brain as Graphviz
    Show {
        /// Brain file to show instead of the configured one
        #[arg(short, long)]
        brain: Option<PathBuf>,

        /// Also write the brain as YAML
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of ticks
        #[arg(short, long, default_value = "1000")]
        steps: u64,

        /// Number of agents
        #[arg(short = 'n', long, default_value = "50")]
        creatures: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.log_level.as_str()))
        .init();

    match cli.command {
        Commands::Run {
            steps,
            seed,
            record,
            quiet,
        } => run_simulation(&config, steps, seed, record, quiet),

        Commands::Batch { runs, no_record } => run_batch(&config, runs, !no_record),

        Commands::Init { output } => generate_config(output),

        Commands::Precompute => precompute(&config),

        Commands::Show { brain, save } => show_brain(&config, brain, save),

        Commands::Benchmark { steps, creatures } => run_benchmark(steps, creatures),
    }
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        println!("Loading config from: {:?}", path);
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn run_simulation(
    config: &Config,
    steps: Option<u64>,
    seed: Option<u64>,
    record: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let map = Map::generate(&config.map)?;
    let brain = Brain::from_config(&config.behavior)?;
    let steps = steps.unwrap_or(config.simulation.t_max);
    let seed = seed.unwrap_or(config.map.seed);
    let navigator = navigator_source(&map, config).navigator(&map);

    let mut sim = Simulation::with_navigator(&map, brain, config, navigator, seed);

    println!("Starting simulation");
    println!("  Map: {} ({}x{})", map.name, map.width, map.height);
    println!("  Agents: {}", sim.agents().len());
    println!("  Steps: {}", steps);
    println!("  Seed: {}", seed);
    println!();

    let start = Instant::now();
    let stats_interval = config.simulation.stats_interval.max(1);
    sim.run_with_callback(steps, |sim| {
        if !quiet && sim.time() % stats_interval == 0 {
            if let Some(stats) = sim.history.snapshots.last() {
                println!("{}", stats.summary());
            }
        }
    });
    let elapsed = start.elapsed();

    let result = sim.result();
    println!();
    println!("=== Simulation Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Speed: {:.1} steps/s", steps as f64 / elapsed.as_secs_f64());
    println!("Result: {}", result.summary());

    if record {
        let path = ResultStore::new(&config.logging.results_dir).record(config, &result)?;
        println!("Result saved: {:?}", path);
    }

    Ok(())
}

fn run_batch(config: &Config, runs: Option<usize>, record: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runs = runs.unwrap_or(config.runner.runs);
    let map = Map::generate(&config.map)?;
    let brain = Brain::from_config(&config.behavior)?;
    let source = navigator_source(&map, config);
    let t_max = config.simulation.t_max;

    println!("Running {} simulations of {} steps", runs, t_max);
    let start = Instant::now();
    let results = runner::run_batch(runs, &config.runner, |id| {
        run_hidden(id, &map, &brain, config, t_max, source.navigator(&map))
    });
    let elapsed = start.elapsed();

    let store = ResultStore::new(&config.logging.results_dir);
    let finished: Vec<(usize, RunResult)> = results.into_iter().flatten().collect();
    for (id, result) in &finished {
        println!("  run {:3} (seed {}): {}", id, run_seed(config.map.seed, *id), result.summary());
        if record {
            store.record(config, result)?;
        }
    }

    println!();
    println!("=== Batch Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Finished: {} / {}", finished.len(), runs);
    if !finished.is_empty() {
        let mean = finished.iter().map(|(_, r)| r.final_score).sum::<f64>() / finished.len() as f64;
        let best = finished
            .iter()
            .map(|(_, r)| r.final_score)
            .fold(f64::NEG_INFINITY, f64::max);
        println!("Mean score: {:.2}", mean);
        println!("Best score: {:.2}", best);
    }

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}

fn precompute(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let map = Map::generate(&config.map)?;
    let start = Instant::now();
    let table = AllPairsPathfinder::load_or_build(&map, &config.navigation.cache_dir);
    println!(
        "Tables for {} ready: {} open cells in {:.2}s",
        table.map_name(),
        table.cell_count(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn show_brain(
    config: &Config,
    brain: Option<PathBuf>,
    save: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let brain = match brain {
        Some(path) => Brain::load(path)?,
        None => Brain::from_config(&config.behavior)?,
    };
    println!("{}", brain.to_dot());

    let registers = brain.register_usage();
    if !registers.is_empty() {
        eprintln!("Registers used:");
        for (bank, index) in registers {
            eprintln!("  {}[{}]", bank, index);
        }
    }

    if let Some(path) = save {
        brain.save(&path)?;
        eprintln!("Brain saved to: {:?}", path);
    }
    Ok(())
}

fn run_benchmark(steps: u64, creatures: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== forage Benchmark ===");
    println!("Steps: {}", steps);
    println!("Agents: {}", creatures);
    println!();

    let result = benchmark(steps, creatures)?;
    println!("{}", result);

    Ok(())
}
