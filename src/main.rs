use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use rayon::prelude::*;

use xtal_designer::config::RunDefinition;
use xtal_designer::design::designer::CrystalDesigner;
use xtal_designer::design::generator::RandomStructureGenerator;
use xtal_designer::design::DesignEvent;
use xtal_designer::report::production::{AttemptRecord, ProductionReporter};
use xtal_designer::report::recorder::DesignRecorder;
use xtal_designer::symmetry::ReductionOracle;

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Constraint-driven crystal structure designer", long_about = None)]
struct Args {
    /// Run definition file (JSON); the built-in MgO example when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of design attempts to run.
    #[arg(short, long, default_value_t = 4)]
    attempts: usize,

    /// Worker threads for parallel attempts (0 = rayon default).
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Worker rank; selects the output subdirectory and the seed stream.
    #[arg(long, default_value_t = 0)]
    rank: usize,

    /// Total worker processes in this production run.
    #[arg(long, default_value_t = 1)]
    processes: usize,

    /// Base RNG seed; derived from OS entropy when omitted.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Root of the results directory tree.
    #[arg(short, long, default_value = "production")]
    output: PathBuf,

    /// Write a trajectory file per attempt.
    #[arg(long, default_value_t = false)]
    record: bool,
}

fn attempt_seed(base: u64, rank: usize, processes: usize, attempt: usize) -> u64 {
    // Stripe the attempt space across ranks so no two workers replay the
    // same structure.
    base.wrapping_add((attempt * processes.max(1) + rank) as u64)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let definition = match &args.config {
        Some(path) => RunDefinition::load(path)
            .with_context(|| format!("loading run definition {}", path.display()))?,
        None => {
            info!("no run definition given; using the built-in MgO example");
            RunDefinition::example_rock_salt()
        }
    };

    let records = definition.species_records().context("resolving species records")?;
    let polyhedra_rules = definition.polyhedra_rules().context("resolving polyhedra limits")?;
    let parameters = definition.parameters.clone();

    let generator =
        RandomStructureGenerator::new(records, polyhedra_rules, parameters.generation);
    let designer = CrystalDesigner::new(&parameters);
    let oracle = ReductionOracle::default();
    let reporter = ProductionReporter::new(&args.output, args.rank)
        .context("creating the production directory")?;

    let base_seed = args.seed.unwrap_or_else(rand::random);
    info!(
        "rank {}/{}: {} attempts on {} atoms, base seed {}, results in {}",
        args.rank,
        args.processes,
        args.attempts,
        generator.atom_count(),
        base_seed,
        reporter.directory().display()
    );

    if args.threads > 0 {
        let _ = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global();
    }

    // Workers report progress over a channel; a plain thread drains it into
    // the log so file IO never blocks the optimization loops.
    let (tx, rx) = unbounded::<DesignEvent>();
    let event_loop = thread::spawn(move || {
        for event in rx {
            match event {
                DesignEvent::Log(message) => info!("{message}"),
                DesignEvent::AttemptStarted { attempt, seed } => {
                    info!("attempt {attempt}: started (seed {seed})")
                }
                DesignEvent::IterationUpdate(stats) => debug!(
                    "attempt {}: {} steps, coordination {}, volume {:.2}, packing {:.3}",
                    stats.attempt,
                    stats.total_steps,
                    if stats.feasible_coordination { "ok" } else { "open" },
                    stats.cell_volume,
                    stats.packing_fraction
                ),
                DesignEvent::AttemptFinished { attempt, feasible, total_steps } => info!(
                    "attempt {attempt}: {} after {total_steps} steps",
                    if feasible { "feasible" } else { "timed out" }
                ),
            }
        }
    });

    let feasible_count: usize = (0..args.attempts)
        .into_par_iter()
        .map(|attempt| {
            let seed = attempt_seed(base_seed, args.rank, args.processes, attempt);
            let _ = tx.send(DesignEvent::AttemptStarted { attempt, seed });

            match run_attempt(
                attempt,
                seed,
                &generator,
                &designer,
                &oracle,
                &reporter,
                &args,
                parameters.global.record_interval,
                &tx,
            ) {
                Ok(feasible) => feasible as usize,
                Err(error) => {
                    warn!("attempt {attempt} failed: {error:#}");
                    0
                }
            }
        })
        .sum();

    drop(tx);
    let _ = event_loop.join();

    info!("{}/{} attempts produced feasible structures", feasible_count, args.attempts);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_attempt(
    attempt: usize,
    seed: u64,
    generator: &RandomStructureGenerator,
    designer: &CrystalDesigner,
    oracle: &ReductionOracle,
    reporter: &ProductionReporter,
    args: &Args,
    record_interval: usize,
    tx: &crossbeam_channel::Sender<DesignEvent>,
) -> Result<bool> {
    let mut structure = generator.next(seed)?;

    let production_name = reporter.production_name();
    let recorder = if args.record {
        DesignRecorder::create(&reporter.trajectory_path(&production_name), record_interval)?
    } else {
        DesignRecorder::disabled()
    };

    let outcome =
        designer.execute_recorded(&mut structure, oracle, &recorder, Some(tx), attempt)?;
    recorder.release()?;

    let record = AttemptRecord {
        attempt,
        seed,
        feasible: outcome.is_feasible(),
        total_steps: outcome.total_steps(),
    };
    reporter.report_attempt(&record, &production_name, &structure, oracle)?;

    let _ = tx.send(DesignEvent::AttemptFinished {
        attempt,
        feasible: record.feasible,
        total_steps: record.total_steps,
    });
    Ok(record.feasible)
}
