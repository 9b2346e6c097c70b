//! Command-line driver: read an instance, run the volume algorithm and the
//! parallel fix-and-propagate heuristic, report the best solution found.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use volfix_core::io::read_problem;
use volfix_core::num::Num;
use volfix_core::timer::Timer;
use volfix_engine::reformulate::{filter_hard_rows, objective_bound, reformulate};
use volfix_engine::{
    AlgorithmSettings, EngineError, Heuristic, OneOptMode, VolumeAlgorithm,
};

#[derive(Parser)]
#[command(name = "volfix")]
#[command(about = "Volume-algorithm primal heuristic for mixed-integer programs")]
struct Cli {
    /// Instance file (.mps, .opb or .pbo, optionally gzipped)
    instance: PathBuf,

    /// Wall-clock limit in seconds
    #[arg(long, default_value_t = 600.0)]
    time_limit: f64,

    /// Worker threads for the diving phase
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Seed for the random rounding strategy
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Volume iteration limit
    #[arg(long, default_value_t = 500)]
    max_iterations: usize,

    /// Skip the one-opt improvement pass
    #[arg(long)]
    no_one_opt: bool,

    /// Drop rows whose max/min absolute coefficient ratio exceeds this
    /// before the volume stage
    #[arg(long)]
    hard_row_threshold: Option<f64>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new().filter_level(level).init();

    if let Err(error) = run(cli) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let num = Num::default();

    let read_start = Instant::now();
    let problem = read_problem(&cli.instance)
        .with_context(|| format!("reading {}", cli.instance.display()))?;
    log::info!(
        "read '{}' in {:.3}s: {} rows, {} cols ({} integral)",
        problem.name(),
        read_start.elapsed().as_secs_f64(),
        problem.n_rows(),
        problem.n_cols(),
        problem.n_integral_cols()
    );

    let settings = AlgorithmSettings::default()
        .with_time_limit(cli.time_limit)
        .with_threads(cli.threads)
        .with_seed(cli.seed)
        .with_max_iterations(cli.max_iterations);
    let timer = Timer::new(settings.time_limit_secs);

    // Opt-in: exclude numerically hard rows from the dual ascent.
    let volume_problem = match cli.hard_row_threshold {
        Some(threshold) => filter_hard_rows(&problem, threshold).0,
        None => problem.clone(),
    };

    let estimate = match objective_bound(&volume_problem, num) {
        Ok(upper_bound) => {
            let reformulated = reformulate(&volume_problem);
            log::info!(
                "reformulated to {} rows, objective bound {upper_bound:.6e}",
                reformulated.n_rows()
            );

            let pi = vec![0.0; reformulated.n_rows()];
            let mut volume = VolumeAlgorithm::new(num, &timer, &settings);
            Some(volume.solve(
                &reformulated.objective().coefficients,
                reformulated.matrix(),
                reformulated.matrix().lhs(),
                reformulated.domains(),
                &pi,
                problem.n_integral_cols(),
                upper_bound,
            ))
        }
        Err(error @ EngineError::UnboundedObjectiveBound(_)) => {
            log::error!("{error}; skipping the volume stage");
            None
        }
        Err(error) => return Err(error.into()),
    };

    let mut heuristic = Heuristic::new(&problem, num, settings);
    heuristic.setup();

    let one_opt = if cli.no_one_opt {
        OneOptMode::Off
    } else {
        OneOptMode::Propagate
    };

    let mut best_obj = f64::INFINITY;
    let mut best_solution = Vec::new();
    let found = match &estimate {
        Some(x_bar) => heuristic.perform_fix_and_propagate(
            x_bar,
            &timer,
            one_opt,
            &mut best_obj,
            &mut best_solution,
        ),
        None => heuristic.find_any_solution(&mut best_obj, &mut best_solution),
    };

    if found {
        debug_assert!(problem.is_primal_feasible(&best_solution, num));
        println!("feasible solution with objective {best_obj:.8e}");
    } else {
        println!("no feasible solution found");
    }
    log::info!("total time {:.3}s", timer.elapsed_secs());

    Ok(())
}
