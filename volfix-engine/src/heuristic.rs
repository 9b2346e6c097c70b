//! Parallel heuristic orchestrator.
//!
//! Owns one probing view, one solution buffer and one strategy instance
//! per rounding variant, dives all of them concurrently over a bounded
//! worker pool against the shared read-only problem, and reduces the
//! outcomes to the best feasible candidate. Feasible candidates then get a
//! one-opt improvement sweep, again in parallel. All buffers are allocated
//! once at setup and reused across calls.

use rayon::prelude::*;

use volfix_core::num::Num;
use volfix_core::probing::ProbingView;
use volfix_core::problem::{ColFlags, Problem};
use volfix_core::timer::Timer;

use crate::conflict::{extract_conflict, ConflictRow};
use crate::propagate::{FixAndPropagate, InitialSolutionMode};
use crate::settings::AlgorithmSettings;
use crate::strategy::Rounding;

/// How the one-opt pass validates a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneOptMode {
    /// Skip the pass entirely.
    Off,

    /// Flip the bit and re-check full feasibility of the point.
    FeasibilityCheck,

    /// Flip the bit and let fix-and-propagate rebuild the rest.
    Propagate,
}

struct Worker<'a> {
    strategy: Rounding,
    view: ProbingView<'a>,
    solution: Vec<f64>,
    scratch: Vec<f64>,
    obj_value: f64,
    infeasible: bool,
}

/// Dispatches fix-and-propagate across rounding strategies and keeps the
/// best result.
pub struct Heuristic<'a> {
    num: Num,
    settings: AlgorithmSettings,
    problem: &'a Problem,
    pool: rayon::ThreadPool,
    workers: Vec<Worker<'a>>,
    cols_by_obj: Vec<usize>,
}

impl<'a> Heuristic<'a> {
    /// Create the orchestrator with its bounded thread pool.
    pub fn new(problem: &'a Problem, num: Num, settings: AlgorithmSettings) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .build()
            .unwrap();

        // columns by decreasing objective magnitude; the one-opt scan stops
        // at the first zero coefficient
        let objective = &problem.objective().coefficients;
        let mut cols_by_obj: Vec<usize> = (0..problem.n_cols()).collect();
        cols_by_obj.sort_by(|&a, &b| {
            objective[b]
                .abs()
                .total_cmp(&objective[a].abs())
                .then(a.cmp(&b))
        });

        Self {
            num,
            settings,
            problem,
            pool,
            workers: Vec::new(),
            cols_by_obj,
        }
    }

    /// Allocate the per-strategy workers: the two Farkas orientations,
    /// fractional and seeded random rounding.
    pub fn setup(&mut self) {
        let n = self.problem.n_cols();
        let strategies = [
            Rounding::farkas(false),
            Rounding::farkas(true),
            Rounding::fractional(),
            Rounding::random(self.settings.seed),
        ];
        self.workers = strategies
            .into_iter()
            .map(|strategy| Worker {
                strategy,
                view: ProbingView::new(self.problem, self.num),
                solution: vec![0.0; n],
                scratch: vec![0.0; n],
                obj_value: 0.0,
                infeasible: true,
            })
            .collect();
    }

    /// Hand a reduced-cost vector to the Farkas strategies.
    pub fn set_reduced_costs(&mut self, costs: &[f64]) {
        for worker in &mut self.workers {
            worker.strategy.set_reduced_costs(costs.to_vec());
        }
    }

    /// Dive all strategies on `primal_estimate` in parallel, run the
    /// one-opt pass on the feasible candidates and fold the best into the
    /// incumbent. Returns whether the incumbent changed.
    pub fn perform_fix_and_propagate(
        &mut self,
        primal_estimate: &[f64],
        timer: &Timer,
        one_opt: OneOptMode,
        best_obj: &mut f64,
        best_solution: &mut Vec<f64>,
    ) -> bool {
        assert!(!self.workers.is_empty(), "setup() must run first");

        let driver = FixAndPropagate::new(self.num, self.settings.max_backtracks);
        let problem = self.problem;
        let workers = &mut self.workers;

        self.pool.install(|| {
            workers.par_iter_mut().enumerate().for_each(|(i, worker)| {
                worker.infeasible = driver.fix_and_propagate(
                    primal_estimate,
                    &mut worker.solution,
                    &mut worker.strategy,
                    &mut worker.view,
                    timer,
                    true,
                    false,
                );
                if worker.infeasible {
                    worker.obj_value = 0.0;
                    log::debug!("strategy {i} ({}) ended infeasible", worker.strategy.name());
                } else {
                    worker.obj_value = problem.compute_objective(&worker.solution);
                    log::info!(
                        "strategy {i} ({}) found objective {:.6e}",
                        worker.strategy.name(),
                        worker.obj_value
                    );
                }
            });
        });

        self.perform_one_opt(one_opt, timer);
        self.evaluate(best_obj, best_solution)
    }

    /// One-opt sweep over every feasible candidate, in parallel.
    pub fn perform_one_opt(&mut self, mode: OneOptMode, timer: &Timer) {
        if mode == OneOptMode::Off {
            return;
        }

        let driver = FixAndPropagate::new(self.num, self.settings.max_backtracks);
        let problem = self.problem;
        let num = self.num;
        let cols_by_obj = &self.cols_by_obj;
        let workers = &mut self.workers;

        self.pool.install(|| {
            workers.par_iter_mut().for_each(|worker| {
                if worker.infeasible {
                    return;
                }
                one_opt_sweep(
                    problem,
                    num,
                    cols_by_obj,
                    &driver,
                    mode,
                    timer,
                    &mut worker.view,
                    &mut worker.solution,
                    &mut worker.obj_value,
                    &mut worker.scratch,
                );
            });
        });
    }

    /// One-opt on a caller-provided solution (the FFI improvement entry).
    /// Returns whether the objective strictly improved.
    pub fn improve_with_one_opt(
        &self,
        solution: &mut [f64],
        obj_value: &mut f64,
        mode: OneOptMode,
        timer: &Timer,
    ) -> bool {
        if mode == OneOptMode::Off {
            return false;
        }
        let driver = FixAndPropagate::new(self.num, self.settings.max_backtracks);
        let mut view = ProbingView::new(self.problem, self.num);
        let mut scratch = vec![0.0; self.problem.n_cols()];
        let before = *obj_value;

        one_opt_sweep(
            self.problem,
            self.num,
            &self.cols_by_obj,
            &driver,
            mode,
            timer,
            &mut view,
            solution,
            obj_value,
            &mut scratch,
        );
        self.num.is_lt(*obj_value, before)
    }

    /// Try the initial-solution modes in order and keep the first feasible
    /// assignment that beats the incumbent. The fallback when no
    /// continuous estimate is available.
    pub fn find_any_solution(&mut self, best_obj: &mut f64, best_solution: &mut Vec<f64>) -> bool {
        let driver = FixAndPropagate::new(self.num, self.settings.max_backtracks);
        let mut view = ProbingView::new(self.problem, self.num);
        let mut candidate = vec![0.0; self.problem.n_cols()];

        for mode in [
            InitialSolutionMode::Zero,
            InitialSolutionMode::LowerBounds,
            InitialSolutionMode::UpperBounds,
            InitialSolutionMode::Random {
                seed: self.settings.seed,
            },
        ] {
            let infeasible = driver.find_initial_solution(mode, &mut view, &mut candidate);
            if infeasible || !self.problem.is_primal_feasible(&candidate, self.num) {
                continue;
            }
            let obj = self.problem.compute_objective(&candidate);
            log::info!("simple heuristic ({mode:?}) found objective {obj:.6e}");
            if best_solution.is_empty() || self.num.is_lt(obj, *best_obj) {
                *best_obj = obj;
                best_solution.clear();
                best_solution.extend_from_slice(&candidate);
                return true;
            }
        }
        false
    }

    /// No-good rows of the strategies that ended infeasible.
    pub fn extract_conflicts(&self) -> Vec<ConflictRow> {
        self.workers
            .iter()
            .filter(|w| w.infeasible)
            .filter_map(|w| extract_conflict(&w.view, self.num))
            .collect()
    }

    /// Candidate triples `(infeasible, objective, solution)` per strategy.
    pub fn candidates(&self) -> impl Iterator<Item = (bool, f64, &[f64])> {
        self.workers
            .iter()
            .map(|w| (w.infeasible, w.obj_value, w.solution.as_slice()))
    }

    /// Reduce the workers to the best feasible candidate; update the
    /// incumbent only on strict improvement (or when there is none yet).
    fn evaluate(&mut self, best_obj: &mut f64, best_solution: &mut Vec<f64>) -> bool {
        if self.workers.iter().all(|w| w.infeasible) {
            log::info!("fix-and-propagate found no feasible solution");
            return false;
        }

        let mut best_index = None;
        for (i, worker) in self.workers.iter().enumerate() {
            if worker.infeasible {
                continue;
            }
            if self.num.is_lt(worker.obj_value, *best_obj)
                || (best_solution.is_empty() && best_index.is_none())
            {
                best_index = Some(i);
                *best_obj = worker.obj_value;
            }
        }

        let Some(index) = best_index else {
            log::info!("fix-and-propagate did not improve the incumbent");
            return false;
        };

        if best_solution.is_empty() {
            log::info!("fix-and-propagate found an initial solution: {best_obj:.6e}");
        } else {
            log::info!("fix-and-propagate found a new solution: {best_obj:.6e}");
        }
        best_solution.clear();
        best_solution.extend_from_slice(&self.workers[index].solution);
        true
    }
}

/// Scan binary columns by decreasing objective magnitude, trying the single
/// flip the objective favours; keep a flip only when it stays feasible and
/// strictly improves.
#[allow(clippy::too_many_arguments)]
fn one_opt_sweep(
    problem: &Problem,
    num: Num,
    cols_by_obj: &[usize],
    driver: &FixAndPropagate,
    mode: OneOptMode,
    timer: &Timer,
    view: &mut ProbingView<'_>,
    solution: &mut [f64],
    obj_value: &mut f64,
    scratch: &mut [f64],
) {
    let objective = &problem.objective().coefficients;

    for &col in cols_by_obj {
        if timer.exceeded() {
            return;
        }
        if num.is_zero(objective[col]) {
            break;
        }
        let binary = problem.col_flags()[col].test(ColFlags::INTEGRAL)
            && problem.lower_bounds()[col] == 0.0
            && problem.upper_bounds()[col] == 1.0;
        if !binary {
            continue;
        }

        // only the flip the objective favours can improve
        let target = if objective[col] > 0.0 {
            if num.is_zero(solution[col]) {
                continue;
            }
            0.0
        } else {
            if !num.is_zero(solution[col]) {
                continue;
            }
            1.0
        };

        let accepted = match mode {
            OneOptMode::Off => return,
            OneOptMode::Propagate => {
                view.reset();
                if driver.one_opt(solution, col, target, view, scratch) {
                    log::debug!("one-opt flip of col {col}: infeasible");
                    false
                } else {
                    let value = problem.compute_objective(scratch);
                    if num.is_lt(value, *obj_value) {
                        solution.copy_from_slice(scratch);
                        *obj_value = value;
                        true
                    } else {
                        false
                    }
                }
            }
            OneOptMode::FeasibilityCheck => {
                scratch.copy_from_slice(solution);
                scratch[col] = target;
                if problem.is_primal_feasible(scratch, num) {
                    let value = problem.compute_objective(scratch);
                    if num.is_lt(value, *obj_value) {
                        solution.copy_from_slice(scratch);
                        *obj_value = value;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
        };

        if accepted {
            log::debug!("one-opt flip of col {col} improved to {obj_value:.6e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volfix_core::problem::ProblemBuilder;

    /// Feasible set-partition style problem with a clear best assignment.
    fn partition_problem() -> Problem {
        // min 5 x0 - x1 - x2 - x3 + 5 x4
        // s.t. x0 + x1 = 1, x3 + x4 = 1, binaries
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(5);
        builder.set_num_rows(2);
        builder.set_obj_all(vec![5.0, -1.0, -1.0, -1.0, 5.0]);
        builder.set_col_lb_all(vec![0.0; 5]);
        builder.set_col_ub_all(vec![1.0; 5]);
        builder.set_col_integral_all(vec![true; 5]);
        builder.add_entry_all([(0, 0, 1.0), (0, 1, 1.0), (1, 3, 1.0), (1, 4, 1.0)]);
        builder.set_row_lhs(0, 1.0);
        builder.set_row_rhs(0, 1.0);
        builder.set_row_lhs(1, 1.0);
        builder.set_row_rhs(1, 1.0);
        builder.build()
    }

    fn run_once(seed: u64) -> (bool, f64, Vec<f64>) {
        let problem = partition_problem();
        let settings = AlgorithmSettings::default().with_threads(4).with_seed(seed);
        let mut heuristic = Heuristic::new(&problem, Num::default(), settings);
        heuristic.setup();

        let estimate = [0.4, 0.6, 0.7, 0.4, 0.6];
        let timer = Timer::unlimited();
        let mut best_obj = f64::INFINITY;
        let mut best_solution = Vec::new();
        let found = heuristic.perform_fix_and_propagate(
            &estimate,
            &timer,
            OneOptMode::Propagate,
            &mut best_obj,
            &mut best_solution,
        );
        (found, best_obj, best_solution)
    }

    #[test]
    fn test_finds_feasible_solution() {
        let problem = partition_problem();
        let (found, best_obj, best_solution) = run_once(0);

        assert!(found);
        assert!(problem.is_primal_feasible(&best_solution, Num::default()));
        // The optimum fixes x1 = x2 = x3 = 1 and the expensive pair to 0.
        assert_eq!(best_obj, -3.0);
        assert_eq!(best_solution, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_reduction_is_deterministic() {
        let (found_a, obj_a, sol_a) = run_once(1234);
        let (found_b, obj_b, sol_b) = run_once(1234);

        assert_eq!(found_a, found_b);
        assert_eq!(obj_a.to_bits(), obj_b.to_bits());
        assert_eq!(sol_a, sol_b);
    }

    #[test]
    fn test_incumbent_only_improves() {
        let problem = partition_problem();
        let settings = AlgorithmSettings::default().with_threads(2);
        let mut heuristic = Heuristic::new(&problem, Num::default(), settings);
        heuristic.setup();

        let estimate = [0.4, 0.6, 0.7, 0.4, 0.6];
        let timer = Timer::unlimited();

        // An incumbent better than anything reachable stays untouched.
        let mut best_obj = -100.0;
        let mut best_solution = vec![9.0; 5];
        let found = heuristic.perform_fix_and_propagate(
            &estimate,
            &timer,
            OneOptMode::Propagate,
            &mut best_obj,
            &mut best_solution,
        );
        assert!(!found);
        assert_eq!(best_obj, -100.0);
        assert_eq!(best_solution, vec![9.0; 5]);
    }

    #[test]
    fn test_simple_heuristic_finds_solution() {
        let problem = partition_problem();
        let settings = AlgorithmSettings::default().with_threads(2);
        let mut heuristic = Heuristic::new(&problem, Num::default(), settings);
        heuristic.setup();

        let mut best_obj = f64::INFINITY;
        let mut best_solution = Vec::new();
        let found = heuristic.find_any_solution(&mut best_obj, &mut best_solution);

        assert!(found);
        assert!(problem.is_primal_feasible(&best_solution, Num::default()));
        assert_eq!(best_obj, problem.compute_objective(&best_solution));
    }

    #[test]
    fn test_one_opt_monotone_on_given_solution() {
        let problem = partition_problem();
        let settings = AlgorithmSettings::default().with_threads(2);
        let mut heuristic = Heuristic::new(&problem, Num::default(), settings);
        heuristic.setup();

        let timer = Timer::unlimited();
        let mut solution = vec![1.0, 0.0, 0.0, 1.0, 0.0];
        let mut obj = problem.compute_objective(&solution);
        let before = obj;

        let improved =
            heuristic.improve_with_one_opt(&mut solution, &mut obj, OneOptMode::Propagate, &timer);
        assert!(obj <= before);
        assert!(improved);
        assert!(problem.is_primal_feasible(&solution, Num::default()));
        assert_eq!(obj, problem.compute_objective(&solution));
    }
}
