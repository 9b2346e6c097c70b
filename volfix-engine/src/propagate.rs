//! Fix-and-propagate diving.
//!
//! The driver repeatedly asks a rounding strategy for the next fixing,
//! applies it to the probing view and propagates domains. On
//! infeasibility it can backtrack by flipping the most recent decision to
//! the other side of the estimate. Once no candidate remains, leftover
//! columns are completed directly from the estimate and the assembled
//! point is written into the caller's buffer.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use volfix_core::num::Num;
use volfix_core::probing::ProbingView;
use volfix_core::timer::Timer;

use crate::strategy::Rounding;

/// How `find_initial_solution` assigns unfixed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialSolutionMode {
    /// Zero where the domain allows it, else the nearer bound.
    Zero,

    /// Lower bounds, falling back to the upper bound or zero.
    LowerBounds,

    /// Upper bounds, falling back to the lower bound or zero.
    UpperBounds,

    /// Uniformly random within the domain (integral where required).
    Random {
        /// Generator seed.
        seed: u64,
    },
}

/// Fix-and-propagate driver.
///
/// Stateless apart from the numeric kernel and the backtrack budget; one
/// instance can serve any number of dives on distinct views.
pub struct FixAndPropagate {
    num: Num,
    max_backtracks: usize,
}

impl FixAndPropagate {
    /// Create a driver with the given per-dive backtrack budget.
    pub fn new(num: Num, max_backtracks: usize) -> Self {
        Self {
            num,
            max_backtracks,
        }
    }

    /// Dive on `cont_solution`, writing the assembled point into `result`.
    ///
    /// Returns whether the view ended infeasible. With
    /// `stop_at_infeasibility` the routine bails out on the first conflict
    /// instead of completing a best-effort assignment; with
    /// `perform_backtracking` the last decision is flipped and the dive
    /// resumed, up to the backtrack budget.
    pub fn fix_and_propagate(
        &self,
        cont_solution: &[f64],
        result: &mut [f64],
        strategy: &mut Rounding,
        view: &mut ProbingView<'_>,
        timer: &Timer,
        perform_backtracking: bool,
        stop_at_infeasibility: bool,
    ) -> bool {
        view.reset();

        if !perform_backtracking {
            self.dive(cont_solution, strategy, stop_at_infeasibility, view, timer);
            if stop_at_infeasibility && view.is_infeasible() {
                return true;
            }
            self.fix_remaining(cont_solution, view);
            self.collect_solution(result, view);
            return view.is_infeasible();
        }

        let mut backtracks = 0;
        loop {
            self.dive(cont_solution, strategy, true, view, timer);

            if !view.is_infeasible() {
                self.fix_remaining(cont_solution, view);
                self.collect_solution(result, view);
                return view.is_infeasible();
            }

            let fixings = view.get_fixings().to_vec();
            if fixings.is_empty() || backtracks >= self.max_backtracks || timer.exceeded() {
                if stop_at_infeasibility {
                    return true;
                }
                self.fix_remaining(cont_solution, view);
                self.collect_solution(result, view);
                return view.is_infeasible();
            }

            // Replay everything but the last decision, then flip it to the
            // other side of the estimate.
            let last = *fixings.last().unwrap();
            view.reset();
            for fixing in &fixings[..fixings.len() - 1] {
                view.set_probing_column(fixing.column, fixing.value);
                self.probing_step(view);
            }
            let flipped = self.flip_value(last.value, cont_solution[last.column]);
            log::debug!(
                "backtrack: flip col {} from {} to {}",
                last.column,
                last.value,
                flipped
            );
            view.set_probing_column(last.column, flipped);

            if self.probing_step(view) {
                // the flip fails as well; commit to this dive
                if stop_at_infeasibility {
                    return true;
                }
                self.dive(cont_solution, strategy, false, view, timer);
                self.fix_remaining(cont_solution, view);
                self.collect_solution(result, view);
                return view.is_infeasible();
            }
            backtracks += 1;
        }
    }

    /// Assign every unfixed column by `mode`, propagating after each
    /// fixing. Returns whether infeasibility was hit.
    pub fn find_initial_solution(
        &self,
        mode: InitialSolutionMode,
        view: &mut ProbingView<'_>,
        result: &mut [f64],
    ) -> bool {
        view.reset();
        let mut rng = match mode {
            InitialSolutionMode::Random { seed } => Some(ChaCha8Rng::seed_from_u64(seed)),
            _ => None,
        };

        for col in 0..result.len() {
            let lower = view.probing_lower_bounds()[col];
            let upper = view.probing_upper_bounds()[col];
            if self.num.is_eq(lower, upper) {
                continue;
            }

            let value = match mode {
                InitialSolutionMode::Zero => {
                    if upper.is_finite() && self.num.is_lt(upper, 0.0) {
                        upper
                    } else if lower.is_finite() && self.num.is_gt(lower, 0.0) {
                        lower
                    } else {
                        0.0
                    }
                }
                InitialSolutionMode::LowerBounds => {
                    if lower.is_finite() {
                        lower
                    } else if upper.is_finite() {
                        upper
                    } else {
                        0.0
                    }
                }
                InitialSolutionMode::UpperBounds => {
                    if upper.is_finite() {
                        upper
                    } else if lower.is_finite() {
                        lower
                    } else {
                        0.0
                    }
                }
                InitialSolutionMode::Random { .. } => {
                    let rng = rng.as_mut().unwrap();
                    if lower.is_finite() && upper.is_finite() {
                        if view.is_integer_variable(col) {
                            let lo = self.num.feas_ceil(lower);
                            let hi = self.num.feas_floor(upper);
                            lo + rng.gen_range(0..=(hi - lo).max(0.0) as u64) as f64
                        } else {
                            rng.gen_range(lower..=upper)
                        }
                    } else if lower.is_finite() {
                        lower
                    } else if upper.is_finite() {
                        upper
                    } else {
                        0.0
                    }
                }
            };

            log::trace!("initial solution: fix col {col} to {value}");
            view.set_probing_column(col, value);
            if self.probing_step(view) {
                return true;
            }
        }

        self.collect_solution(result, view);
        false
    }

    /// Apply a single flip on an already feasible solution, re-propagate
    /// and complete. Returns whether the flip is infeasible. The caller
    /// resets the view beforehand.
    pub fn one_opt(
        &self,
        feasible_solution: &[f64],
        col: usize,
        new_value: f64,
        view: &mut ProbingView<'_>,
        result: &mut [f64],
    ) -> bool {
        view.set_probing_column(col, new_value);
        if self.probing_step(view) {
            return true;
        }
        self.fix_remaining(feasible_solution, view);
        self.collect_solution(result, view);
        view.is_infeasible()
    }

    /// Fix strategy picks until none remain (or, with
    /// `stop_at_infeasibility`, until a conflict shows up).
    fn dive(
        &self,
        cont_solution: &[f64],
        strategy: &mut Rounding,
        stop_at_infeasibility: bool,
        view: &mut ProbingView<'_>,
        timer: &Timer,
    ) {
        loop {
            if timer.exceeded() {
                log::debug!("dive aborted by time limit");
                return;
            }
            let Some(fixing) = strategy.select_rounding_variable(cont_solution, view, self.num)
            else {
                return;
            };
            debug_assert!(view.is_within_bounds(fixing.column, fixing.value));
            log::trace!("fix col {} to {}", fixing.column, fixing.value);

            view.set_probing_column(fixing.column, fixing.value);
            let infeasible = self.probing_step(view);
            if stop_at_infeasibility && infeasible {
                return;
            }
        }
    }

    fn probing_step(&self, view: &mut ProbingView<'_>) -> bool {
        if view.is_infeasible() {
            return true;
        }
        view.propagate_domains();
        view.is_infeasible()
    }

    /// The backtrack value is one integer step towards the other side of
    /// the estimate.
    fn flip_value(&self, value: f64, estimate: f64) -> f64 {
        if self.num.is_ge(value, estimate) {
            debug_assert!(self.num.is_eq(self.num.feas_floor(estimate), value - 1.0));
            value - 1.0
        } else {
            debug_assert!(self.num.is_eq(self.num.feas_ceil(estimate), value + 1.0));
            value + 1.0
        }
    }

    /// Complete all still-open columns from the estimate, clamping into the
    /// current domain. Infeasibility past this point is accepted; the dive
    /// is already committed.
    fn fix_remaining(&self, cont_solution: &[f64], view: &mut ProbingView<'_>) {
        for col in 0..cont_solution.len() {
            let lower = view.probing_lower_bounds()[col];
            let upper = view.probing_upper_bounds()[col];
            if self.num.is_eq(lower, upper) {
                continue;
            }

            let ge_lb = self.num.is_ge(cont_solution[col], lower);
            let le_ub = self.num.is_le(cont_solution[col], upper);
            let value = if ge_lb && le_ub {
                if view.is_integer_variable(col) {
                    debug_assert!(self.num.is_integral(cont_solution[col]));
                    self.num.round(cont_solution[col])
                } else {
                    cont_solution[col]
                }
            } else if ge_lb {
                upper
            } else {
                debug_assert!(le_ub);
                lower
            };

            log::trace!("complete col {col} with {value}");
            view.set_probing_column(col, value);
            self.probing_step(view);
        }
    }

    /// Read the assembled point out of the (now point-wise) domains.
    fn collect_solution(&self, result: &mut [f64], view: &ProbingView<'_>) {
        let lower = view.probing_lower_bounds();
        let upper = view.probing_upper_bounds();
        for col in 0..result.len() {
            debug_assert!(self.num.is_eq(upper[col], lower[col]));
            result[col] = upper[col];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volfix_core::problem::{Problem, ProblemBuilder};

    fn driver() -> FixAndPropagate {
        FixAndPropagate::new(Num::default(), 16)
    }

    /// Binary problem where diving x3 = 1 and then x4 = 1 runs into a
    /// conflict that flipping x4 resolves:
    /// A1: x1 + x3 = 1
    /// A2: x1 + x2 + x3 = 2
    /// A3: x4 - x5 <= 0
    /// A4: x4 + x5 = 1
    fn backtrackable_problem() -> Problem {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(5);
        builder.set_num_rows(4);
        builder.set_obj_all(vec![1.0; 5]);
        builder.set_col_lb_all(vec![0.0; 5]);
        builder.set_col_ub_all(vec![1.0; 5]);
        builder.set_col_integral_all(vec![true; 5]);
        builder.add_entry_all([
            (0, 0, 1.0),
            (0, 2, 1.0),
            (1, 0, 1.0),
            (1, 1, 1.0),
            (1, 2, 1.0),
            (2, 3, 1.0),
            (2, 4, -1.0),
            (3, 3, 1.0),
            (3, 4, 1.0),
        ]);
        builder.set_row_lhs(0, 1.0);
        builder.set_row_rhs(0, 1.0);
        builder.set_row_lhs(1, 2.0);
        builder.set_row_rhs(1, 2.0);
        builder.set_row_rhs(2, 0.0);
        builder.set_row_lhs(3, 1.0);
        builder.set_row_rhs(3, 1.0);
        builder.build()
    }

    /// x0 = x1 and x0 + x1 = 1 has no binary solution.
    fn integrally_infeasible_problem() -> Problem {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(2);
        builder.set_num_rows(2);
        builder.set_obj_all(vec![1.0, 1.0]);
        builder.set_col_lb_all(vec![0.0, 0.0]);
        builder.set_col_ub_all(vec![1.0, 1.0]);
        builder.set_col_integral_all(vec![true, true]);
        builder.add_entry_all([(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, -1.0)]);
        builder.set_row_lhs(0, 1.0);
        builder.set_row_rhs(0, 1.0);
        builder.set_row_lhs(1, 0.0);
        builder.set_row_rhs(1, 0.0);
        builder.build()
    }

    #[test]
    fn test_integer_feasible_estimate_roundtrips() {
        let problem = backtrackable_problem();
        let mut view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();
        let mut result = vec![0.0; 5];
        let timer = Timer::unlimited();

        let x = [0.0, 1.0, 1.0, 0.0, 1.0];
        let infeasible = driver().fix_and_propagate(
            &x,
            &mut result,
            &mut strategy,
            &mut view,
            &timer,
            false,
            false,
        );

        assert!(!infeasible);
        assert_eq!(result, x);
    }

    #[test]
    fn test_equation_chain_dive_needs_no_backtrack() {
        // A1: x1 + x3 = 1, A2: x1 + x2 + x3 = 2, A3: x2 + x3 + x4 + x5 = 3,
        // A4: x4 + x5 = 1. Diving x3 = 1 and then x4 = 1 propagates x1 = 0,
        // x2 = 1 and x5 = 0; A4 is implied by the other rows at that point,
        // so the dive completes without a conflict.
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(5);
        builder.set_num_rows(4);
        builder.set_obj_all(vec![1.0; 5]);
        builder.set_col_lb_all(vec![0.0; 5]);
        builder.set_col_ub_all(vec![1.0; 5]);
        builder.set_col_integral_all(vec![true; 5]);
        builder.add_entry_all([
            (0, 0, 1.0),
            (0, 2, 1.0),
            (1, 0, 1.0),
            (1, 1, 1.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 1.0),
            (2, 3, 1.0),
            (2, 4, 1.0),
            (3, 3, 1.0),
            (3, 4, 1.0),
        ]);
        for (row, side) in [(0, 1.0), (1, 2.0), (2, 3.0), (3, 1.0)] {
            builder.set_row_lhs(row, side);
            builder.set_row_rhs(row, side);
        }
        let problem = builder.build();

        let mut view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();
        let mut result = vec![0.0; 5];
        let timer = Timer::unlimited();

        let x = [0.0, 1.0, 0.6, 0.9, 0.1];
        let infeasible = driver().fix_and_propagate(
            &x,
            &mut result,
            &mut strategy,
            &mut view,
            &timer,
            true,
            false,
        );

        assert!(!infeasible);
        assert_eq!(result, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(problem.is_primal_feasible(&result, Num::default()));
    }

    #[test]
    fn test_backtracking_recovers_from_conflict() {
        let problem = backtrackable_problem();
        let mut view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();
        let mut result = vec![0.0; 5];
        let timer = Timer::unlimited();

        // Fractional diving fixes x3 = 1 first (largest fractionality),
        // then x4 = 1, which conflicts; the flip to x4 = 0 recovers.
        let x = [0.0, 1.0, 0.6, 0.9, 0.1];
        let infeasible = driver().fix_and_propagate(
            &x,
            &mut result,
            &mut strategy,
            &mut view,
            &timer,
            true,
            false,
        );

        assert!(!infeasible);
        assert_eq!(result, vec![0.0, 1.0, 1.0, 0.0, 1.0]);
        assert!(problem.is_primal_feasible(&result, Num::default()));
    }

    #[test]
    fn test_failed_backtrack_reports_infeasible() {
        let problem = integrally_infeasible_problem();
        let mut view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();
        let mut result = vec![0.0; 2];
        let timer = Timer::unlimited();

        let x = [0.7, 0.2];
        let infeasible = driver().fix_and_propagate(
            &x,
            &mut result,
            &mut strategy,
            &mut view,
            &timer,
            true,
            false,
        );
        assert!(infeasible);
    }

    #[test]
    fn test_stop_at_infeasibility_returns_early() {
        let problem = integrally_infeasible_problem();
        let mut view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();
        let mut result = vec![0.0; 2];
        let timer = Timer::unlimited();

        let x = [0.7, 0.2];
        let infeasible = driver().fix_and_propagate(
            &x,
            &mut result,
            &mut strategy,
            &mut view,
            &timer,
            false,
            true,
        );
        assert!(infeasible);
    }

    #[test]
    fn test_one_opt_flip_cascades_and_completes() {
        // rows: x0 + x1 = 1, x3 + x4 = 1; c = (5, -1, -1, -1, 5)
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
        let problem = builder.build();

        let mut view = ProbingView::new(&problem, Num::default());
        let mut result = vec![0.0; 5];
        let feasible = [1.0, 0.0, 0.0, 1.0, 0.0];
        assert!(problem.is_primal_feasible(&feasible, Num::default()));

        // Flipping x0 to 0 forces x1 = 1 and keeps the rest.
        view.reset();
        let infeasible = driver().one_opt(&feasible, 0, 0.0, &mut view, &mut result);
        assert!(!infeasible);
        assert_eq!(result, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        assert!(problem.compute_objective(&result) < problem.compute_objective(&feasible));
    }

    #[test]
    fn test_initial_solution_modes() {
        let problem = backtrackable_problem();
        let mut view = ProbingView::new(&problem, Num::default());
        let mut result = vec![0.0; 5];

        // Fixing x1 = 0 lets propagation resolve the equations: x3 and x2
        // go to 1, and x4 = 0 forces x5 = 1.
        let infeasible = driver().find_initial_solution(
            InitialSolutionMode::LowerBounds,
            &mut view,
            &mut result,
        );
        assert!(!infeasible);
        assert_eq!(result, vec![0.0, 1.0, 1.0, 0.0, 1.0]);
        assert!(problem.is_primal_feasible(&result, Num::default()));

        // Random assignments are reproducible and integral.
        let mut first = vec![0.0; 5];
        let mode = InitialSolutionMode::Random { seed: 99 };
        let a = driver().find_initial_solution(mode, &mut view, &mut first);
        let mut second = vec![0.0; 5];
        let b = driver().find_initial_solution(mode, &mut view, &mut second);
        assert_eq!(a, b);
        if !a {
            assert_eq!(first, second);
            for &v in &first {
                assert!(v == 0.0 || v == 1.0);
            }
        }
    }
}
