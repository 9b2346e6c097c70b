//! Volume Algorithm: approximate Lagrangian dual ascent with primal
//! smoothing.
//!
//! Works on a reformulated problem whose rows are all `= b_i` or `>= b_i`
//! (see [`crate::reformulate`]). Each round solves the box-constrained
//! Lagrangian subproblem in closed form, takes a subgradient step on the
//! duals and folds the subproblem solution into the smoothed primal
//! `x_bar`. Iterations are classed green (strong improvement), yellow
//! (improvement with a negative direction product) or red (no
//! improvement); the classes drive the step-factor ladder.

use volfix_core::linalg;
use volfix_core::num::{Num, StableSum};
use volfix_core::problem::{ColFlags, ConstraintMatrix, RowFlags, VariableDomains};
use volfix_core::timer::Timer;

use crate::settings::AlgorithmSettings;

/// Lower floor for the adaptive `alpha_max`.
const ALPHA_MAX_FLOOR: f64 = 1e-4;

/// One volume run. Holds the adaptive state (`alpha`, `alpha_max`, `f`);
/// create a fresh instance per call.
pub struct VolumeAlgorithm<'a> {
    num: Num,
    timer: &'a Timer,
    settings: &'a AlgorithmSettings,
    alpha: f64,
    alpha_max: f64,
    f: f64,
}

impl<'a> VolumeAlgorithm<'a> {
    /// Set up a run with the adaptive parameters at their configured start
    /// values.
    pub fn new(num: Num, timer: &'a Timer, settings: &'a AlgorithmSettings) -> Self {
        Self {
            num,
            timer,
            settings,
            alpha: settings.alpha,
            alpha_max: settings.alpha_max,
            f: settings.f,
        }
    }

    /// Current step-size factor (bounded by `f_min`/`f_max`).
    pub fn current_f(&self) -> f64 {
        self.f
    }

    /// Current smoothing weight (bounded by `alpha_max/10`/`alpha_max`).
    pub fn current_alpha(&self) -> f64 {
        self.alpha
    }

    /// Run the volume algorithm and return the smoothed primal `x_bar`.
    ///
    /// `matrix` must be in `=`/`>=` form with sides `b`; `pi` is the
    /// initial dual vector and `box_upper_bound` an upper bound on
    /// `c · x` over the box (`UB_0`).
    #[allow(clippy::too_many_arguments)] // mirrors the mathematical statement of the method
    pub fn solve(
        &mut self,
        c: &[f64],
        matrix: &ConstraintMatrix,
        b: &[f64],
        domains: &VariableDomains,
        pi: &[f64],
        num_int_vars: usize,
        box_upper_bound: f64,
    ) -> Vec<f64> {
        let m = matrix.n_rows();
        let n = c.len();
        debug_assert_eq!(pi.len(), m);
        debug_assert_eq!(b.len(), m);
        debug_assert!(self.rows_are_eq_or_ge(matrix));

        let mut counter = 1usize;
        let mut weak_iters = 0usize;
        let mut red_iters = 0usize;

        let mut v_t = vec![0.0; m];
        let mut viol_t = vec![0.0; m];
        let mut x_t = vec![0.0; n];
        let mut reduced = vec![0.0; n];
        let mut residual_t = vec![0.0; m];
        let mut pi_t = pi.to_vec();
        let mut pi_bar = pi.to_vec();
        self.project_duals(matrix, &mut pi_t);

        // Solve (6) with the initial duals to seed x_bar and z_bar.
        let mut z_bar = self.solve_subproblem(c, matrix, b, domains, pi, &mut x_t, &mut reduced);
        let mut x_bar = x_t.clone();
        let mut x_bar_last = x_bar.clone();
        let mut z_bar_old = z_bar;

        let upper_bound_reset = if self.num.is_ge(box_upper_bound, 1.0) {
            1.0
        } else {
            box_upper_bound
        };
        let mut upper_bound = 0.0;
        let mut have_upper_bound = false;

        let mut fixed_int_counts = vec![0usize; n];
        self.init_fixed_int_count(&x_bar, domains, &mut fixed_int_counts);

        linalg::b_minus_ax(matrix, &x_bar, b, &mut v_t);
        self.mask_satisfied_rows(matrix, &pi_bar, &v_t, &mut viol_t);

        while self.keep_running(
            &viol_t,
            m,
            c,
            &x_bar,
            z_bar,
            num_int_vars,
            &fixed_int_counts,
            counter - 1,
        ) {
            self.update_upper_bound(
                z_bar,
                upper_bound_reset,
                &mut upper_bound,
                &mut have_upper_bound,
            );
            debug_assert!(self.num.is_gt(upper_bound, z_bar));

            let norm_sq = linalg::multi(&v_t, &v_t);
            if self.num.is_zero(norm_sq) {
                break;
            }
            let step = self.f * (upper_bound - z_bar) / norm_sq;
            log::trace!("round {counter}: step {step:.3e}, f {:.3e}", self.f);

            linalg::b_plus_sx(&pi_bar, step, &v_t, &mut pi_t);
            self.project_duals(matrix, &mut pi_t);

            let z_t = self.solve_subproblem(c, matrix, b, domains, &pi_t, &mut x_t, &mut reduced);

            linalg::b_minus_ax(matrix, &x_t, b, &mut residual_t);
            self.update_alpha(&residual_t, &v_t);

            // x_bar <- alpha x_t + (1 - alpha) x_bar
            x_bar_last.copy_from_slice(&x_bar);
            linalg::qb_plus_sx(self.alpha, &x_t, 1.0 - self.alpha, &x_bar_last, &mut x_bar);

            let improvement = self.num.is_gt(z_t, z_bar);
            if improvement {
                z_bar = z_t;
                pi_bar.copy_from_slice(&pi_t);
            }

            self.update_fixed_int_count(&x_bar, &x_bar_last, domains, &mut fixed_int_counts);

            linalg::b_minus_ax(matrix, &x_bar, b, &mut v_t);
            self.mask_satisfied_rows(matrix, &pi_bar, &v_t, &mut viol_t);

            self.update_f(
                improvement,
                &v_t,
                &residual_t,
                &mut weak_iters,
                &mut red_iters,
            );

            if counter % 100 == 0 {
                self.update_alpha_max(z_bar, z_bar_old);
                z_bar_old = z_bar;
            }

            counter += 1;
        }

        log::info!(
            "volume algorithm performed {} rounds, bound {:.6e}",
            counter - 1,
            z_bar
        );
        x_bar
    }

    /// Every row must be an equation or a `>=` row (finite lhs).
    fn rows_are_eq_or_ge(&self, matrix: &ConstraintMatrix) -> bool {
        matrix.row_flags().iter().all(|flags| {
            flags.test(RowFlags::REDUNDANT)
                || flags.test(RowFlags::EQUATION)
                || (flags.test(RowFlags::RHS_INF) && !flags.test(RowFlags::LHS_INF))
        })
    }

    /// Project `>=`-row duals back to the nonnegative orthant. Equality-row
    /// duals are free.
    fn project_duals(&self, matrix: &ConstraintMatrix, pi: &mut [f64]) {
        for (i, flags) in matrix.row_flags().iter().enumerate() {
            if flags.test(RowFlags::RHS_INF) {
                pi[i] = self.num.max(pi[i], 0.0);
            }
        }
    }

    /// Closed-form solution of the Lagrangian subproblem (6): minimize
    /// `(c - pi A) x + pi b` over the box. Returns `f64::MIN` when a
    /// descent direction has no finite bound (degenerate iteration).
    fn solve_subproblem(
        &self,
        c: &[f64],
        matrix: &ConstraintMatrix,
        b: &[f64],
        domains: &VariableDomains,
        pi: &[f64],
        x: &mut [f64],
        reduced: &mut [f64],
    ) -> f64 {
        linalg::b_minus_xa(matrix, pi, c, reduced);

        let mut objective = StableSum::new();
        objective.add(linalg::multi(b, pi));

        for j in 0..reduced.len() {
            let flags = domains.flags[j];
            if self.num.is_zero(reduced[j]) {
                // zero reduced cost contributes nothing; sit on the lower
                // bound, or 0 when there is none
                x[j] = if flags.test(ColFlags::LB_INF) {
                    0.0
                } else {
                    domains.lower[j]
                };
                continue;
            } else if reduced[j] > 0.0 {
                if flags.test(ColFlags::LB_INF) {
                    return f64::MIN;
                }
                x[j] = domains.lower[j];
            } else {
                if flags.test(ColFlags::UB_INF) {
                    return f64::MIN;
                }
                x[j] = domains.upper[j];
            }
            objective.add(reduced[j] * x[j]);
        }

        objective.get()
    }

    /// The violation vector is the residual with complementary-slack
    /// components of `>=` rows zeroed out.
    fn mask_satisfied_rows(
        &self,
        matrix: &ConstraintMatrix,
        pi: &[f64],
        residual: &[f64],
        violation: &mut [f64],
    ) {
        violation.copy_from_slice(residual);
        for (i, flags) in matrix.row_flags().iter().enumerate() {
            if flags.test(RowFlags::RHS_INF)
                && self.num.is_lt(residual[i], 0.0)
                && self.num.is_zero(pi[i])
            {
                violation[i] = 0.0;
            }
        }
    }

    /// Whether another round should run. Stops on primal feasibility plus a
    /// closed duality gap, on a stable integral fraction, on the time limit
    /// or on the iteration limit.
    #[allow(clippy::too_many_arguments)]
    fn keep_running(
        &self,
        violation: &[f64],
        n_rows: usize,
        c: &[f64],
        x_bar: &[f64],
        z_bar: f64,
        num_int_vars: usize,
        fixed_int_counts: &[usize],
        iterations: usize,
    ) -> bool {
        let settings = self.settings;

        let primal_feasible = self.num.is_lt(
            linalg::l1_norm(violation),
            n_rows as f64 * settings.con_abstol,
        );

        let objective = linalg::multi(c, x_bar);
        let gap_closed = if self.num.is_zero(z_bar) {
            self.num.is_lt(objective.abs(), settings.obj_abstol)
        } else {
            self.num
                .is_lt((objective - z_bar).abs(), z_bar.abs() * settings.obj_reltol)
        };

        let stable = fixed_int_counts
            .iter()
            .filter(|&&count| count > settings.fixed_int_var_window)
            .count();
        let integral_fraction_stable = num_int_vars > 0
            && stable as f64 >= num_int_vars as f64 * settings.fixed_int_var_threshold;

        if integral_fraction_stable {
            log::debug!("stopping: {stable} of {num_int_vars} integer variables are stable");
        }

        !((primal_feasible && gap_closed)
            || integral_fraction_stable
            || self.timer.exceeded()
            || iterations >= settings.max_iterations)
    }

    /// Drift the artificial upper-bound target upwards whenever the bound
    /// gets close to it.
    fn update_upper_bound(
        &self,
        z_bar: f64,
        reset_value: f64,
        upper_bound: &mut f64,
        have_upper_bound: &mut bool,
    ) {
        if *have_upper_bound {
            if self
                .num
                .is_ge(z_bar, *upper_bound - upper_bound.abs() * 0.05)
            {
                *upper_bound = if self.num.is_zero(z_bar) {
                    reset_value
                } else {
                    self.num.max(
                        *upper_bound + upper_bound.abs() * 0.03,
                        z_bar + z_bar.abs() * 0.06,
                    )
                };
                log::trace!("raised upper-bound target to {upper_bound:.6e}");
            }
        } else {
            *upper_bound = if self.num.is_zero(z_bar) {
                reset_value
            } else {
                z_bar + z_bar.abs() * 0.06
            };
            *have_upper_bound = true;
        }
    }

    /// `alpha` minimizes the norm of the combined residual
    /// `alpha r_t + (1 - alpha) r_bar`, clamped to
    /// `[alpha_max / 10, alpha_max]`.
    fn update_alpha(&mut self, residual_t: &[f64], residual_bar: &[f64]) {
        let t_t = linalg::multi(residual_t, residual_t);
        let t_bar = linalg::multi(residual_t, residual_bar);
        let bar_bar = linalg::multi(residual_bar, residual_bar);

        let denominator = t_t + bar_bar - 2.0 * t_bar;
        let alpha_opt = if self.num.is_gt(denominator, 0.0) {
            (bar_bar - t_bar) / denominator
        } else {
            self.alpha_max
        };

        self.alpha = alpha_opt.clamp(self.alpha_max / 10.0, self.alpha_max);
    }

    /// Step-factor ladder: green iterations double `f` (up to `f_max`),
    /// enough yellow iterations nudge it up, enough red iterations shrink
    /// it (down to `f_min`).
    fn update_f(
        &mut self,
        improvement: bool,
        v_t: &[f64],
        residual_t: &[f64],
        weak_iters: &mut usize,
        red_iters: &mut usize,
    ) {
        let settings = self.settings;

        if improvement {
            if self.num.is_ge(linalg::multi(v_t, residual_t), 0.0) {
                // green
                self.f = self.num.min(settings.f_strong_incr_factor * self.f, settings.f_max);
            } else {
                // yellow
                *weak_iters += 1;
                if *weak_iters >= settings.weak_improvement_iter_limit {
                    *weak_iters = 0;
                    self.f = self.num.min(settings.f_weak_incr_factor * self.f, settings.f_max);
                }
            }
        } else {
            // red
            *red_iters += 1;
            if *red_iters >= settings.non_improvement_iter_limit {
                *red_iters = 0;
                if self.num.is_ge(settings.f_decr_factor * self.f, settings.f_min) {
                    self.f = settings.f_decr_factor * self.f;
                }
            }
        }
    }

    /// Every 100 rounds: if the bound advanced by less than 1%, halve
    /// `alpha_max` (floored).
    fn update_alpha_max(&mut self, z_bar: f64, z_bar_old: f64) {
        if self
            .num
            .is_lt(z_bar, z_bar_old + 0.01 * z_bar_old.abs())
            && self.num.is_ge(self.alpha_max / 2.0, ALPHA_MAX_FLOOR)
        {
            self.alpha_max /= 2.0;
        }
    }

    fn init_fixed_int_count(
        &self,
        x_bar: &[f64],
        domains: &VariableDomains,
        counts: &mut [usize],
    ) {
        for j in 0..x_bar.len() {
            if domains.flags[j].test(ColFlags::INTEGRAL) && self.num.is_integral(x_bar[j]) {
                counts[j] = 1;
            }
        }
    }

    fn update_fixed_int_count(
        &self,
        x_bar: &[f64],
        x_bar_last: &[f64],
        domains: &VariableDomains,
        counts: &mut [usize],
    ) {
        for j in 0..x_bar.len() {
            if domains.flags[j].test(ColFlags::INTEGRAL)
                && self.num.is_integral(x_bar[j])
                && self.num.is_eq(x_bar[j], x_bar_last[j])
            {
                counts[j] += 1;
            } else {
                counts[j] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reformulate::reformulate;
    use volfix_core::problem::{Problem, ProblemBuilder};

    /// min x + 2y s.t. x + 2y <= 2, y <= 3, x in [-1,1], y in [0,1],
    /// both integral.
    fn two_var_problem() -> Problem {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(2);
        builder.set_num_rows(2);
        builder.set_obj_all(vec![1.0, 2.0]);
        builder.set_col_lb_all(vec![-1.0, 0.0]);
        builder.set_col_ub_all(vec![1.0, 1.0]);
        builder.set_col_integral_all(vec![true, true]);
        builder.add_entry(0, 0, 1.0);
        builder.add_entry(0, 1, 2.0);
        builder.add_entry(1, 1, 1.0);
        builder.set_row_rhs(0, 2.0);
        builder.set_row_rhs(1, 3.0);
        builder.build()
    }

    #[test]
    fn test_terminates_on_small_problem() {
        let problem = two_var_problem();
        let reformulated = reformulate(&problem);
        let settings = AlgorithmSettings::default();
        let timer = Timer::unlimited();
        let num = Num::default();

        let pi = vec![0.0; reformulated.n_rows()];
        let mut algorithm = VolumeAlgorithm::new(num, &timer, &settings);
        let x_bar = algorithm.solve(
            &reformulated.objective().coefficients,
            reformulated.matrix(),
            reformulated.matrix().lhs(),
            reformulated.domains(),
            &pi,
            2,
            3.0,
        );

        assert_eq!(x_bar.len(), 2);
        // The estimate stays inside the box and reaches a nonpositive
        // objective (the optimum is x = -1, y = 0).
        assert!(x_bar[0] >= -1.0 - 1e-6 && x_bar[0] <= 1.0 + 1e-6);
        assert!(x_bar[1] >= -1e-6 && x_bar[1] <= 1.0 + 1e-6);
        assert!(problem.compute_objective(&x_bar) <= 1e-6);
    }

    #[test]
    fn test_adaptive_parameters_stay_in_range() {
        // min -x - y s.t. x + y = 1 over [0,1]^2 needs genuine dual ascent,
        // so the adaptation machinery actually runs.
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(2);
        builder.set_num_rows(1);
        builder.set_obj_all(vec![-1.0, -1.0]);
        builder.set_col_lb_all(vec![0.0, 0.0]);
        builder.set_col_ub_all(vec![1.0, 1.0]);
        builder.set_col_integral_all(vec![true, true]);
        builder.add_entry(0, 0, 1.0);
        builder.add_entry(0, 1, 1.0);
        builder.set_row_lhs(0, 1.0);
        builder.set_row_rhs(0, 1.0);
        let problem = builder.build();

        let settings = AlgorithmSettings::default().with_max_iterations(50);
        let timer = Timer::unlimited();
        let num = Num::default();

        let pi = vec![0.0; 1];
        let mut algorithm = VolumeAlgorithm::new(num, &timer, &settings);
        let x_bar = algorithm.solve(
            &problem.objective().coefficients,
            problem.matrix(),
            problem.matrix().lhs(),
            problem.domains(),
            &pi,
            2,
            0.0,
        );

        assert!(x_bar.iter().all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v)));
        assert!(algorithm.current_f() >= settings.f_min);
        assert!(algorithm.current_f() <= settings.f_max);
        assert!(algorithm.current_alpha() <= settings.alpha_max);
        assert!(algorithm.current_alpha() >= ALPHA_MAX_FLOOR / 10.0);
    }

    #[test]
    fn test_empty_matrix_returns_box_solution() {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(2);
        builder.set_num_rows(0);
        builder.set_obj_all(vec![1.0, 1.0]);
        builder.set_col_lb_all(vec![0.0, 0.0]);
        builder.set_col_ub_all(vec![1.0, 1.0]);
        builder.set_col_integral_all(vec![true, true]);
        let problem = builder.build();

        let settings = AlgorithmSettings::default();
        let timer = Timer::unlimited();
        let mut algorithm = VolumeAlgorithm::new(Num::default(), &timer, &settings);
        let x_bar = algorithm.solve(
            &problem.objective().coefficients,
            problem.matrix(),
            problem.matrix().lhs(),
            problem.domains(),
            &[],
            2,
            2.0,
        );

        // With positive reduced costs everywhere the subproblem sits on the
        // lower bounds, and without rows there is nothing to ascend.
        assert_eq!(x_bar, vec![0.0, 0.0]);
    }

    #[test]
    fn test_time_limit_stops_immediately() {
        let problem = two_var_problem();
        let reformulated = reformulate(&problem);
        let settings = AlgorithmSettings::default();
        let timer = Timer::new(0.0);
        let num = Num::default();

        let pi = vec![0.0; reformulated.n_rows()];
        let mut algorithm = VolumeAlgorithm::new(num, &timer, &settings);
        let x_bar = algorithm.solve(
            &reformulated.objective().coefficients,
            reformulated.matrix(),
            reformulated.matrix().lhs(),
            reformulated.domains(),
            &pi,
            2,
            3.0,
        );

        // Only the seeding subproblem ran; the result is still a valid box
        // point.
        assert_eq!(x_bar.len(), 2);
        assert!(x_bar[0] >= -1.0 && x_bar[1] >= 0.0);
    }
}
