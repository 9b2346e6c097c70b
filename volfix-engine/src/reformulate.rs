//! Problem reformulation for the Volume Algorithm.
//!
//! The volume stage works on a problem whose rows are all `= b_i` or
//! `>= b_i`. Two-sided rows are split into two `>=` rows and `<=` rows are
//! negated, preserving the feasible region exactly. The caller keeps the
//! original problem for diving; only the dual ascent sees this form.

use volfix_core::num::{Num, StableSum};
use volfix_core::problem::{ColFlags, Problem, ProblemBuilder, RowFlags};

/// Rewrite every non-redundant row of `problem` as an equation or a `>=`
/// row.
///
/// - equations and `>=` rows are copied as they are,
/// - `<=` rows become `-a x >= -rhs`,
/// - two-sided inequality rows are expanded into `a x >= lhs` and
///   `-a x >= -rhs`.
pub fn reformulate(problem: &Problem) -> Problem {
    let matrix = problem.matrix();
    let n_cols = problem.n_cols();

    let mut n_rows = 0;
    let mut nnz = 0;
    for i in 0..matrix.n_rows() {
        let flags = matrix.row_flags()[i];
        if flags.test(RowFlags::REDUNDANT) {
            continue;
        }
        let row_len = matrix.row(i).nnz();
        let two_sided = !flags.test(RowFlags::EQUATION)
            && !flags.test(RowFlags::LHS_INF)
            && !flags.test(RowFlags::RHS_INF);
        let copies = if two_sided { 2 } else { 1 };
        n_rows += copies;
        nnz += copies * row_len;
    }

    let mut builder = ProblemBuilder::new();
    builder.set_name(format!("{}_ge_form", problem.name()));
    builder.reserve(nnz, n_rows, n_cols);
    builder.set_num_cols(n_cols);
    builder.set_num_rows(n_rows);

    builder.set_obj_offset(problem.objective().offset);
    for j in 0..n_cols {
        builder.set_obj(j, problem.objective().coefficients[j]);
        let flags = problem.col_flags()[j];
        if flags.test(ColFlags::LB_INF) {
            builder.set_col_lb_inf(j, true);
        } else {
            builder.set_col_lb(j, problem.lower_bounds()[j]);
        }
        if flags.test(ColFlags::UB_INF) {
            builder.set_col_ub_inf(j, true);
        } else {
            builder.set_col_ub(j, problem.upper_bounds()[j]);
        }
        builder.set_col_integral(j, flags.test(ColFlags::INTEGRAL));
    }

    let mut out = 0;
    for i in 0..matrix.n_rows() {
        let flags = matrix.row_flags()[i];
        if flags.test(RowFlags::REDUNDANT) {
            continue;
        }
        let lhs = matrix.lhs()[i];
        let rhs = matrix.rhs()[i];
        let has_lhs = !flags.test(RowFlags::LHS_INF);
        let has_rhs = !flags.test(RowFlags::RHS_INF);

        if flags.test(RowFlags::EQUATION) {
            for (j, &a) in matrix.row(i).iter() {
                builder.add_entry(out, j, a);
            }
            builder.set_row_lhs(out, lhs);
            builder.set_row_rhs(out, rhs);
            out += 1;
        } else {
            if has_lhs {
                for (j, &a) in matrix.row(i).iter() {
                    builder.add_entry(out, j, a);
                }
                builder.set_row_lhs(out, lhs);
                out += 1;
            }
            if has_rhs {
                for (j, &a) in matrix.row(i).iter() {
                    builder.add_entry(out, j, -a);
                }
                builder.set_row_lhs(out, -rhs);
                out += 1;
            }
        }
    }
    debug_assert_eq!(out, n_rows);

    builder.build()
}

/// Upper bound of `c · x` over the box, the volume stage's `UB_0`.
///
/// Fails with the offending column when a needed bound is infinite.
pub fn objective_bound(problem: &Problem, num: Num) -> Result<f64, crate::EngineError> {
    let c = &problem.objective().coefficients;
    let mut bound = StableSum::new();
    for (j, &cj) in c.iter().enumerate() {
        if num.is_zero(cj) {
            continue;
        }
        let flags = problem.col_flags()[j];
        if cj > 0.0 {
            if flags.test(ColFlags::UB_INF) {
                return Err(crate::EngineError::UnboundedObjectiveBound(j));
            }
            bound.add(cj * problem.upper_bounds()[j]);
        } else {
            if flags.test(ColFlags::LB_INF) {
                return Err(crate::EngineError::UnboundedObjectiveBound(j));
            }
            bound.add(cj * problem.lower_bounds()[j]);
        }
    }
    Ok(bound.get())
}

/// Copy of `problem` extended by the objective cutoff row
/// `c · x <= incumbent - offset - feas_tol`.
///
/// Used by callers that want later dives to chase strictly better
/// solutions only.
pub fn with_objective_cutoff(problem: &Problem, incumbent: f64, num: Num) -> Problem {
    let matrix = problem.matrix();
    let n_rows = matrix.n_rows();
    let n_cols = problem.n_cols();
    let c = &problem.objective().coefficients;

    let mut builder = ProblemBuilder::new();
    builder.set_name(problem.name().to_string());
    builder.reserve(matrix.nnz() + n_cols, n_rows + 1, n_cols);
    builder.set_num_cols(n_cols);
    builder.set_num_rows(n_rows + 1);

    builder.set_obj_offset(problem.objective().offset);
    for j in 0..n_cols {
        builder.set_obj(j, c[j]);
        let flags = problem.col_flags()[j];
        if flags.test(ColFlags::LB_INF) {
            builder.set_col_lb_inf(j, true);
        } else {
            builder.set_col_lb(j, problem.lower_bounds()[j]);
        }
        if flags.test(ColFlags::UB_INF) {
            builder.set_col_ub_inf(j, true);
        } else {
            builder.set_col_ub(j, problem.upper_bounds()[j]);
        }
        builder.set_col_integral(j, flags.test(ColFlags::INTEGRAL));
    }

    for i in 0..n_rows {
        let flags = matrix.row_flags()[i];
        for (j, &a) in matrix.row(i).iter() {
            builder.add_entry(i, j, a);
        }
        if !flags.test(RowFlags::LHS_INF) {
            builder.set_row_lhs(i, matrix.lhs()[i]);
        }
        if !flags.test(RowFlags::RHS_INF) {
            builder.set_row_rhs(i, matrix.rhs()[i]);
        }
    }

    for (j, &cj) in c.iter().enumerate() {
        builder.add_entry(n_rows, j, cj);
    }
    builder.set_row_rhs(
        n_rows,
        incumbent - problem.objective().offset - num.feas_tol,
    );

    builder.build()
}

/// Opt-in hard-constraint filter.
///
/// Returns a copy of `problem` where every row whose max/min absolute
/// coefficient ratio exceeds `threshold` is flagged redundant, along with
/// the number of rows dropped. Callers apply this before the volume stage;
/// the volume algorithm itself never filters.
pub fn filter_hard_rows(problem: &Problem, threshold: f64) -> (Problem, usize) {
    let matrix = problem.matrix();
    let mut dropped = Vec::new();

    for i in 0..matrix.n_rows() {
        if matrix.row_flags()[i].test(RowFlags::REDUNDANT) {
            continue;
        }
        let mut max_abs: f64 = 0.0;
        let mut min_abs = f64::INFINITY;
        for (_, &a) in matrix.row(i).iter() {
            max_abs = max_abs.max(a.abs());
            min_abs = min_abs.min(a.abs());
        }
        if max_abs > 0.0 && max_abs / min_abs > threshold {
            dropped.push(i);
        }
    }

    if !dropped.is_empty() {
        log::info!(
            "hard-constraint filter dropped {} of {} rows",
            dropped.len(),
            matrix.n_rows()
        );
    }
    let count = dropped.len();
    (problem.with_rows_marked_redundant(&dropped), count)
}
