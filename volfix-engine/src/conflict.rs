//! No-good extraction from infeasible dives.
//!
//! When a dive over binary decisions dead-ends, the assignment on the
//! fixings trail can be excluded for good with one linear row: the sum of
//! disagreeing literals must be at least one. Callers collect these rows
//! and periodically fold them into a copy of the problem.

use volfix_core::num::Num;
use volfix_core::probing::ProbingView;
use volfix_core::problem::{ColFlags, Problem, ProblemBuilder, RowFlags};

/// A `>=` row excluding one binary assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRow {
    /// Columns with nonzero coefficients.
    pub columns: Vec<usize>,

    /// Coefficients: +1 for a variable fixed to 0, -1 for one fixed to 1.
    pub values: Vec<f64>,

    /// Left-hand side: `1 - (number of variables fixed to 1)`.
    pub lhs: f64,
}

/// Derive the no-good row for the decisions of an infeasible dive.
///
/// Returns `None` when the view is feasible, the trail is empty, or any
/// decision is not a binary 0/1 fixing (general-integer decisions cannot be
/// excluded with a single clause).
pub fn extract_conflict(view: &ProbingView<'_>, num: Num) -> Option<ConflictRow> {
    if !view.is_infeasible() {
        return None;
    }
    let fixings = view.get_fixings();
    if fixings.is_empty() {
        return None;
    }

    let problem = view.problem();
    let mut columns = Vec::with_capacity(fixings.len());
    let mut values = Vec::with_capacity(fixings.len());
    let mut ones = 0usize;

    for fixing in fixings {
        let col = fixing.column;
        let binary = problem.col_flags()[col].test(ColFlags::INTEGRAL)
            && problem.lower_bounds()[col] == 0.0
            && problem.upper_bounds()[col] == 1.0;
        if !binary {
            return None;
        }
        if num.is_eq(fixing.value, 1.0) {
            ones += 1;
            values.push(-1.0);
        } else if num.is_eq(fixing.value, 0.0) {
            values.push(1.0);
        } else {
            return None;
        }
        columns.push(col);
    }

    Some(ConflictRow {
        columns,
        values,
        lhs: 1.0 - ones as f64,
    })
}

/// Copy of `problem` extended by the given conflict rows.
pub fn append_conflicts(problem: &Problem, conflicts: &[ConflictRow]) -> Problem {
    let matrix = problem.matrix();
    let n_rows = matrix.n_rows();
    let n_cols = problem.n_cols();
    let extra_nnz: usize = conflicts.iter().map(|c| c.columns.len()).sum();

    let mut builder = ProblemBuilder::new();
    builder.set_name(problem.name().to_string());
    builder.reserve(matrix.nnz() + extra_nnz, n_rows + conflicts.len(), n_cols);
    builder.set_num_cols(n_cols);
    builder.set_num_rows(n_rows + conflicts.len());

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

    for (k, conflict) in conflicts.iter().enumerate() {
        let row = n_rows + k;
        for (&col, &value) in conflict.columns.iter().zip(&conflict.values) {
            builder.add_entry(row, col, value);
        }
        builder.set_row_lhs(row, conflict.lhs);
    }

    builder.build()
}
