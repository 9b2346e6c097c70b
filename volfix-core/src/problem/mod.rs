//! Immutable MILP problem model.
//!
//! A [`Problem`] is a minimization MILP over `n` columns and `m` rows:
//! objective `c`, constraint matrix `A` (stored row- and column-major),
//! row sides `(lhs, rhs)` with per-row flags and column domains `(lb, ub)`
//! with per-column flags. Problems are built once through
//! [`ProblemBuilder`] and never mutated afterwards; all partial-assignment
//! state lives in the probing view.

mod builder;
mod flags;
mod matrix;

pub use builder::ProblemBuilder;
pub use flags::{ColFlags, RowFlags};
pub use matrix::{ConstraintMatrix, SparseView};

use crate::num::{Num, StableSum};

/// Linear objective with a constant offset.
#[derive(Debug, Clone, Default)]
pub struct Objective {
    /// Coefficients, one per column.
    pub coefficients: Vec<f64>,

    /// Constant added to `c · x`.
    pub offset: f64,
}

/// Column domains and flags.
#[derive(Debug, Clone, Default)]
pub struct VariableDomains {
    /// Lower bounds; `f64::NEG_INFINITY` where `LB_INF` is set.
    pub lower: Vec<f64>,

    /// Upper bounds; `f64::INFINITY` where `UB_INF` is set.
    pub upper: Vec<f64>,

    /// Per-column flags.
    pub flags: Vec<ColFlags>,
}

/// An immutable minimization MILP.
#[derive(Debug, Clone)]
pub struct Problem {
    name: String,
    objective: Objective,
    matrix: ConstraintMatrix,
    domains: VariableDomains,
}

impl Problem {
    pub(crate) fn new(
        name: String,
        objective: Objective,
        matrix: ConstraintMatrix,
        domains: VariableDomains,
    ) -> Self {
        Self {
            name,
            objective,
            matrix,
            domains,
        }
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.matrix.n_rows()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.matrix.n_cols()
    }

    /// The objective.
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// The constraint matrix with sides and row flags.
    pub fn matrix(&self) -> &ConstraintMatrix {
        &self.matrix
    }

    /// Column domains and flags.
    pub fn domains(&self) -> &VariableDomains {
        &self.domains
    }

    /// Column flags.
    pub fn col_flags(&self) -> &[ColFlags] {
        &self.domains.flags
    }

    /// Lower bounds.
    pub fn lower_bounds(&self) -> &[f64] {
        &self.domains.lower
    }

    /// Upper bounds.
    pub fn upper_bounds(&self) -> &[f64] {
        &self.domains.upper
    }

    /// Number of integral columns.
    pub fn n_integral_cols(&self) -> usize {
        self.domains
            .flags
            .iter()
            .filter(|f| f.test(ColFlags::INTEGRAL))
            .count()
    }

    /// Copy of the problem with the given rows flagged redundant.
    ///
    /// Redundant rows are skipped by propagation, feasibility checks and the
    /// reformulation; this is how callers apply row filters without giving
    /// up immutability of the shared instance.
    pub fn with_rows_marked_redundant(&self, rows: &[usize]) -> Problem {
        let mut copy = self.clone();
        for &row in rows {
            copy.matrix.set_row_redundant(row);
        }
        copy
    }

    /// Objective value `c · x + offset` via stable summation.
    pub fn compute_objective(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.n_cols());
        let mut sum = StableSum::new();
        sum.add(self.objective.offset);
        for (c, xi) in self.objective.coefficients.iter().zip(x) {
            sum.add(c * xi);
        }
        sum.get()
    }

    /// Whether `x` satisfies all column bounds, integrality requirements and
    /// non-redundant row sides under the feasibility tolerance.
    pub fn is_primal_feasible(&self, x: &[f64], num: Num) -> bool {
        debug_assert_eq!(x.len(), self.n_cols());

        for (j, &xj) in x.iter().enumerate() {
            let flags = self.domains.flags[j];
            if !flags.test(ColFlags::LB_INF) && num.is_lt(xj, self.domains.lower[j]) {
                return false;
            }
            if !flags.test(ColFlags::UB_INF) && num.is_gt(xj, self.domains.upper[j]) {
                return false;
            }
            if flags.test(ColFlags::INTEGRAL) && !num.is_integral(xj) {
                return false;
            }
        }

        for i in 0..self.n_rows() {
            let flags = self.matrix.row_flags()[i];
            if flags.test(RowFlags::REDUNDANT) {
                continue;
            }
            let mut activity = StableSum::new();
            for (j, &a) in self.matrix.row(i).iter() {
                activity.add(a * x[j]);
            }
            let activity = activity.get();
            if !flags.test(RowFlags::LHS_INF) && num.is_lt(activity, self.matrix.lhs()[i]) {
                return false;
            }
            if !flags.test(RowFlags::RHS_INF) && num.is_gt(activity, self.matrix.rhs()[i]) {
                return false;
            }
        }

        true
    }
}
