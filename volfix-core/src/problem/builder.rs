//! Triplet-based problem construction.

use super::{ColFlags, ConstraintMatrix, Objective, Problem, RowFlags, VariableDomains};

/// Incremental builder producing an immutable [`Problem`].
///
/// Columns default to `[0, +inf)` continuous; rows default to free (both
/// sides infinite). Setting a side clears the corresponding infinity flag.
/// `build` derives the `EQUATION` and `FIXED` flags from the data.
#[derive(Debug, Clone, Default)]
pub struct ProblemBuilder {
    name: String,
    obj: Vec<f64>,
    obj_offset: f64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    col_flags: Vec<ColFlags>,
    lhs: Vec<f64>,
    rhs: Vec<f64>,
    row_flags: Vec<RowFlags>,
    entries: Vec<(usize, usize, f64)>,
}

impl ProblemBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate for the expected problem size.
    pub fn reserve(&mut self, nnz: usize, n_rows: usize, n_cols: usize) {
        self.entries.reserve(nnz);
        self.lhs.reserve(n_rows);
        self.rhs.reserve(n_rows);
        self.row_flags.reserve(n_rows);
        self.obj.reserve(n_cols);
        self.lower.reserve(n_cols);
        self.upper.reserve(n_cols);
        self.col_flags.reserve(n_cols);
    }

    /// Instance name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Resize to `n` columns, new columns defaulting to `[0, +inf)`
    /// continuous.
    pub fn set_num_cols(&mut self, n: usize) {
        self.obj.resize(n, 0.0);
        self.lower.resize(n, 0.0);
        self.upper.resize(n, f64::INFINITY);
        let mut default_flags = ColFlags::default();
        default_flags.set(ColFlags::UB_INF);
        self.col_flags.resize(n, default_flags);
    }

    /// Resize to `m` rows, new rows defaulting to free.
    pub fn set_num_rows(&mut self, m: usize) {
        self.lhs.resize(m, f64::NEG_INFINITY);
        self.rhs.resize(m, f64::INFINITY);
        let mut default_flags = RowFlags::default();
        default_flags.set(RowFlags::LHS_INF);
        default_flags.set(RowFlags::RHS_INF);
        self.row_flags.resize(m, default_flags);
    }

    /// Current number of columns.
    pub fn n_cols(&self) -> usize {
        self.obj.len()
    }

    /// Current number of rows.
    pub fn n_rows(&self) -> usize {
        self.lhs.len()
    }

    /// Objective coefficient of one column.
    pub fn set_obj(&mut self, col: usize, value: f64) {
        self.obj[col] = value;
    }

    /// All objective coefficients at once.
    pub fn set_obj_all(&mut self, coefficients: Vec<f64>) {
        debug_assert_eq!(coefficients.len(), self.n_cols());
        self.obj = coefficients;
    }

    /// Constant objective offset.
    pub fn set_obj_offset(&mut self, offset: f64) {
        self.obj_offset = offset;
    }

    /// Finite lower bound for one column.
    pub fn set_col_lb(&mut self, col: usize, value: f64) {
        self.lower[col] = value;
        self.col_flags[col].unset(ColFlags::LB_INF);
    }

    /// Finite upper bound for one column.
    pub fn set_col_ub(&mut self, col: usize, value: f64) {
        self.upper[col] = value;
        self.col_flags[col].unset(ColFlags::UB_INF);
    }

    /// Mark the lower bound infinite (or finite again).
    pub fn set_col_lb_inf(&mut self, col: usize, inf: bool) {
        if inf {
            self.lower[col] = f64::NEG_INFINITY;
            self.col_flags[col].set(ColFlags::LB_INF);
        } else {
            self.col_flags[col].unset(ColFlags::LB_INF);
        }
    }

    /// Mark the upper bound infinite (or finite again).
    pub fn set_col_ub_inf(&mut self, col: usize, inf: bool) {
        if inf {
            self.upper[col] = f64::INFINITY;
            self.col_flags[col].set(ColFlags::UB_INF);
        } else {
            self.col_flags[col].unset(ColFlags::UB_INF);
        }
    }

    /// All finite lower bounds at once.
    pub fn set_col_lb_all(&mut self, bounds: Vec<f64>) {
        debug_assert_eq!(bounds.len(), self.n_cols());
        for (col, &value) in bounds.iter().enumerate() {
            self.set_col_lb(col, value);
        }
    }

    /// All finite upper bounds at once.
    pub fn set_col_ub_all(&mut self, bounds: Vec<f64>) {
        debug_assert_eq!(bounds.len(), self.n_cols());
        for (col, &value) in bounds.iter().enumerate() {
            self.set_col_ub(col, value);
        }
    }

    /// Integrality marker for one column.
    pub fn set_col_integral(&mut self, col: usize, integral: bool) {
        if integral {
            self.col_flags[col].set(ColFlags::INTEGRAL);
        } else {
            self.col_flags[col].unset(ColFlags::INTEGRAL);
        }
    }

    /// Integrality markers for all columns.
    pub fn set_col_integral_all(&mut self, integral: Vec<bool>) {
        debug_assert_eq!(integral.len(), self.n_cols());
        for (col, &flag) in integral.iter().enumerate() {
            self.set_col_integral(col, flag);
        }
    }

    /// Finite left-hand side for one row.
    pub fn set_row_lhs(&mut self, row: usize, value: f64) {
        self.lhs[row] = value;
        self.row_flags[row].unset(RowFlags::LHS_INF);
    }

    /// Finite right-hand side for one row.
    pub fn set_row_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] = value;
        self.row_flags[row].unset(RowFlags::RHS_INF);
    }

    /// Mark the left-hand side infinite (or finite again).
    pub fn set_row_lhs_inf(&mut self, row: usize, inf: bool) {
        if inf {
            self.lhs[row] = f64::NEG_INFINITY;
            self.row_flags[row].set(RowFlags::LHS_INF);
        } else {
            self.row_flags[row].unset(RowFlags::LHS_INF);
        }
    }

    /// Mark the right-hand side infinite (or finite again).
    pub fn set_row_rhs_inf(&mut self, row: usize, inf: bool) {
        if inf {
            self.rhs[row] = f64::INFINITY;
            self.row_flags[row].set(RowFlags::RHS_INF);
        } else {
            self.row_flags[row].unset(RowFlags::RHS_INF);
        }
    }

    /// All finite right-hand sides at once.
    pub fn set_row_rhs_all(&mut self, sides: Vec<f64>) {
        debug_assert_eq!(sides.len(), self.n_rows());
        for (row, &value) in sides.iter().enumerate() {
            self.set_row_rhs(row, value);
        }
    }

    /// All finite left-hand sides at once.
    pub fn set_row_lhs_all(&mut self, sides: Vec<f64>) {
        debug_assert_eq!(sides.len(), self.n_rows());
        for (row, &value) in sides.iter().enumerate() {
            self.set_row_lhs(row, value);
        }
    }

    /// Add one matrix entry. Duplicates are summed.
    pub fn add_entry(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows() && col < self.n_cols());
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Add many matrix entries.
    pub fn add_entry_all(&mut self, entries: impl IntoIterator<Item = (usize, usize, f64)>) {
        for (row, col, value) in entries {
            self.add_entry(row, col, value);
        }
    }

    /// Finalize into an immutable problem.
    pub fn build(mut self) -> Problem {
        let n_rows = self.n_rows();
        for i in 0..n_rows {
            let flags = &mut self.row_flags[i];
            if !flags.test(RowFlags::LHS_INF)
                && !flags.test(RowFlags::RHS_INF)
                && self.lhs[i] == self.rhs[i]
            {
                flags.set(RowFlags::EQUATION);
            }
        }
        for j in 0..self.n_cols() {
            let flags = &mut self.col_flags[j];
            if !flags.test(ColFlags::LB_INF)
                && !flags.test(ColFlags::UB_INF)
                && self.lower[j] == self.upper[j]
            {
                flags.set(ColFlags::FIXED);
            }
        }

        let matrix = ConstraintMatrix::from_triplets(
            n_rows,
            self.obj.len(),
            &self.entries,
            self.lhs,
            self.rhs,
            self.row_flags,
        );

        Problem::new(
            self.name,
            Objective {
                coefficients: self.obj,
                offset: self.obj_offset,
            },
            matrix,
            VariableDomains {
                lower: self.lower,
                upper: self.upper,
                flags: self.col_flags,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equation_flag_derivation() {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(2);
        builder.set_num_rows(2);
        builder.add_entry(0, 0, 1.0);
        builder.add_entry(1, 1, 1.0);
        builder.set_row_lhs(0, 1.0);
        builder.set_row_rhs(0, 1.0);
        builder.set_row_rhs(1, 5.0);

        let problem = builder.build();
        assert!(problem.matrix().row_flags()[0].test(RowFlags::EQUATION));
        assert!(!problem.matrix().row_flags()[1].test(RowFlags::EQUATION));
        assert!(problem.matrix().row_flags()[1].test(RowFlags::LHS_INF));
    }

    #[test]
    fn test_default_column_domain() {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(1);
        builder.set_num_rows(0);
        let problem = builder.build();

        assert_eq!(problem.lower_bounds()[0], 0.0);
        assert!(problem.col_flags()[0].test(ColFlags::UB_INF));
        assert!(!problem.col_flags()[0].test(ColFlags::LB_INF));
    }

    #[test]
    fn test_fixed_column_flag() {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(1);
        builder.set_num_rows(0);
        builder.set_col_lb(0, 2.0);
        builder.set_col_ub(0, 2.0);
        let problem = builder.build();
        assert!(problem.col_flags()[0].test(ColFlags::FIXED));
    }
}
