//! Reversible bound-tightening overlay for diving.
//!
//! A [`ProbingView`] represents a partial assignment on top of an immutable
//! [`Problem`] by narrowing column domains. Fixings issued through
//! [`ProbingView::set_probing_column`] land on a trail; implied tightenings
//! found by [`ProbingView::propagate_domains`] are recorded as
//! [`BoundChange`]s carrying the propagating row and the decision depth.
//! Infeasibility is a latch, never an error: [`ProbingView::reset`] restores
//! the view to the base problem exactly.

use crate::num::Num;
use crate::problem::{ColFlags, Problem, RowFlags};

/// Upper bound on full propagation sweeps per `propagate_domains` call.
const MAX_SWEEPS: usize = 100;

/// A single variable assignment issued by a caller (a decision).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixing {
    /// Column being fixed.
    pub column: usize,

    /// Assigned value.
    pub value: f64,
}

/// One bound modification, kept for conflict extraction.
///
/// `reason_row` is `None` for decisions and carries the propagating row
/// otherwise. `depth` is the number of decisions taken when the change was
/// made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundChange {
    /// Column whose bound changed.
    pub column: usize,

    /// The new bound value.
    pub new_value: f64,

    /// Propagating row, or `None` for a decision fixing.
    pub reason_row: Option<usize>,

    /// Whether the lower bound changed.
    pub is_lower: bool,

    /// Whether the upper bound changed.
    pub is_upper: bool,

    /// Decision depth at the time of the change.
    pub depth: usize,
}

/// Mutable domain overlay over a shared problem.
pub struct ProbingView<'a> {
    problem: &'a Problem,
    num: Num,

    lower: Vec<f64>,
    upper: Vec<f64>,
    flags: Vec<ColFlags>,

    // Finite parts of the row activity bounds; infinite contributions are
    // counted separately so a single unbounded column can still be
    // propagated onto.
    min_activity: Vec<f64>,
    max_activity: Vec<f64>,
    ninf_min: Vec<u32>,
    ninf_max: Vec<u32>,

    base_min_activity: Vec<f64>,
    base_max_activity: Vec<f64>,
    base_ninf_min: Vec<u32>,
    base_ninf_max: Vec<u32>,

    fixings: Vec<Fixing>,
    bound_changes: Vec<BoundChange>,
    depth: usize,
    infeasible: bool,
}

impl<'a> ProbingView<'a> {
    /// Create a view over `problem` with all buffers allocated up front.
    pub fn new(problem: &'a Problem, num: Num) -> Self {
        let m = problem.n_rows();
        let mut view = Self {
            problem,
            num,
            lower: problem.lower_bounds().to_vec(),
            upper: problem.upper_bounds().to_vec(),
            flags: problem.col_flags().to_vec(),
            min_activity: vec![0.0; m],
            max_activity: vec![0.0; m],
            ninf_min: vec![0; m],
            ninf_max: vec![0; m],
            base_min_activity: vec![0.0; m],
            base_max_activity: vec![0.0; m],
            base_ninf_min: vec![0; m],
            base_ninf_max: vec![0; m],
            fixings: Vec::new(),
            bound_changes: Vec::new(),
            depth: 0,
            infeasible: false,
        };
        view.compute_base_activities();
        view
    }

    /// The underlying problem.
    pub fn problem(&self) -> &'a Problem {
        self.problem
    }

    /// Objective coefficients of the underlying problem.
    pub fn get_obj(&self) -> &'a [f64] {
        &self.problem.objective().coefficients
    }

    /// Discard all fixings and propagations; bounds and flags equal the base
    /// problem's again.
    pub fn reset(&mut self) {
        self.lower.copy_from_slice(self.problem.lower_bounds());
        self.upper.copy_from_slice(self.problem.upper_bounds());
        self.flags.copy_from_slice(self.problem.col_flags());
        self.min_activity.copy_from_slice(&self.base_min_activity);
        self.max_activity.copy_from_slice(&self.base_max_activity);
        self.ninf_min.copy_from_slice(&self.base_ninf_min);
        self.ninf_max.copy_from_slice(&self.base_ninf_max);
        self.fixings.clear();
        self.bound_changes.clear();
        self.depth = 0;
        self.infeasible = false;
    }

    /// Whether infeasibility has been detected since the last reset.
    pub fn is_infeasible(&self) -> bool {
        self.infeasible
    }

    /// Whether `value` lies within the current domain of `col`.
    pub fn is_within_bounds(&self, col: usize, value: f64) -> bool {
        self.num.is_ge(value, self.lower[col]) && self.num.is_le(value, self.upper[col])
    }

    /// Whether `col` must take an integral value.
    pub fn is_integer_variable(&self, col: usize) -> bool {
        self.flags[col].test(ColFlags::INTEGRAL)
    }

    /// Whether the current domain of `col` is a single point.
    pub fn is_fixed(&self, col: usize) -> bool {
        self.lower[col] == self.upper[col]
    }

    /// Decisions taken since the last reset, in order.
    pub fn get_fixings(&self) -> &[Fixing] {
        &self.fixings
    }

    /// All bound changes (decisions and propagations) since the last reset.
    pub fn bound_changes(&self) -> &[BoundChange] {
        &self.bound_changes
    }

    /// Current decision depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current lower bounds.
    pub fn probing_lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    /// Current upper bounds.
    pub fn probing_upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    /// Current column flags.
    pub fn probing_domain_flags(&self) -> &[ColFlags] {
        &self.flags
    }

    /// Fix `col` to `value`: append to the trail and narrow both bounds.
    ///
    /// The caller is expected to call [`Self::propagate_domains`] afterwards.
    /// A value outside the current domain latches infeasibility without
    /// touching the bounds, so the bookkeeping only ever sees tightenings.
    pub fn set_probing_column(&mut self, col: usize, value: f64) {
        debug_assert!(col < self.lower.len());

        self.depth += 1;
        self.fixings.push(Fixing { column: col, value });
        self.bound_changes.push(BoundChange {
            column: col,
            new_value: value,
            reason_row: None,
            is_lower: true,
            is_upper: true,
            depth: self.depth,
        });

        if !self.is_within_bounds(col, value) {
            log::debug!(
                "fixing col {} to {} contradicts domain [{}, {}]",
                col,
                value,
                self.lower[col],
                self.upper[col]
            );
            self.infeasible = true;
            return;
        }

        // Within tolerance the value may still sit a hair outside the raw
        // domain; clamp so bounds never invert.
        let value = value.clamp(self.lower[col], self.upper[col]);
        if value > self.lower[col] {
            self.apply_lower(col, value);
        }
        if value < self.upper[col] {
            self.apply_upper(col, value);
        }
        self.flags[col].set(ColFlags::FIXED);
    }

    /// Tighten column bounds implied by row activities to a fixed point.
    ///
    /// Rows are processed in index order; sweeps repeat until one makes no
    /// change or `MAX_SWEEPS` is hit. Tightenings below the feasibility
    /// tolerance are discarded. On an empty domain the view latches
    /// infeasible and propagation stops.
    pub fn propagate_domains(&mut self) {
        if self.infeasible {
            return;
        }

        for _ in 0..MAX_SWEEPS {
            let mut changed = false;
            for row in 0..self.problem.n_rows() {
                if self.problem.matrix().row_flags()[row].test(RowFlags::REDUNDANT) {
                    continue;
                }
                if !self.propagate_row(row, &mut changed) {
                    log::debug!("propagation detected infeasibility on row {row}");
                    self.infeasible = true;
                    return;
                }
            }
            if !changed {
                return;
            }
        }
    }

    fn compute_base_activities(&mut self) {
        let matrix = self.problem.matrix();
        for row in 0..matrix.n_rows() {
            let mut min_act = 0.0;
            let mut max_act = 0.0;
            let mut ninf_min = 0u32;
            let mut ninf_max = 0u32;
            for (col, &a) in matrix.row(row).iter() {
                let (towards_min, towards_max) = if a > 0.0 {
                    (self.lower[col], self.upper[col])
                } else {
                    (self.upper[col], self.lower[col])
                };
                if towards_min.is_finite() {
                    min_act += a * towards_min;
                } else {
                    ninf_min += 1;
                }
                if towards_max.is_finite() {
                    max_act += a * towards_max;
                } else {
                    ninf_max += 1;
                }
            }
            self.base_min_activity[row] = min_act;
            self.base_max_activity[row] = max_act;
            self.base_ninf_min[row] = ninf_min;
            self.base_ninf_max[row] = ninf_max;
        }
        self.min_activity.copy_from_slice(&self.base_min_activity);
        self.max_activity.copy_from_slice(&self.base_max_activity);
        self.ninf_min.copy_from_slice(&self.base_ninf_min);
        self.ninf_max.copy_from_slice(&self.base_ninf_max);
    }

    /// Raise the lower bound of `col` to `value`, updating row activities.
    fn apply_lower(&mut self, col: usize, value: f64) {
        debug_assert!(value.is_finite());
        let old = self.lower[col];
        debug_assert!(value > old);

        for (row, &a) in self.problem.matrix().col(col).iter() {
            if a > 0.0 {
                // lower bound feeds the minimum activity
                if old.is_finite() {
                    self.min_activity[row] += a * (value - old);
                } else {
                    self.ninf_min[row] -= 1;
                    self.min_activity[row] += a * value;
                }
            } else if old.is_finite() {
                self.max_activity[row] += a * (value - old);
            } else {
                self.ninf_max[row] -= 1;
                self.max_activity[row] += a * value;
            }
        }

        self.lower[col] = value;
        self.flags[col].unset(ColFlags::LB_INF);
    }

    /// Lower the upper bound of `col` to `value`, updating row activities.
    fn apply_upper(&mut self, col: usize, value: f64) {
        debug_assert!(value.is_finite());
        let old = self.upper[col];
        debug_assert!(value < old);

        for (row, &a) in self.problem.matrix().col(col).iter() {
            if a > 0.0 {
                if old.is_finite() {
                    self.max_activity[row] += a * (value - old);
                } else {
                    self.ninf_max[row] -= 1;
                    self.max_activity[row] += a * value;
                }
            } else if old.is_finite() {
                self.min_activity[row] += a * (value - old);
            } else {
                self.ninf_min[row] -= 1;
                self.min_activity[row] += a * value;
            }
        }

        self.upper[col] = value;
        self.flags[col].unset(ColFlags::UB_INF);
    }

    /// Minimum activity of `row` excluding the term of `col`, or `None` when
    /// it is unbounded below.
    fn residual_min_activity(&self, row: usize, col: usize, a: f64) -> Option<f64> {
        let towards_min = if a > 0.0 {
            self.lower[col]
        } else {
            self.upper[col]
        };
        if towards_min.is_finite() {
            (self.ninf_min[row] == 0).then(|| self.min_activity[row] - a * towards_min)
        } else {
            (self.ninf_min[row] == 1).then(|| self.min_activity[row])
        }
    }

    /// Maximum activity of `row` excluding the term of `col`, or `None` when
    /// it is unbounded above.
    fn residual_max_activity(&self, row: usize, col: usize, a: f64) -> Option<f64> {
        let towards_max = if a > 0.0 {
            self.upper[col]
        } else {
            self.lower[col]
        };
        if towards_max.is_finite() {
            (self.ninf_max[row] == 0).then(|| self.max_activity[row] - a * towards_max)
        } else {
            (self.ninf_max[row] == 1).then(|| self.max_activity[row])
        }
    }

    /// Propagate one row. Returns false when an empty domain or an
    /// unsatisfiable activity is found.
    fn propagate_row(&mut self, row: usize, changed: &mut bool) -> bool {
        let matrix = self.problem.matrix();
        let rflags = matrix.row_flags()[row];
        let has_lhs = !rflags.test(RowFlags::LHS_INF);
        let has_rhs = !rflags.test(RowFlags::RHS_INF);
        let lhs = matrix.lhs()[row];
        let rhs = matrix.rhs()[row];

        if has_rhs && self.ninf_min[row] == 0 && self.num.is_gt(self.min_activity[row], rhs) {
            return false;
        }
        if has_lhs && self.ninf_max[row] == 0 && self.num.is_lt(self.max_activity[row], lhs) {
            return false;
        }

        for (col, &a) in matrix.row(row).iter() {
            if self.is_fixed(col) {
                continue;
            }

            // a_j x_j <= rhs - (min activity of the rest)
            if has_rhs {
                if let Some(rest_min) = self.residual_min_activity(row, col, a) {
                    let limit = (rhs - rest_min) / a;
                    let ok = if a > 0.0 {
                        self.try_tighten_upper(col, limit, row, changed)
                    } else {
                        self.try_tighten_lower(col, limit, row, changed)
                    };
                    if !ok {
                        return false;
                    }
                }
            }

            // a_j x_j >= lhs - (max activity of the rest)
            if has_lhs {
                if let Some(rest_max) = self.residual_max_activity(row, col, a) {
                    let limit = (lhs - rest_max) / a;
                    let ok = if a > 0.0 {
                        self.try_tighten_lower(col, limit, row, changed)
                    } else {
                        self.try_tighten_upper(col, limit, row, changed)
                    };
                    if !ok {
                        return false;
                    }
                }
            }
        }

        true
    }

    fn try_tighten_upper(
        &mut self,
        col: usize,
        candidate: f64,
        reason_row: usize,
        changed: &mut bool,
    ) -> bool {
        let mut candidate = candidate;
        if self.flags[col].test(ColFlags::INTEGRAL) {
            candidate = self.num.feas_floor(candidate);
        }
        if self.num.is_huge(candidate) || candidate >= self.upper[col] - self.num.feas_tol {
            return true;
        }

        self.bound_changes.push(BoundChange {
            column: col,
            new_value: candidate,
            reason_row: Some(reason_row),
            is_lower: false,
            is_upper: true,
            depth: self.depth,
        });
        self.apply_upper(col, candidate);
        *changed = true;

        !self.num.is_lt(self.upper[col], self.lower[col])
    }

    fn try_tighten_lower(
        &mut self,
        col: usize,
        candidate: f64,
        reason_row: usize,
        changed: &mut bool,
    ) -> bool {
        let mut candidate = candidate;
        if self.flags[col].test(ColFlags::INTEGRAL) {
            candidate = self.num.feas_ceil(candidate);
        }
        if self.num.is_huge(candidate) || candidate <= self.lower[col] + self.num.feas_tol {
            return true;
        }

        self.bound_changes.push(BoundChange {
            column: col,
            new_value: candidate,
            reason_row: Some(reason_row),
            is_lower: true,
            is_upper: false,
            depth: self.depth,
        });
        self.apply_lower(col, candidate);
        *changed = true;

        !self.num.is_lt(self.upper[col], self.lower[col])
    }
}
