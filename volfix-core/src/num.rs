//! Tolerance-aware floating point comparisons and stable summation.
//!
//! Every equality or ordering decision in the engine goes through a [`Num`]
//! value so that the feasibility and zero tolerances are applied uniformly.
//! `Num` is a plain `Copy` value; callers pass it down explicitly instead of
//! consulting a global.

/// Numeric kernel carrying the engine's tolerances.
#[derive(Debug, Clone, Copy)]
pub struct Num {
    /// Feasibility tolerance: bounds and activities closer than this are
    /// considered equal.
    pub feas_tol: f64,

    /// Zero tolerance for coefficients and residuals.
    pub eps: f64,

    /// Values beyond this magnitude are treated as infinite.
    pub huge: f64,
}

impl Default for Num {
    fn default() -> Self {
        Self {
            feas_tol: 1e-6,
            eps: 1e-9,
            huge: 1e30,
        }
    }
}

impl Num {
    /// Create a kernel with explicit tolerances.
    pub fn new(feas_tol: f64, eps: f64) -> Self {
        Self {
            feas_tol,
            eps,
            ..Self::default()
        }
    }

    /// |a| <= eps
    pub fn is_zero(self, a: f64) -> bool {
        a.abs() <= self.eps
    }

    /// |a - b| <= feas_tol
    pub fn is_eq(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.feas_tol
    }

    /// a < b - feas_tol
    pub fn is_lt(self, a: f64, b: f64) -> bool {
        a < b - self.feas_tol
    }

    /// a <= b + feas_tol
    pub fn is_le(self, a: f64, b: f64) -> bool {
        a <= b + self.feas_tol
    }

    /// a > b + feas_tol
    pub fn is_gt(self, a: f64, b: f64) -> bool {
        a > b + self.feas_tol
    }

    /// a >= b - feas_tol
    pub fn is_ge(self, a: f64, b: f64) -> bool {
        a >= b - self.feas_tol
    }

    /// Whether `a` is within the feasibility tolerance of an integer.
    pub fn is_integral(self, a: f64) -> bool {
        self.is_eq(a, a.round())
    }

    /// Whether `a` should be treated as unbounded.
    pub fn is_huge(self, a: f64) -> bool {
        !a.is_finite() || a.abs() >= self.huge
    }

    /// Round to the nearest integer.
    pub fn round(self, a: f64) -> f64 {
        a.round()
    }

    /// Largest integer not exceeding `a` by more than the feasibility
    /// tolerance.
    pub fn feas_floor(self, a: f64) -> f64 {
        (a + self.feas_tol).floor()
    }

    /// Smallest integer not below `a` by more than the feasibility
    /// tolerance.
    pub fn feas_ceil(self, a: f64) -> f64 {
        (a - self.feas_tol).ceil()
    }

    /// Tolerance-free minimum.
    pub fn min(self, a: f64, b: f64) -> f64 {
        a.min(b)
    }

    /// Tolerance-free maximum.
    pub fn max(self, a: f64, b: f64) -> f64 {
        a.max(b)
    }
}

/// Compensated (Neumaier) summation accumulator.
///
/// Adding terms in any order yields the same result up to
/// `eps * sum(|x_i|)`, which is what makes objective evaluations comparable
/// across strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StableSum {
    sum: f64,
    correction: f64,
}

impl StableSum {
    /// Fresh accumulator at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one term.
    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.correction += (self.sum - t) + value;
        } else {
            self.correction += (value - t) + self.sum;
        }
        self.sum = t;
    }

    /// The compensated total.
    pub fn get(self) -> f64 {
        self.sum + self.correction
    }
}
