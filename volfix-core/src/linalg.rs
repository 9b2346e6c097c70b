//! Sparse residual and affine operations.
//!
//! These are the handful of kernels the Volume Algorithm is assembled from.
//! All dense outputs are caller-owned slices; the functions only write.
//! Dot products and per-row accumulations use [`StableSum`] so results do
//! not depend on nonzero ordering beyond the compensated-summation bound.

use crate::num::StableSum;
use crate::problem::ConstraintMatrix;

/// Residual `out = b - A x`, one stable accumulation per row.
pub fn b_minus_ax(matrix: &ConstraintMatrix, x: &[f64], b: &[f64], out: &mut [f64]) {
    debug_assert_eq!(x.len(), matrix.n_cols());
    debug_assert_eq!(b.len(), matrix.n_rows());
    debug_assert_eq!(out.len(), matrix.n_rows());

    for i in 0..matrix.n_rows() {
        let mut sum = StableSum::new();
        sum.add(b[i]);
        for (j, &a) in matrix.row(i).iter() {
            sum.add(-a * x[j]);
        }
        out[i] = sum.get();
    }
}

/// Row-activity residual `out = A x - b`, one stable accumulation per row.
///
/// The sign convention complements [`b_minus_ax`]: this form reports how
/// far a point's row activities sit above their sides.
pub fn ax_minus_b(matrix: &ConstraintMatrix, x: &[f64], b: &[f64], out: &mut [f64]) {
    debug_assert_eq!(x.len(), matrix.n_cols());
    debug_assert_eq!(b.len(), matrix.n_rows());
    debug_assert_eq!(out.len(), matrix.n_rows());

    for i in 0..matrix.n_rows() {
        let mut sum = StableSum::new();
        sum.add(-b[i]);
        for (j, &a) in matrix.row(i).iter() {
            sum.add(a * x[j]);
        }
        out[i] = sum.get();
    }
}

/// Reduced-cost style `out = c - pi^T A`, one stable accumulation per
/// column.
pub fn b_minus_xa(matrix: &ConstraintMatrix, pi: &[f64], c: &[f64], out: &mut [f64]) {
    debug_assert_eq!(pi.len(), matrix.n_rows());
    debug_assert_eq!(c.len(), matrix.n_cols());
    debug_assert_eq!(out.len(), matrix.n_cols());

    for j in 0..matrix.n_cols() {
        let mut sum = StableSum::new();
        sum.add(c[j]);
        for (i, &a) in matrix.col(j).iter() {
            sum.add(-pi[i] * a);
        }
        out[j] = sum.get();
    }
}

/// Affine step `out = b + s * x`.
pub fn b_plus_sx(b: &[f64], s: f64, x: &[f64], out: &mut [f64]) {
    debug_assert_eq!(b.len(), x.len());
    debug_assert_eq!(b.len(), out.len());

    for i in 0..b.len() {
        out[i] = b[i] + s * x[i];
    }
}

/// Convex-combination style `out = q * b + s * x`; `out` may alias `x`.
pub fn qb_plus_sx(q: f64, b: &[f64], s: f64, x: &[f64], out: &mut [f64]) {
    debug_assert_eq!(b.len(), x.len());
    debug_assert_eq!(b.len(), out.len());

    for i in 0..b.len() {
        out[i] = q * b[i] + s * x[i];
    }
}

/// Dot product via stable summation.
pub fn multi(u: &[f64], v: &[f64]) -> f64 {
    debug_assert_eq!(u.len(), v.len());
    let mut sum = StableSum::new();
    for (a, b) in u.iter().zip(v) {
        sum.add(a * b);
    }
    sum.get()
}

/// L1 norm.
pub fn l1_norm(v: &[f64]) -> f64 {
    let mut sum = StableSum::new();
    for x in v {
        sum.add(x.abs());
    }
    sum.get()
}

/// L2 norm.
pub fn l2_norm(v: &[f64]) -> f64 {
    multi(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemBuilder;

    fn residual_matrix() -> ConstraintMatrix {
        // row 0: c0 + 2 c1
        // row 1: 3 c1 + 4 c2
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(3);
        builder.set_num_rows(2);
        builder.add_entry(0, 0, 1.0);
        builder.add_entry(0, 1, 2.0);
        builder.add_entry(1, 1, 3.0);
        builder.add_entry(1, 2, 4.0);
        builder.set_row_rhs(0, 2.0);
        builder.set_row_rhs(1, 3.0);
        builder.build().matrix().clone()
    }

    #[test]
    fn test_residual_is_exact() {
        let matrix = residual_matrix();
        let x = [2.0, 3.0, 3.0];
        let b = [1.0, 2.0];
        let mut out = [0.0; 2];

        // A x = (8, 21) exactly, under both sign conventions.
        ax_minus_b(&matrix, &x, &b, &mut out);
        assert_eq!(out, [7.0, 19.0]);

        b_minus_ax(&matrix, &x, &b, &mut out);
        assert_eq!(out, [-7.0, -19.0]);
    }

    #[test]
    fn test_reduced_costs() {
        let matrix = residual_matrix();
        let pi = [1.0, -1.0];
        let c = [1.0, 1.0, 1.0];
        let mut out = [0.0; 3];

        // pi^T A = (1, 2 - 3, -4) = (1, -1, -4)
        b_minus_xa(&matrix, &pi, &c, &mut out);
        assert_eq!(out, [0.0, 2.0, 5.0]);
    }

    #[test]
    fn test_affine_ops() {
        let b = [1.0, 2.0];
        let x = [10.0, -10.0];
        let mut out = [0.0; 2];

        b_plus_sx(&b, 0.5, &x, &mut out);
        assert_eq!(out, [6.0, -3.0]);

        qb_plus_sx(2.0, &b, 0.5, &x, &mut out);
        assert_eq!(out, [7.0, -1.0]);

        // out aliasing x is the smoothing update x_bar <- a x_t + (1-a) x_bar.
        let mut x_bar = [4.0, 8.0];
        let x_t = [0.0, 0.0];
        let tmp = x_bar;
        qb_plus_sx(0.25, &x_t, 0.75, &tmp, &mut x_bar);
        assert_eq!(x_bar, [3.0, 6.0]);
    }

    #[test]
    fn test_norms_and_dot() {
        let v = [3.0, -4.0];
        assert_eq!(l1_norm(&v), 7.0);
        assert_eq!(l2_norm(&v), 5.0);
        assert_eq!(multi(&v, &[1.0, 1.0]), -1.0);
    }
}
