//! Constraint matrix with dual row/column orientation.

use sprs::{CsMat, TriMat};

use super::RowFlags;

/// Sparse row or column slice of the constraint matrix.
pub type SparseView<'a> = sprs::CsVecView<'a, f64>;

/// The constraint matrix `A` together with its row sides and flags.
///
/// `A` is kept in both CSR and CSC form so that row-major traversal
/// (residuals, activities) and column-major traversal (reduced costs,
/// propagation fan-out) are each a single cache-friendly sweep. Both copies
/// are built once and never mutated.
#[derive(Debug, Clone)]
pub struct ConstraintMatrix {
    by_row: CsMat<f64>,
    by_col: CsMat<f64>,
    lhs: Vec<f64>,
    rhs: Vec<f64>,
    flags: Vec<RowFlags>,
}

impl ConstraintMatrix {
    /// Assemble from triplets. Sides use `f64::INFINITY` sentinels matching
    /// the `LHS_INF`/`RHS_INF` flags.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        entries: &[(usize, usize, f64)],
        lhs: Vec<f64>,
        rhs: Vec<f64>,
        flags: Vec<RowFlags>,
    ) -> Self {
        debug_assert_eq!(lhs.len(), n_rows);
        debug_assert_eq!(rhs.len(), n_rows);
        debug_assert_eq!(flags.len(), n_rows);

        let mut tri = TriMat::new((n_rows, n_cols));
        for &(row, col, value) in entries {
            tri.add_triplet(row, col, value);
        }

        Self {
            by_row: tri.to_csr(),
            by_col: tri.to_csc(),
            lhs,
            rhs,
            flags,
        }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.by_row.rows()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.by_row.cols()
    }

    /// Number of stored nonzeros.
    pub fn nnz(&self) -> usize {
        self.by_row.nnz()
    }

    /// Sparse view of row `i`; iterate as `(col, &value)` pairs.
    pub fn row(&self, i: usize) -> SparseView<'_> {
        self.by_row.outer_view(i).unwrap()
    }

    /// Sparse view of column `j`; iterate as `(row, &value)` pairs.
    pub fn col(&self, j: usize) -> SparseView<'_> {
        self.by_col.outer_view(j).unwrap()
    }

    /// Left-hand sides.
    pub fn lhs(&self) -> &[f64] {
        &self.lhs
    }

    /// Right-hand sides.
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Row flags.
    pub fn row_flags(&self) -> &[RowFlags] {
        &self.flags
    }

    /// Mark a row redundant, excluding it from propagation and feasibility.
    pub(crate) fn set_row_redundant(&mut self, row: usize) {
        self.flags[row].set(RowFlags::REDUNDANT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_three() -> ConstraintMatrix {
        // row 0: x0 + 2 x1
        // row 1: 3 x1 + 4 x2
        ConstraintMatrix::from_triplets(
            2,
            3,
            &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0), (1, 2, 4.0)],
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
            vec![2.0, 3.0],
            vec![
                {
                    let mut f = RowFlags::default();
                    f.set(RowFlags::LHS_INF);
                    f
                };
                2
            ],
        )
    }

    #[test]
    fn test_row_and_col_views() {
        let matrix = two_by_three();
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.n_cols(), 3);
        assert_eq!(matrix.nnz(), 4);

        let row0: Vec<(usize, f64)> = matrix.row(0).iter().map(|(j, &v)| (j, v)).collect();
        assert_eq!(row0, vec![(0, 1.0), (1, 2.0)]);

        let col1: Vec<(usize, f64)> = matrix.col(1).iter().map(|(i, &v)| (i, v)).collect();
        assert_eq!(col1, vec![(0, 2.0), (1, 3.0)]);

        let col2: Vec<(usize, f64)> = matrix.col(2).iter().map(|(i, &v)| (i, v)).collect();
        assert_eq!(col2, vec![(1, 4.0)]);
    }

    #[test]
    fn test_duplicate_triplets_are_summed() {
        let matrix = ConstraintMatrix::from_triplets(
            1,
            1,
            &[(0, 0, 1.0), (0, 0, 2.0)],
            vec![3.0],
            vec![3.0],
            vec![RowFlags::default()],
        );
        let row0: Vec<f64> = matrix.row(0).iter().map(|(_, &v)| v).collect();
        assert_eq!(row0, vec![3.0]);
    }
}
