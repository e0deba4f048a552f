//! CSR matrix storage and kernels.
//!
//! The assembled implicit pressure system arrives here as a compressed
//! sparse row matrix. The iterative solvers only need `spmv` and the
//! diagonal; the dense direct fallback converts to a `faer::Mat` once and
//! factorizes that.

use faer::Mat;

/// Square sparse matrix in compressed sparse row form.
#[derive(Clone, Debug)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build from raw CSR arrays. Structure errors are programming errors in
    /// the assembling collaborator, so they panic rather than propagate.
    pub fn from_csr(n: usize, row_ptr: Vec<usize>, col_idx: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(row_ptr.len(), n + 1, "row_ptr must have n + 1 entries");
        assert_eq!(col_idx.len(), values.len(), "col_idx and values must match");
        assert_eq!(*row_ptr.last().unwrap(), values.len(), "row_ptr must end at nnz");
        assert!(col_idx.iter().all(|&j| j < n), "column index out of range");
        Self { n, row_ptr, col_idx, values }
    }

    /// Build from (row, col, value) triplets; duplicate entries are summed.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(i, j, v) in triplets {
            assert!(i < n && j < n, "triplet index out of range");
            match rows[i].iter_mut().find(|(c, _)| *c == j) {
                Some((_, acc)) => *acc += v,
                None => rows[i].push((j, v)),
            }
        }
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for mut row in rows {
            row.sort_by_key(|(c, _)| *c);
            for (c, v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        Self { n, row_ptr, col_idx, values }
    }

    pub fn nrows(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Compute `y = A x`.
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n, "input vector has incorrect length");
        assert_eq!(y.len(), self.n, "output vector has incorrect length");
        for i in 0..self.n {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }
    }

    /// Diagonal entries; structurally missing diagonals read as zero.
    pub fn diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0; self.n];
        for i in 0..self.n {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    diag[i] = self.values[k];
                    break;
                }
            }
        }
        diag
    }

    /// Cheap summary statistic of the stored coefficients: the mean absolute
    /// value over all nonzeros. Used by the preconditioner cache to detect
    /// how much the system has changed between steps without touching the
    /// full matrix structure.
    pub fn fingerprint(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().map(|v| v.abs()).sum();
        sum / self.values.len() as f64
    }

    /// Densify for the direct LU fallback.
    pub fn to_dense(&self) -> Mat<f64> {
        let mut m = Mat::zeros(self.n, self.n);
        for i in 0..self.n {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                m[(i, self.col_idx[k])] = self.values[k];
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_spmv() {
        // 3×3 identity in CSR: row_ptr=[0,1,2,3], col_idx=[0,1,2], vals=[1,1,1]
        let m = CsrMatrix::from_csr(3, vec![0, 1, 2, 3], vec![0, 1, 2], vec![1.0, 1.0, 1.0]);
        let x = vec![2.0, 3.0, 5.0];
        let mut y = vec![0.0; 3];
        m.spmv(&x, &mut y);
        assert_eq!(y, x);
    }

    #[test]
    fn triplets_sum_duplicates_and_sort() {
        let m = CsrMatrix::from_triplets(2, &[(0, 1, 2.0), (0, 0, 1.0), (0, 1, 3.0), (1, 1, 4.0)]);
        assert_eq!(m.nnz(), 3);
        let x = vec![1.0, 1.0];
        let mut y = vec![0.0; 2];
        m.spmv(&x, &mut y);
        assert_eq!(y, vec![6.0, 4.0]);
    }

    #[test]
    fn diagonal_reads_missing_as_zero() {
        let m = CsrMatrix::from_triplets(3, &[(0, 0, 2.0), (1, 2, 5.0), (2, 2, 7.0)]);
        assert_eq!(m.diagonal(), vec![2.0, 0.0, 7.0]);
    }

    #[test]
    fn fingerprint_is_mean_abs_value() {
        let m = CsrMatrix::from_triplets(2, &[(0, 0, 3.0), (1, 1, -1.0)]);
        assert_eq!(m.fingerprint(), 2.0);
    }

    #[test]
    fn dense_round_trip_matches_spmv() {
        let m = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0)]);
        let d = m.to_dense();
        let x = vec![1.0, -1.0];
        let mut y = vec![0.0; 2];
        m.spmv(&x, &mut y);
        for i in 0..2 {
            let dense_yi = d[(i, 0)] * x[0] + d[(i, 1)] * x[1];
            assert_eq!(y[i], dense_yi);
        }
    }
}
