//! ILU(0) factorization with zero fill (Saad §10.3), in the CSR pattern.

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;

/// Incomplete LU with zero fill-in.
///
/// The factors share the sparsity pattern of `A`: the factorization walks
/// each row, eliminating against earlier rows but only updating entries that
/// already exist in the pattern. Stored as a single combined CSR (strict
/// lower part = L without its unit diagonal, diagonal + upper part = U).
pub struct Ilu0 {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    factors: Vec<f64>,
    /// Position of the diagonal entry in each row of the combined factor.
    diag_ptr: Vec<usize>,
}

impl Ilu0 {
    pub fn from_matrix(a: &CsrMatrix) -> Result<Self, SolveError> {
        let n = a.nrows();
        let row_ptr = a.row_ptr().to_vec();
        let col_idx = a.col_idx().to_vec();
        let mut factors = a.values().to_vec();

        // Rows must be sorted by column for the merge below; CsrMatrix
        // constructors guarantee this.
        let mut diag_ptr = vec![usize::MAX; n];
        for i in 0..n {
            for k in row_ptr[i]..row_ptr[i + 1] {
                if col_idx[k] == i {
                    diag_ptr[i] = k;
                    break;
                }
            }
            if diag_ptr[i] == usize::MAX {
                return Err(SolveError::ZeroPivot(i));
            }
        }

        // IKJ variant restricted to the existing pattern.
        for i in 1..n {
            for kk in row_ptr[i]..row_ptr[i + 1] {
                let k = col_idx[kk];
                if k >= i {
                    break;
                }
                let pivot = factors[diag_ptr[k]];
                if pivot == 0.0 {
                    return Err(SolveError::ZeroPivot(k));
                }
                let lik = factors[kk] / pivot;
                factors[kk] = lik;
                // row_i ← row_i − lik · row_k, only where row_i has a slot
                for kj in (diag_ptr[k] + 1)..row_ptr[k + 1] {
                    let j = col_idx[kj];
                    if let Some(pos) = Self::find(&col_idx, &row_ptr, i, j) {
                        factors[pos] -= lik * factors[kj];
                    }
                }
            }
            if factors[diag_ptr[i]] == 0.0 {
                return Err(SolveError::ZeroPivot(i));
            }
        }

        Ok(Self { n, row_ptr, col_idx, factors, diag_ptr })
    }

    /// Binary search for column `j` within row `i`.
    fn find(col_idx: &[usize], row_ptr: &[usize], i: usize, j: usize) -> Option<usize> {
        let row = &col_idx[row_ptr[i]..row_ptr[i + 1]];
        row.binary_search(&j).ok().map(|p| row_ptr[i] + p)
    }
}

impl Preconditioner for Ilu0 {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), SolveError> {
        if r.len() != self.n {
            return Err(SolveError::Dimension(format!(
                "ilu0 built for n = {}, applied to n = {}",
                self.n,
                r.len()
            )));
        }
        // Forward solve L y = r (unit diagonal)
        z.copy_from_slice(r);
        for i in 0..self.n {
            for k in self.row_ptr[i]..self.diag_ptr[i] {
                z[i] -= self.factors[k] * z[self.col_idx[k]];
            }
        }
        // Backward solve U z = y
        for i in (0..self.n).rev() {
            for k in (self.diag_ptr[i] + 1)..self.row_ptr[i + 1] {
                z[i] -= self.factors[k] * z[self.col_idx[k]];
            }
            z[i] /= self.factors[self.diag_ptr[i]];
        }
        Ok(())
    }
}
