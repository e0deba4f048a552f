//! Dense direct fallback using Faer's full-pivoting LU.
//!
//! Densifying a reservoir pressure system is only viable for small grids,
//! which is exactly when it earns its place: as the last entry of a fallback
//! chain it turns "iterative solvers all stalled" into a solved step instead
//! of a rejected one.

use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::SolveStats;

pub struct LuSolver {
    /// Refuse to densify systems beyond this many rows.
    pub max_dense_rows: usize,
}

impl LuSolver {
    pub fn new() -> Self {
        Self { max_dense_rows: 4096 }
    }
}

impl Default for LuSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSolver for LuSolver {
    fn solve(
        &mut self,
        a: &CsrMatrix,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, SolveError> {
        let _ = pc; // Direct solver does not use a preconditioner
        let n = b.len();
        if a.nrows() != n || x.len() != n {
            return Err(SolveError::Dimension(format!(
                "lu: matrix is {}x{}, rhs has {} entries",
                a.nrows(),
                a.nrows(),
                n
            )));
        }
        if n > self.max_dense_rows {
            return Err(SolveError::Dimension(format!(
                "lu: refusing to densify {n} rows (cap {})",
                self.max_dense_rows
            )));
        }

        let dense = a.to_dense();
        let factor = FullPivLu::new(dense.as_ref());
        x.copy_from_slice(b);
        let x_mat = MatMut::from_column_major_slice_mut(x, n, 1);
        factor.solve_in_place_with_conj(Conj::No, x_mat);

        // Residual check: a numerically singular system "solves" into junk,
        // and that must count as non-convergence, not success.
        let mut ax = vec![0.0; n];
        a.spmv(x, &mut ax);
        let res: f64 = ax
            .iter()
            .zip(b)
            .map(|(axi, bi)| (bi - axi) * (bi - axi))
            .sum::<f64>()
            .sqrt();
        let bnorm: f64 = b.iter().map(|bi| bi * bi).sum::<f64>().sqrt();
        let converged = res.is_finite() && res <= 1e-8 * bnorm.max(1.0);

        Ok(SolveStats { iterations: 1, final_residual: res, converged })
    }
}
