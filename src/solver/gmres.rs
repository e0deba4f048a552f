//! Restarted GMRES with left preconditioning (Saad §6.4).
//!
//! Modified Gram-Schmidt orthogonalization, Givens rotations for the
//! least-squares update, happy-breakdown detection. The restart length
//! bounds the Arnoldi basis memory on large grids.

use crate::core::vecops::{dot, norm};
use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::{Convergence, SolveStats};

pub struct GmresSolver {
    pub conv: Convergence<f64>,
    pub restart: usize,
}

impl GmresSolver {
    pub fn new(restart: usize, tol: f64, max_iters: usize) -> Self {
        Self { conv: Convergence::new(tol, max_iters), restart }
    }
}

fn precondition(pc: Option<&dyn Preconditioner>, r: &[f64], z: &mut [f64]) -> Result<(), SolveError> {
    match pc {
        Some(m) => m.apply(r, z),
        None => {
            z.copy_from_slice(r);
            Ok(())
        }
    }
}

impl LinearSolver for GmresSolver {
    fn solve(
        &mut self,
        a: &CsrMatrix,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, SolveError> {
        let n = b.len();
        if a.nrows() != n || x.len() != n {
            return Err(SolveError::Dimension(format!(
                "gmres: matrix is {}x{}, rhs has {} entries",
                a.nrows(),
                a.nrows(),
                n
            )));
        }
        let m = self.restart.max(1).min(n.max(1));

        // Reference residual for the relative test is the preconditioned
        // initial residual, consistent with left preconditioning.
        let mut raw = vec![0.0; n];
        a.spmv(x, &mut raw);
        for (ri, bi) in raw.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
        let mut r = vec![0.0; n];
        precondition(pc, &raw, &mut r)?;
        let res0 = norm(&r);

        let (stop, mut stats) = self.conv.check(res0, res0, 0);
        if stop && stats.converged {
            return Ok(stats);
        }

        let mut total_iters = 0;
        let mut w_raw = vec![0.0; n];
        let mut w = vec![0.0; n];

        'outer: while total_iters < self.conv.max_iters {
            // Arnoldi basis and Hessenberg in column-major (h[j] is column j).
            let beta = norm(&r);
            if beta == 0.0 {
                stats = SolveStats { iterations: total_iters, final_residual: 0.0, converged: true };
                break;
            }
            let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
            v.push(r.iter().map(|ri| ri / beta).collect());
            let mut h: Vec<Vec<f64>> = Vec::with_capacity(m);
            let mut cs = Vec::with_capacity(m);
            let mut sn: Vec<f64> = Vec::with_capacity(m);
            let mut g = vec![0.0; m + 1];
            g[0] = beta;

            let mut k_used = 0;
            for j in 0..m {
                if total_iters >= self.conv.max_iters {
                    break;
                }
                total_iters += 1;

                a.spmv(&v[j], &mut w_raw);
                precondition(pc, &w_raw, &mut w)?;

                // Modified Gram-Schmidt
                let mut hj = vec![0.0; j + 2];
                for (i, vi) in v.iter().enumerate().take(j + 1) {
                    let hij = dot(&w, vi);
                    hj[i] = hij;
                    for (wk, vk) in w.iter_mut().zip(vi) {
                        *wk -= hij * *vk;
                    }
                }
                let h_next = norm(&w);
                hj[j + 1] = h_next;

                // Apply accumulated Givens rotations to the new column.
                for i in 0..j {
                    let tmp = cs[i] * hj[i] + sn[i] * hj[i + 1];
                    hj[i + 1] = -sn[i] * hj[i] + cs[i] * hj[i + 1];
                    hj[i] = tmp;
                }
                let denom = (hj[j] * hj[j] + hj[j + 1] * hj[j + 1]).sqrt();
                if denom == 0.0 {
                    return Err(SolveError::Breakdown("degenerate rotation in gmres"));
                }
                cs.push(hj[j] / denom);
                sn.push(hj[j + 1] / denom);
                hj[j] = denom;
                hj[j + 1] = 0.0;
                g[j + 1] = -sn[j] * g[j];
                g[j] *= cs[j];
                h.push(hj);
                k_used = j + 1;

                let res_est = g[j + 1].abs();
                let (stop, s) = self.conv.check(res_est, res0, total_iters);
                stats = s;
                if (stop && stats.converged) || h_next == 0.0 {
                    // Happy breakdown lands here with res_est ~ 0.
                    break;
                }
                v.push(w.iter().map(|wi| wi / h_next).collect());
            }

            // Back-substitute y from the triangularized H and update x.
            let mut y = vec![0.0; k_used];
            for i in (0..k_used).rev() {
                let mut sum = g[i];
                for j in (i + 1)..k_used {
                    sum -= h[j][i] * y[j];
                }
                let hii = h[i][i];
                if hii == 0.0 {
                    return Err(SolveError::ZeroPivot(i));
                }
                y[i] = sum / hii;
            }
            for (j, yj) in y.iter().enumerate() {
                for (xi, vij) in x.iter_mut().zip(&v[j]) {
                    *xi += yj * *vij;
                }
            }

            if stats.converged {
                break 'outer;
            }

            // Restart from the true residual.
            a.spmv(x, &mut raw);
            for (ri, bi) in raw.iter_mut().zip(b) {
                *ri = bi - *ri;
            }
            precondition(pc, &raw, &mut r)?;
            let res_norm = norm(&r);
            let (stop, s) = self.conv.check(res_norm, res0, total_iters);
            stats = s;
            if stop {
                break;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;
    use crate::preconditioner::Jacobi;
    use approx::assert_abs_diff_eq;

    fn nonsym_4x4() -> (CsrMatrix, Vec<f64>, Vec<f64>) {
        let a = CsrMatrix::from_triplets(
            4,
            &[
                (0, 0, 5.0), (0, 1, 1.0), (0, 3, 2.0),
                (1, 0, 1.0), (1, 1, 6.0), (1, 2, 2.0),
                (2, 1, 3.0), (2, 2, 7.0), (2, 3, 1.0),
                (3, 0, 2.0), (3, 2, 1.0), (3, 3, 8.0),
            ],
        );
        let x_true = vec![1.0, -2.0, 3.0, -4.0];
        let mut b = vec![0.0; 4];
        a.spmv(&x_true, &mut b);
        (a, b, x_true)
    }

    #[test]
    fn gmres_solves_nonsymmetric() {
        let (a, b, x_true) = nonsym_4x4();
        let mut x = vec![0.0; 4];
        let mut solver = GmresSolver::new(4, 1e-12, 200);
        let stats = solver.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.converged, "GMRES did not converge: {stats:?}");
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(xi, ei, epsilon = 1e-8);
        }
    }

    #[test]
    fn restarted_gmres_converges_with_short_basis() {
        let (a, b, x_true) = nonsym_4x4();
        let mut x = vec![0.0; 4];
        let mut solver = GmresSolver::new(2, 1e-10, 500);
        let stats = solver.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.converged);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(xi, ei, epsilon = 1e-6);
        }
    }

    #[test]
    fn left_preconditioned_gmres_converges() {
        let (a, b, x_true) = nonsym_4x4();
        let pc = Jacobi::from_matrix(&a).unwrap();
        let mut x = vec![0.0; 4];
        let mut solver = GmresSolver::new(4, 1e-12, 200);
        let stats = solver.solve(&a, Some(&pc), &b, &mut x).unwrap();
        assert!(stats.converged);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(xi, ei, epsilon = 1e-8);
        }
    }
}
