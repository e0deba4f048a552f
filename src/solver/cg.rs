//! Preconditioned Conjugate Gradient (Saad §9.2).
//!
//! The workhorse for the assembled pressure systems, which are symmetric
//! positive definite for well-behaved property grids. Falls back to plain CG
//! when no preconditioner is supplied.

use crate::core::vecops::{axpy, dot, norm};
use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::{Convergence, SolveStats};

pub struct CgSolver {
    pub conv: Convergence<f64>,
}

impl CgSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { conv: Convergence::new(tol, max_iters) }
    }
}

impl LinearSolver for CgSolver {
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
                "cg: matrix is {}x{}, rhs has {} entries",
                a.nrows(),
                a.nrows(),
                n
            )));
        }

        // r = b - A x
        let mut r = vec![0.0; n];
        a.spmv(x, &mut r);
        for (ri, bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }

        let mut z = vec![0.0; n];
        match pc {
            Some(m) => m.apply(&r, &mut z)?,
            None => z.copy_from_slice(&r),
        }
        let mut p = z.clone();
        let mut rz = dot(&r, &z);
        let res0 = norm(&r);

        let (stop, mut stats) = self.conv.check(res0, res0, 0);
        if stop && stats.converged {
            return Ok(stats);
        }

        let mut ap = vec![0.0; n];
        for i in 1..=self.conv.max_iters {
            a.spmv(&p, &mut ap);
            let pap = dot(&p, &ap);
            if pap <= 0.0 {
                // p^T A p <= 0: the matrix is not SPD from where CG stands.
                return Err(SolveError::Breakdown("indefinite matrix in cg"));
            }
            let alpha = rz / pap;
            axpy(alpha, &p, x);
            axpy(-alpha, &ap, &mut r);

            let res_norm = norm(&r);
            let (stop, s) = self.conv.check(res_norm, res0, i);
            stats = s;
            if stop {
                return Ok(stats);
            }

            match pc {
                Some(m) => m.apply(&r, &mut z)?,
                None => z.copy_from_slice(&r),
            }
            let rz_new = dot(&r, &z);
            if rz_new < 0.0 {
                return Err(SolveError::Breakdown("indefinite preconditioner in cg"));
            }
            let beta = rz_new / rz;
            for (pj, zj) in p.iter_mut().zip(&z) {
                *pj = *zj + beta * *pj;
            }
            rz = rz_new;
        }
        Ok(stats)
    }
}
