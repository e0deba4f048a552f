//! Preconditioned BiCGStab (Saad §7.4.2).
//!
//! Handles the nonsymmetric systems that upstream weighting or well terms
//! can produce, where CG is no longer applicable.

use crate::core::vecops::{dot, norm};
use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::{Convergence, SolveStats};

pub struct BiCgStabSolver {
    pub conv: Convergence<f64>,
}

impl BiCgStabSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { conv: Convergence::new(tol, max_iters) }
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

impl LinearSolver for BiCgStabSolver {
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
                "bicgstab: matrix is {}x{}, rhs has {} entries",
                a.nrows(),
                a.nrows(),
                n
            )));
        }

        // r0 = b - A x0, r_hat fixed as the shadow residual
        let mut r = vec![0.0; n];
        a.spmv(x, &mut r);
        for (ri, bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
        let r_hat = r.clone();

        let res0 = norm(&r);
        let (stop, mut stats) = self.conv.check(res0, res0, 0);
        if stop && stats.converged {
            return Ok(stats);
        }

        let mut rho_prev = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut p = vec![0.0; n];
        let mut v = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let mut t = vec![0.0; n];

        for i in 1..=self.conv.max_iters {
            let rho = dot(&r_hat, &r);
            if rho.abs() < f64::EPSILON * res0 * res0 {
                return Err(SolveError::Breakdown("rho vanished in bicgstab"));
            }
            if i == 1 {
                p.copy_from_slice(&r);
            } else {
                let beta = (rho / rho_prev) * (alpha / omega);
                for ((pj, rj), vj) in p.iter_mut().zip(&r).zip(&v) {
                    *pj = *rj + beta * (*pj - omega * *vj);
                }
            }
            precondition(pc, &p, &mut p_hat)?;
            a.spmv(&p_hat, &mut v);
            let denom = dot(&r_hat, &v);
            if denom.abs() < f64::EPSILON {
                return Err(SolveError::Breakdown("r_hat orthogonal to v in bicgstab"));
            }
            alpha = rho / denom;

            // s = r - alpha v (reuse r as s)
            for (rj, vj) in r.iter_mut().zip(&v) {
                *rj -= alpha * *vj;
            }
            let s_norm = norm(&r);
            let (stop, s_stats) = self.conv.check(s_norm, res0, i);
            if stop && s_stats.converged {
                for (xj, pj) in x.iter_mut().zip(&p_hat) {
                    *xj += alpha * *pj;
                }
                return Ok(s_stats);
            }

            precondition(pc, &r, &mut s_hat)?;
            a.spmv(&s_hat, &mut t);
            let tt = dot(&t, &t);
            if tt.abs() < f64::EPSILON {
                return Err(SolveError::Breakdown("t vanished in bicgstab"));
            }
            omega = dot(&t, &r) / tt;
            if omega.abs() < f64::EPSILON {
                return Err(SolveError::Breakdown("omega vanished in bicgstab"));
            }

            for ((xj, pj), sj) in x.iter_mut().zip(&p_hat).zip(&s_hat) {
                *xj += alpha * *pj + omega * *sj;
            }
            // r = s - omega t
            for (rj, tj) in r.iter_mut().zip(&t) {
                *rj -= omega * *tj;
            }

            let res_norm = norm(&r);
            let (stop, s) = self.conv.check(res_norm, res0, i);
            stats = s;
            if stop {
                return Ok(stats);
            }
            rho_prev = rho;
        }
        Ok(stats)
    }
}
