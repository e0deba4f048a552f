//! Convergence tracking & tolerance checks for iterative solvers.

/// Stopping criteria for an iterative solve.
///
/// Convergence is declared when the residual drops below `tol` relative to
/// the initial residual, or below `abs_floor` absolutely (so a zero or
/// near-zero right-hand side terminates cleanly instead of dividing by a
/// vanishing reference norm).
pub struct Convergence<T> {
    pub tol: T,
    pub abs_floor: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { tol, abs_floor: T::epsilon(), max_iters }
    }

    /// Returns (should_stop, stats) given current `res_norm` and iteration `i`.
    pub fn check(&self, res_norm: T, res0_norm: T, i: usize) -> (bool, SolveStats<T>) {
        let converged = res_norm <= self.abs_floor
            || (res0_norm > T::zero() && res_norm / res0_norm <= self.tol);
        let stop = converged || i >= self.max_iters;
        (
            stop,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}
