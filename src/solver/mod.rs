//! Krylov & direct solver interfaces for the implicit pressure system.

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::SolveStats;

/// Common interface for any direct or iterative pressure solver.
///
/// `x` carries the initial guess on input and the solution on output.
/// Non-convergence within the iteration cap is not an error: it comes back
/// as `converged: false` in the stats so the fallback chain can move on.
/// Errors are reserved for breakdowns that make the attempt meaningless.
pub trait LinearSolver: Send {
    fn solve(
        &mut self,
        a: &CsrMatrix,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, SolveError>;
}

pub mod cg;
pub use cg::CgSolver;

pub mod bicgstab;
pub use bicgstab::BiCgStabSolver;

pub mod gmres;
pub use gmres::GmresSolver;

pub mod direct_lu;
pub use direct_lu::LuSolver;

pub mod registry;
pub use registry::{ChainSolution, SolverHandle, SolverRegistry};
