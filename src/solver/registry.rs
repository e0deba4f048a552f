//! Named solver strategies and fallback-chain execution.
//!
//! The registry maps solver names to factories and is constructed once at
//! startup; the engine resolves its configured [`SolverHandle`] against it a
//! single time per run, then drives the resolved chain every step. A chain
//! is tried strictly in order: the first entry to converge wins, and the
//! winner's name is recorded in the step diagnostics.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::SolveOptions;
use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::registry::PcFactory;
use crate::solver::{BiCgStabSolver, CgSolver, GmresSolver, LinearSolver, LuSolver};
use crate::utils::convergence::SolveStats;

/// Ordered list of solver names plus an optional preconditioner name,
/// supplied by configuration once per run.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct SolverHandle {
    pub chain: Vec<String>,
    pub preconditioner: Option<String>,
}

impl Default for SolverHandle {
    fn default() -> Self {
        Self { chain: vec!["cg".into(), "bicgstab".into()], preconditioner: Some("jacobi".into()) }
    }
}

/// Per-entry record of a chain attempt, kept for diagnostics when the whole
/// chain is exhausted.
#[derive(Clone, Debug)]
pub struct ChainAttempt {
    pub solver: String,
    pub iterations: usize,
    pub final_residual: f64,
    /// Breakdown or preconditioner-build message, if the entry failed
    /// outright rather than merely not converging.
    pub error: Option<String>,
}

/// Successful chain outcome: which entry converged and its stats.
#[derive(Clone, Debug)]
pub struct ChainSolution {
    pub solver: String,
    pub stats: SolveStats<f64>,
}

type SolverFactory = Box<dyn Fn(&SolveOptions) -> Box<dyn LinearSolver> + Send>;

/// Name → factory map for solver strategies.
pub struct SolverRegistry {
    factories: HashMap<String, SolverFactory>,
}

impl SolverRegistry {
    /// Registry with the built-ins: `"cg"`, `"bicgstab"`, `"gmres"`, `"lu"`.
    pub fn with_builtins() -> Self {
        let mut reg = Self { factories: HashMap::new() };
        reg.register("cg", |o| Box::new(CgSolver::new(o.tolerance, o.max_iterations)));
        reg.register("bicgstab", |o| Box::new(BiCgStabSolver::new(o.tolerance, o.max_iterations)));
        reg.register("gmres", |o| Box::new(GmresSolver::new(o.restart, o.tolerance, o.max_iterations)));
        reg.register("lu", |_| Box::new(LuSolver::new()));
        reg
    }

    /// Register a named factory, replacing any previous binding.
    pub fn register<F>(&mut self, name: &str, make: F)
    where
        F: Fn(&SolveOptions) -> Box<dyn LinearSolver> + Send + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(make));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve a handle into ready-to-run solver instances, in chain order.
    /// Unknown names fail here, at startup, not mid-run.
    pub fn resolve(
        &self,
        handle: &SolverHandle,
        opts: &SolveOptions,
    ) -> Result<ResolvedChain, String> {
        if handle.chain.is_empty() {
            return Err("solver chain is empty".to_string());
        }
        let mut entries = Vec::with_capacity(handle.chain.len());
        for name in &handle.chain {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| format!("unknown solver {name:?} in chain"))?;
            entries.push((name.clone(), factory(opts)));
        }
        Ok(ResolvedChain { entries })
    }
}

/// A resolved fallback chain, owned by the engine for the whole run.
pub struct ResolvedChain {
    entries: Vec<(String, Box<dyn LinearSolver>)>,
}

impl ResolvedChain {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Try each entry in order on `A x = b`.
    ///
    /// Every entry starts from the same initial guess: a failed attempt's
    /// partial iterate is discarded so no earlier solver's state leaks into
    /// the result. A preconditioner-build failure counts as that entry's
    /// non-convergence; the cache is invalidated so the next entry forces a
    /// rebuild, and the chain moves on.
    pub fn solve(
        &mut self,
        a: &CsrMatrix,
        mut pc_factory: Option<&mut (dyn PcFactory + 'static)>,
        b: &[f64],
        x0: &[f64],
        x: &mut [f64],
    ) -> Result<ChainSolution, Vec<ChainAttempt>> {
        let mut attempts = Vec::with_capacity(self.entries.len());
        for (name, solver) in &mut self.entries {
            let pc = match pc_factory.as_deref_mut() {
                Some(factory) => match factory.build(a) {
                    Ok(pc) => Some(pc),
                    Err(err) => {
                        warn!("chain entry {name:?}: preconditioner build failed: {err}");
                        factory.invalidate();
                        attempts.push(ChainAttempt {
                            solver: name.clone(),
                            iterations: 0,
                            final_residual: f64::NAN,
                            error: Some(err.to_string()),
                        });
                        continue;
                    }
                },
                None => None,
            };
            x.copy_from_slice(x0);
            match solver.solve(a, pc.as_deref(), b, x) {
                Ok(stats) if stats.converged => {
                    debug!("chain entry {name:?} converged in {} iterations", stats.iterations);
                    return Ok(ChainSolution { solver: name.clone(), stats });
                }
                Ok(stats) => {
                    debug!(
                        "chain entry {name:?} did not converge ({} iterations, residual {:.3e})",
                        stats.iterations, stats.final_residual
                    );
                    attempts.push(ChainAttempt {
                        solver: name.clone(),
                        iterations: stats.iterations,
                        final_residual: stats.final_residual,
                        error: None,
                    });
                }
                Err(err) => {
                    debug!("chain entry {name:?} failed: {err}");
                    attempts.push(ChainAttempt {
                        solver: name.clone(),
                        iterations: 0,
                        final_residual: f64::NAN,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        // Chain exhausted: leave x as the untouched initial guess.
        x.copy_from_slice(x0);
        Err(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolveOptions;
    use crate::matrix::CsrMatrix;

    fn spd_2x2() -> (CsrMatrix, Vec<f64>) {
        let a = CsrMatrix::from_triplets(2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        (a, vec![1.0, 2.0])
    }

    #[test]
    fn builtins_resolve_in_chain_order() {
        let reg = SolverRegistry::with_builtins();
        let handle = SolverHandle {
            chain: vec!["gmres".into(), "lu".into()],
            preconditioner: None,
        };
        let chain = reg.resolve(&handle, &SolveOptions::default()).unwrap();
        let names: Vec<_> = chain.names().collect();
        assert_eq!(names, vec!["gmres", "lu"]);
    }

    #[test]
    fn unknown_name_fails_at_resolution() {
        let reg = SolverRegistry::with_builtins();
        let handle = SolverHandle { chain: vec!["sor".into()], preconditioner: None };
        assert!(reg.resolve(&handle, &SolveOptions::default()).is_err());
    }

    #[test]
    fn empty_chain_is_rejected() {
        let reg = SolverRegistry::with_builtins();
        let handle = SolverHandle { chain: vec![], preconditioner: None };
        assert!(reg.resolve(&handle, &SolveOptions::default()).is_err());
    }

    #[test]
    fn first_converging_entry_wins() {
        let reg = SolverRegistry::with_builtins();
        let handle = SolverHandle { chain: vec!["cg".into(), "lu".into()], preconditioner: None };
        let mut chain = reg.resolve(&handle, &SolveOptions::default()).unwrap();
        let (a, b) = spd_2x2();
        let x0 = vec![0.0; 2];
        let mut x = vec![0.0; 2];
        let solution = chain.solve(&a, None, &b, &x0, &mut x).unwrap();
        assert_eq!(solution.solver, "cg");
        assert!(solution.stats.converged);
    }
}
