//! One attempted step: assemble, solve, update, validate.

use log::debug;

use crate::config::SimConfig;
use crate::error::{SimError, UpdateError};
use crate::matrix::CsrMatrix;
use crate::preconditioner::caching::CachingFactory;
use crate::preconditioner::registry::{PcFactory, PreconditionerRegistry};
use crate::solver::registry::ResolvedChain;
use crate::solver::SolverRegistry;
use crate::state::{Grid, ReservoirState};
use crate::stepping::outcome::{RejectReason, StepOutcome};
use crate::stepping::validate::StateValidator;

/// Assembles the implicit pressure system for a proposed increment.
///
/// A black box from the stepping core's perspective; it must be
/// deterministic for identical inputs.
pub trait LinearSystemProvider {
    fn assemble(&self, state: &ReservoirState, dt: f64) -> (CsrMatrix, Vec<f64>);
}

/// Result of the explicit saturation update.
pub struct SaturationUpdate {
    pub sw: Vec<f64>,
    pub so: Vec<f64>,
    /// Net outflux magnitude per cell (volume per time), from which the
    /// engine computes the realized CFL.
    pub outflux: Vec<f64>,
}

/// Produces the new saturation field from the solved pressures.
///
/// Must not clamp its output to physical bounds (validation is the
/// engine's job), but may report a hard failure (e.g. an arithmetic domain
/// error), which is classified severe.
pub trait SaturationUpdater {
    fn apply(
        &self,
        state: &ReservoirState,
        pressure: &[f64],
        dt: f64,
    ) -> Result<SaturationUpdate, UpdateError>;
}

/// Attempts single steps. Holds the resolved solver chain and the (cached)
/// preconditioner factory for the whole run.
pub struct EvolutionEngine<P, U> {
    provider: P,
    updater: U,
    grid: Grid,
    chain: ResolvedChain,
    pc_factory: Option<Box<dyn PcFactory>>,
    validator: StateValidator,
    max_cfl: f64,
}

impl<P: LinearSystemProvider, U: SaturationUpdater> EvolutionEngine<P, U> {
    /// Resolve the configured solver handle and preconditioner name against
    /// the registries. Resolution happens here, once per run; unknown names
    /// are configuration errors.
    pub fn new(
        config: &SimConfig,
        solvers: &SolverRegistry,
        preconditioners: &PreconditionerRegistry,
        grid: Grid,
        provider: P,
        updater: U,
    ) -> Result<Self, SimError> {
        let chain = solvers
            .resolve(&config.solver, &config.solve)
            .map_err(SimError::Config)?;
        let pc_factory = match config.solver.preconditioner.as_deref() {
            None | Some("none") => None,
            Some(name) => {
                let inner = preconditioners
                    .resolve(name)
                    .ok_or_else(|| SimError::Config(format!("unknown preconditioner {name:?}")))?;
                Some(Box::new(CachingFactory::new(inner, config.cache.clone())) as Box<dyn PcFactory>)
            }
        };
        Ok(Self {
            provider,
            updater,
            grid,
            chain,
            pc_factory,
            validator: StateValidator::new(config.sat_tol),
            max_cfl: config.timer.max_cfl,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Attempt one step of size `dt` from `state`.
    ///
    /// Failure surfaces as a `Rejected` outcome, never as an error: the
    /// controller decides whether to retry. The two failure families,
    /// "the chain never converged" and "the chain converged but the result
    /// is unstable or unphysical", are kept distinct because they carry
    /// different severities.
    pub fn advance(&mut self, state: &ReservoirState, dt: f64) -> StepOutcome {
        // (a) implicit system for this increment
        let (matrix, rhs) = self.provider.assemble(state, dt);

        // (b) fallback chain, warm-started from the current pressures
        let mut pressure = vec![0.0; state.pressure.len()];
        let solution = match self.chain.solve(
            &matrix,
            self.pc_factory.as_deref_mut(),
            &rhs,
            &state.pressure,
            &mut pressure,
        ) {
            Ok(solution) => solution,
            Err(attempts) => {
                debug!("solver chain exhausted after {} attempts", attempts.len());
                return StepOutcome::Rejected {
                    reason: RejectReason::ChainExhausted { attempts },
                    realized_cfl: None,
                };
            }
        };

        // (c) explicit saturation update from the solved pressures
        let update = match self.updater.apply(state, &pressure, dt) {
            Ok(update) => update,
            Err(UpdateError(message)) => {
                return StepOutcome::Rejected {
                    reason: RejectReason::UpdaterFailure { message },
                    realized_cfl: None,
                };
            }
        };

        // (d) realized CFL from fluxes and pore volumes
        let realized_cfl = self.realized_cfl(&update.outflux, dt);

        let candidate = ReservoirState { pressure, sw: update.sw, so: update.so };

        // (e) validation: physical bounds first, stability second
        let flags = self.validator.check(&candidate);
        if !flags.is_empty() {
            debug!("candidate state violates bounds: {flags:?}");
            return StepOutcome::Rejected {
                reason: RejectReason::InvalidState { flags },
                realized_cfl: Some(realized_cfl),
            };
        }
        if realized_cfl > self.max_cfl {
            let ratio = realized_cfl / self.max_cfl;
            debug!("realized CFL {realized_cfl:.3} exceeds limit (ratio {ratio:.2})");
            return StepOutcome::Rejected {
                reason: RejectReason::CflExceeded { ratio },
                realized_cfl: Some(realized_cfl),
            };
        }

        StepOutcome::Accepted {
            state: candidate,
            realized_cfl,
            solver: solution.solver,
            iterations: solution.stats.iterations,
        }
    }

    /// `dt · max_i(outflux_i / pore_volume_i)` over all cells.
    fn realized_cfl(&self, outflux: &[f64], dt: f64) -> f64 {
        let grid = &self.grid;
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            outflux
                .par_iter()
                .enumerate()
                .map(|(i, q)| dt * q.abs() / grid.pore_volume(i))
                .reduce(|| 0.0, f64::max)
        }
        #[cfg(not(feature = "rayon"))]
        {
            outflux
                .iter()
                .enumerate()
                .map(|(i, q)| dt * q.abs() / grid.pore_volume(i))
                .fold(0.0, f64::max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::preconditioner::PreconditionerRegistry;
    use crate::solver::SolverRegistry;

    /// Identity pressure system: pressures solve to the RHS.
    struct FixedProvider {
        rhs: Vec<f64>,
    }

    impl LinearSystemProvider for FixedProvider {
        fn assemble(&self, state: &ReservoirState, _dt: f64) -> (CsrMatrix, Vec<f64>) {
            let n = state.n_cells();
            let a = CsrMatrix::from_triplets(n, &(0..n).map(|i| (i, i, 1.0)).collect::<Vec<_>>());
            (a, self.rhs.clone())
        }
    }

    /// Updater with a controllable per-cell outflux.
    struct FluxUpdater {
        outflux: f64,
    }

    impl SaturationUpdater for FluxUpdater {
        fn apply(
            &self,
            state: &ReservoirState,
            _pressure: &[f64],
            _dt: f64,
        ) -> Result<SaturationUpdate, UpdateError> {
            Ok(SaturationUpdate {
                sw: state.sw.clone(),
                so: state.so.clone(),
                outflux: vec![self.outflux; state.n_cells()],
            })
        }
    }

    fn engine(outflux: f64) -> EvolutionEngine<FixedProvider, FluxUpdater> {
        let grid = Grid::uniform(2, 1, 1, 1.0, 1.0, 1.0, 0.5);
        let config = SimConfig::default();
        EvolutionEngine::new(
            &config,
            &SolverRegistry::with_builtins(),
            &PreconditionerRegistry::with_builtins(),
            grid,
            FixedProvider { rhs: vec![1.0e7, 1.0e7] },
            FluxUpdater { outflux },
        )
        .unwrap()
    }

    #[test]
    fn quiet_system_is_accepted() {
        let mut e = engine(0.01);
        let state = ReservoirState::uniform(2, 1.0e7, 0.3);
        match e.advance(&state, 1.0) {
            StepOutcome::Accepted { realized_cfl, solver, .. } => {
                // dt * q / pv = 1.0 * 0.01 / 0.5
                assert!((realized_cfl - 0.02).abs() < 1e-12);
                assert_eq!(solver, "cg");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn fast_fluxes_reject_on_cfl() {
        let mut e = engine(1.0);
        let state = ReservoirState::uniform(2, 1.0e7, 0.3);
        match e.advance(&state, 1.0) {
            StepOutcome::Rejected { reason: RejectReason::CflExceeded { ratio }, .. } => {
                // realized = 2.0 against the default 0.9 limit
                assert!((ratio - 2.0 / 0.9).abs() < 1e-12);
            }
            other => panic!("expected CFL rejection, got {other:?}"),
        }
    }

    #[test]
    fn unknown_solver_name_is_a_config_error() {
        let grid = Grid::uniform(1, 1, 1, 1.0, 1.0, 1.0, 0.5);
        let mut config = SimConfig::default();
        config.solver.chain = vec!["amg".into()];
        let result = EvolutionEngine::new(
            &config,
            &SolverRegistry::with_builtins(),
            &PreconditionerRegistry::with_builtins(),
            grid,
            FixedProvider { rhs: vec![1.0] },
            FluxUpdater { outflux: 0.0 },
        );
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn unknown_preconditioner_name_is_a_config_error() {
        let grid = Grid::uniform(1, 1, 1, 1.0, 1.0, 1.0, 0.5);
        let mut config = SimConfig::default();
        config.solver.preconditioner = Some("spai".into());
        let result = EvolutionEngine::new(
            &config,
            &SolverRegistry::with_builtins(),
            &PreconditionerRegistry::with_builtins(),
            grid,
            FixedProvider { rhs: vec![1.0] },
            FluxUpdater { outflux: 0.0 },
        );
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn updater_hard_failure_is_reported() {
        struct FailingUpdater;
        impl SaturationUpdater for FailingUpdater {
            fn apply(
                &self,
                _state: &ReservoirState,
                _pressure: &[f64],
                _dt: f64,
            ) -> Result<SaturationUpdate, UpdateError> {
                Err(UpdateError("negative mobility".into()))
            }
        }
        let grid = Grid::uniform(1, 1, 1, 1.0, 1.0, 1.0, 0.5);
        let config = SimConfig::default();
        let mut e = EvolutionEngine::new(
            &config,
            &SolverRegistry::with_builtins(),
            &PreconditionerRegistry::with_builtins(),
            grid,
            FixedProvider { rhs: vec![1.0e7] },
            FailingUpdater,
        )
        .unwrap();
        let state = ReservoirState::uniform(1, 1.0e7, 0.3);
        match e.advance(&state, 1.0) {
            StepOutcome::Rejected { reason: RejectReason::UpdaterFailure { message }, .. } => {
                assert!(message.contains("negative mobility"));
            }
            other => panic!("expected updater failure, got {other:?}"),
        }
    }
}
