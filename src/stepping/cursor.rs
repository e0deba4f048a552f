//! The pull-style step loop.
//!
//! Callers drive the run one accepted step at a time: each `step()` call
//! proposes increments, attempts them, and retries smaller ones until an
//! attempt is accepted or the controller declares the run exhausted.
//! Between calls nothing is in flight, so cancellation is simply not
//! calling again.

use log::info;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::preconditioner::PreconditionerRegistry;
use crate::solver::SolverRegistry;
use crate::state::{Grid, ReservoirState};
use crate::stepping::classifier::{Classification, FailureClassifier};
use crate::stepping::controller::StepController;
use crate::stepping::engine::{EvolutionEngine, LinearSystemProvider, SaturationUpdater};
use crate::stepping::outcome::{StepOutcome, StepReport};
use crate::stepping::sink::{BackgroundWriter, Snapshot};

/// A configured run: controller, engine, classifier, and the live state.
pub struct Simulation<P, U> {
    controller: StepController,
    engine: EvolutionEngine<P, U>,
    classifier: FailureClassifier,
    state: ReservoirState,
    end_time: Option<f64>,
    steps_accepted: usize,
    writer: Option<BackgroundWriter>,
    /// Set once a terminal error has been handed to the caller, so the
    /// iterator ends instead of repeating it.
    finished: bool,
}

impl<P: LinearSystemProvider, U: SaturationUpdater> Simulation<P, U> {
    /// Validate `config`, resolve registries, and build the run.
    pub fn new(
        config: SimConfig,
        solvers: &SolverRegistry,
        preconditioners: &PreconditionerRegistry,
        grid: Grid,
        provider: P,
        updater: U,
        initial_state: ReservoirState,
    ) -> Result<Self, SimError> {
        config.validate()?;
        if initial_state.n_cells() != grid.n_cells() {
            return Err(SimError::Config(format!(
                "initial state has {} cells, grid has {}",
                initial_state.n_cells(),
                grid.n_cells()
            )));
        }
        let controller = StepController::new(config.timer.clone())?;
        let classifier = FailureClassifier::new(config.timer.severe_cfl_factor);
        let end_time = config.end_time;
        let engine =
            EvolutionEngine::new(&config, solvers, preconditioners, grid, provider, updater)?;
        Ok(Self {
            controller,
            engine,
            classifier,
            state: initial_state,
            end_time,
            steps_accepted: 0,
            writer: None,
            finished: false,
        })
    }

    /// Attach a background consumer for accepted states.
    pub fn with_writer(mut self, writer: BackgroundWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn time(&self) -> f64 {
        self.controller.time()
    }

    pub fn state(&self) -> &ReservoirState {
        &self.state
    }

    /// True once the configured horizon has been reached.
    pub fn done(&self) -> bool {
        matches!(self.end_time, Some(end) if self.controller.time() >= end)
    }

    /// Compute the next accepted step.
    ///
    /// Rejected attempts are retried internally with smaller increments;
    /// only acceptance or a terminal failure returns. The terminal errors
    /// are `SimError::Exhausted` and (for misuse) `SimError::Config`. The
    /// accepted state itself is readable through [`Simulation::state`]
    /// until the next call.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        loop {
            let proposal = self.controller.propose()?;
            let outcome = self.engine.advance(&self.state, proposal.dt);
            let classification = self.classifier.classify(&outcome, self.controller.at_floor());

            match (outcome, classification) {
                (
                    StepOutcome::Accepted { state, realized_cfl, solver, iterations },
                    Classification::Accept,
                ) => {
                    self.controller.record_accept(proposal.dt, realized_cfl)?;
                    self.state = state;
                    self.steps_accepted += 1;
                    let report = StepReport {
                        step: self.steps_accepted,
                        time: self.controller.time(),
                        dt: proposal.dt,
                        realized_cfl,
                        rejects_so_far: self.controller.state().total_rejects,
                        solver,
                        iterations,
                    };
                    if let Some(writer) = &self.writer {
                        writer.offer(Snapshot {
                            step: report.step,
                            time: report.time,
                            dt: report.dt,
                            state: self.state.clone(),
                        });
                    }
                    info!(
                        "step {} accepted: t = {:.6e}, dt = {:.4e}, cfl = {:.3}, solver = {}",
                        report.step, report.time, report.dt, report.realized_cfl, report.solver
                    );
                    return Ok(report);
                }
                (StepOutcome::Rejected { .. }, classification) => {
                    self.controller.record_reject(proposal.dt, classification)?;
                    // record_reject shrank the step; loop and re-propose.
                }
                (StepOutcome::Accepted { .. }, classification) => {
                    // The classifier never maps acceptance elsewhere.
                    return Err(SimError::Config(format!(
                        "classifier returned {classification:?} for an accepted outcome"
                    )));
                }
            }
        }
    }
}

impl<P: LinearSystemProvider, U: SaturationUpdater> Iterator for Simulation<P, U> {
    type Item = Result<StepReport, SimError>;

    /// Yields one accepted step per call; ends after the horizon, or after
    /// a terminal failure has been delivered once.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.done() {
            return None;
        }
        match self.step() {
            Ok(report) => Some(Ok(report)),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
