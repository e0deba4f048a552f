//! Value types flowing between controller, engine, and classifier.

use serde::Serialize;

use crate::solver::registry::ChainAttempt;
use crate::state::ReservoirState;
use crate::stepping::validate::ValidationFlags;

/// A candidate increment, produced by the controller and consumed by the
/// engine.
#[derive(Clone, Copy, Debug)]
pub struct StepProposal {
    pub dt: f64,
    /// The simulated time this step would advance to.
    pub target_time: f64,
}

/// Why an attempted step was rejected.
#[derive(Debug)]
pub enum RejectReason {
    /// Every solver in the fallback chain failed to converge.
    ChainExhausted { attempts: Vec<ChainAttempt> },
    /// The solve converged but the explicit update overran the stability
    /// limit; `ratio` is realized CFL over the configured limit.
    CflExceeded { ratio: f64 },
    /// The updated state violates physical bounds.
    InvalidState { flags: ValidationFlags },
    /// The saturation-update collaborator reported a hard failure.
    UpdaterFailure { message: String },
}

/// Result of one attempted step.
#[derive(Debug)]
pub enum StepOutcome {
    Accepted {
        state: ReservoirState,
        realized_cfl: f64,
        /// Name of the chain entry that converged.
        solver: String,
        iterations: usize,
    },
    Rejected {
        reason: RejectReason,
        realized_cfl: Option<f64>,
    },
}

/// Per-step diagnostics surfaced to the caller for each accepted step.
#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    /// Index of the accepted step, starting at 1.
    pub step: usize,
    /// Simulated time after the step.
    pub time: f64,
    /// The accepted increment.
    pub dt: f64,
    pub realized_cfl: f64,
    /// Total rejects over the whole run so far.
    pub rejects_so_far: usize,
    /// Which solver in the fallback chain succeeded.
    pub solver: String,
    pub iterations: usize,
}
