//! Maps raw step outcomes onto retry policy.

use crate::stepping::outcome::{RejectReason, StepOutcome};

/// What the controller should do with an attempted step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Accept,
    /// Retry with the ordinary backoff factor.
    RetryMild,
    /// Retry with the aggressive backoff factor.
    RetrySevere,
    /// The failure cannot be retried: the attempt was already at the floor
    /// step size and the floor has been tried before.
    Fatal,
}

/// Pure policy: outcome → classification.
///
/// This is the single place where failure severity is decided; the
/// controller applies whatever comes out without second-guessing it.
pub struct FailureClassifier {
    /// Realized/limit CFL ratio separating mild from severe.
    pub severe_cfl_factor: f64,
}

impl FailureClassifier {
    pub fn new(severe_cfl_factor: f64) -> Self {
        Self { severe_cfl_factor }
    }

    /// Classify an outcome. `at_floor` is true when the attempted increment
    /// was already the minimum step size and a floor-sized attempt has
    /// already been rejected; a retry cannot shrink further, so any
    /// retryable failure escalates to fatal.
    pub fn classify(&self, outcome: &StepOutcome, at_floor: bool) -> Classification {
        let retry = match outcome {
            StepOutcome::Accepted { .. } => return Classification::Accept,
            StepOutcome::Rejected { reason, .. } => match reason {
                // The chain merely stalling is the gentlest failure: the
                // system is probably just too stiff for this increment.
                RejectReason::ChainExhausted { .. } => Classification::RetryMild,
                RejectReason::CflExceeded { ratio } => {
                    if *ratio > self.severe_cfl_factor {
                        Classification::RetrySevere
                    } else {
                        Classification::RetryMild
                    }
                }
                RejectReason::InvalidState { .. } => Classification::RetrySevere,
                RejectReason::UpdaterFailure { .. } => Classification::RetrySevere,
            },
        };
        if at_floor { Classification::Fatal } else { retry }
    }
}
