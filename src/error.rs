use thiserror::Error;

use crate::stepping::classifier::Classification;

/// Low-level failure inside a single linear solve or preconditioner build.
///
/// These never cross the crate boundary: the chain executor absorbs them by
/// moving to the next solver in the fallback chain, and only a fully
/// exhausted chain is reported upward (as step-rejection data, not as an
/// error).
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("breakdown: {0}")]
    Breakdown(&'static str),
    #[error("dimension mismatch: {0}")]
    Dimension(String),
    #[error("preconditioner build failed: {0}")]
    PcBuild(String),
}

/// Hard failure reported by the saturation-update collaborator, e.g. an
/// arithmetic domain error in its flux evaluation. Always classified severe.
#[derive(Error, Debug)]
#[error("saturation update failed: {0}")]
pub struct UpdateError(pub String);

/// User-visible failures. Per the error-handling contract these are the only
/// two conditions that ever propagate out of the step loop; everything else
/// is retried in-process first.
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid configuration, detected at construction. Never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The run cannot make progress: too many consecutive rejects, or a
    /// failure recurring at the floor step size. Carries the controller's
    /// final state so the run can be diagnosed without re-running.
    #[error(
        "simulation exhausted at t = {time}: {consecutive_rejects} consecutive rejects \
         ({total_rejects} total), last dt = {last_dt}, last classification = {last_classification:?}"
    )]
    Exhausted {
        time: f64,
        last_dt: f64,
        consecutive_rejects: usize,
        total_rejects: usize,
        last_classification: Classification,
    },
}
