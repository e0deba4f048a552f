//! impes: adaptive IMPES time stepping over pluggable linear solvers
//!
//! This crate advances a reservoir state (pressure and phase saturations on
//! a 3D grid) through time by repeatedly solving the implicit pressure
//! system and applying the explicit saturation update, while an adaptive
//! controller sizes each increment and retries failed ones with smaller
//! sizes. Solver strategies and preconditioners are pluggable through named
//! registries, with a fingerprint-based cache for preconditioner reuse.
//!
//! The discretization itself (transmissibilities, upwinding, well terms)
//! lives behind the [`LinearSystemProvider`] and [`SaturationUpdater`]
//! collaborator traits and is not this crate's concern.

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod preconditioner;
pub mod solver;
pub mod state;
pub mod stepping;
pub mod utils;

// Re-exports for convenience
pub use config::{SimConfig, SolveOptions, TimerConfig};
pub use error::{SimError, SolveError, UpdateError};
pub use matrix::CsrMatrix;
pub use preconditioner::{CacheOptions, CachingFactory, PcFactory, Preconditioner, PreconditionerRegistry};
pub use solver::{LinearSolver, SolverHandle, SolverRegistry};
pub use state::{Grid, ReservoirState};
pub use stepping::{
    BackgroundWriter, Classification, EvolutionEngine, FailureClassifier, LinearSystemProvider,
    RejectReason, SaturationUpdate, SaturationUpdater, Simulation, Snapshot, SnapshotConsumer,
    StateValidator, StepController, StepOutcome, StepProposal, StepReport, ValidationFlags,
};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
