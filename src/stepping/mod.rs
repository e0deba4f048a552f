//! The adaptive step loop: propose, attempt, classify, advance or retry.

pub mod outcome;
pub use outcome::{RejectReason, StepOutcome, StepProposal, StepReport};
pub mod validate;
pub use validate::{StateValidator, ValidationFlags};
pub mod classifier;
pub use classifier::{Classification, FailureClassifier};
pub mod controller;
pub use controller::StepController;
pub mod engine;
pub use engine::{EvolutionEngine, LinearSystemProvider, SaturationUpdate, SaturationUpdater};
pub mod cursor;
pub use cursor::Simulation;
pub mod sink;
pub use sink::{BackgroundWriter, Snapshot, SnapshotConsumer};
