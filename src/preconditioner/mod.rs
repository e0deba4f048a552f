//! Preconditioners for the pressure solves.
//!
//! A preconditioner approximates `A⁻¹` cheaply enough to be applied once per
//! Krylov iteration. Instances are produced by named factories resolved
//! through the [`registry`], optionally behind the fingerprint cache in
//! [`caching`].

use std::sync::Arc;

use crate::error::SolveError;

/// A built preconditioner `M ≈ A⁻¹`.
pub trait Preconditioner: Send + Sync {
    /// Apply `M⁻¹` to `r`, writing `z = M⁻¹ r`.
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), SolveError>;
}

/// Shared ownership handle: the cached instance stays alive inside its
/// factory while a solve borrows it.
pub type SharedPc = Arc<dyn Preconditioner>;

/// Identity preconditioner, used when the handle names `"none"`.
pub struct IdentityPc;

impl Preconditioner for IdentityPc {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), SolveError> {
        z.copy_from_slice(r);
        Ok(())
    }
}

pub mod jacobi;
pub use jacobi::Jacobi;
pub mod ilu;
pub use ilu::Ilu0;
pub mod registry;
pub use registry::{PcFactory, PreconditionerRegistry};
pub mod caching;
pub use caching::{CacheOptions, CachingFactory};
