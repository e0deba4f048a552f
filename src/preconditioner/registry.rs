//! Named preconditioner factories.
//!
//! The registry maps preconditioner names to builders. It is constructed
//! once at startup, populated with the built-in strategies, and passed by
//! reference into the engine; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::{Ilu0, IdentityPc, Jacobi, Preconditioner, SharedPc};

/// Builds a ready-to-apply preconditioner from an assembled matrix.
///
/// Factories are stateful objects: the caching decorator implements this
/// same trait and holds its cache entry across calls, so the engine talks to
/// one `&mut dyn PcFactory` regardless of whether caching is configured.
pub trait PcFactory: Send {
    fn build(&mut self, a: &CsrMatrix) -> Result<SharedPc, SolveError>;

    /// Drop any internal cached state; the next `build` starts fresh.
    fn invalidate(&mut self) {}
}

/// Stateless factory wrapping a plain build function.
struct FnFactory(fn(&CsrMatrix) -> Result<SharedPc, SolveError>);

impl PcFactory for FnFactory {
    fn build(&mut self, a: &CsrMatrix) -> Result<SharedPc, SolveError> {
        (self.0)(a)
    }
}

fn build_none(_a: &CsrMatrix) -> Result<SharedPc, SolveError> {
    Ok(Arc::new(IdentityPc))
}

fn build_jacobi(a: &CsrMatrix) -> Result<SharedPc, SolveError> {
    let pc = Jacobi::from_matrix(a).map_err(|e| SolveError::PcBuild(e.to_string()))?;
    Ok(Arc::new(pc) as Arc<dyn Preconditioner>)
}

fn build_ilu0(a: &CsrMatrix) -> Result<SharedPc, SolveError> {
    let pc = Ilu0::from_matrix(a).map_err(|e| SolveError::PcBuild(e.to_string()))?;
    Ok(Arc::new(pc) as Arc<dyn Preconditioner>)
}

/// Name → factory map, populated once at startup.
pub struct PreconditionerRegistry {
    factories: HashMap<String, Box<dyn Fn() -> Box<dyn PcFactory> + Send>>,
}

impl PreconditionerRegistry {
    /// Registry with the built-in strategies: `"none"`, `"jacobi"`, `"ilu0"`.
    pub fn with_builtins() -> Self {
        let mut reg = Self { factories: HashMap::new() };
        reg.register("none", || Box::new(FnFactory(build_none)));
        reg.register("jacobi", || Box::new(FnFactory(build_jacobi)));
        reg.register("ilu0", || Box::new(FnFactory(build_ilu0)));
        reg
    }

    /// Register a named factory constructor, replacing any previous binding.
    pub fn register<F>(&mut self, name: &str, make: F)
    where
        F: Fn() -> Box<dyn PcFactory> + Send + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(make));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate a fresh factory for `name`. Resolution happens once per
    /// run; per-step calls go through the returned factory object.
    pub fn resolve(&self, name: &str) -> Option<Box<dyn PcFactory>> {
        self.factories.get(name).map(|make| make())
    }
}
