//! Fingerprint-based preconditioner reuse.
//!
//! Rebuilding an ILU factorization every step dominates solve cost on large
//! grids, while the pressure matrix usually changes slowly between accepted
//! steps. The [`CachingFactory`] wraps any [`PcFactory`] and reuses the last
//! built instance until either it has been served too many times or the
//! matrix fingerprint has drifted too far, whichever bound fires first.
//! Correctness never depends on the cache: a stale preconditioner only costs
//! iterations.

use log::debug;
use serde::Deserialize;

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::registry::PcFactory;
use crate::preconditioner::SharedPc;

/// Cache tuning, from configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheOptions {
    /// Maximum number of builds served from one instance before a forced
    /// rebuild (the age bound).
    pub update_frequency: usize,
    /// Relative fingerprint drift that forces a rebuild regardless of age.
    pub recompute_threshold: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { update_frequency: 10, recompute_threshold: 0.3 }
    }
}

struct CacheEntry {
    fingerprint: f64,
    /// Calls served since the last (re)build, this call included.
    age: usize,
    pc: SharedPc,
}

/// Decorator implementing [`PcFactory`] over an inner factory, with reuse.
pub struct CachingFactory {
    inner: Box<dyn PcFactory>,
    opts: CacheOptions,
    entry: Option<CacheEntry>,
    rebuilds: usize,
}

impl CachingFactory {
    pub fn new(inner: Box<dyn PcFactory>, opts: CacheOptions) -> Self {
        Self { inner, opts, entry: None, rebuilds: 0 }
    }

    /// Number of times the inner factory has actually been invoked,
    /// including the cold build.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    fn rebuild(&mut self, a: &CsrMatrix, fingerprint: f64) -> Result<SharedPc, SolveError> {
        let pc = self.inner.build(a)?;
        self.rebuilds += 1;
        self.entry = Some(CacheEntry { fingerprint, age: 0, pc: pc.clone() });
        Ok(pc)
    }
}

fn relative_drift(current: f64, cached: f64) -> f64 {
    (current - cached).abs() / cached.abs().max(f64::EPSILON)
}

impl PcFactory for CachingFactory {
    fn build(&mut self, a: &CsrMatrix) -> Result<SharedPc, SolveError> {
        let fingerprint = a.fingerprint();
        match self.entry.take() {
            None => {
                debug!("pc cache: cold build (fingerprint {fingerprint:.6e})");
                self.rebuild(a, fingerprint)
            }
            Some(mut entry) => {
                entry.age += 1;
                let drift = relative_drift(fingerprint, entry.fingerprint);
                if entry.age >= self.opts.update_frequency {
                    debug!("pc cache: rebuild, age bound hit (age {})", entry.age);
                    self.rebuild(a, fingerprint)
                } else if drift >= self.opts.recompute_threshold {
                    debug!("pc cache: rebuild, fingerprint drift {drift:.3}");
                    self.rebuild(a, fingerprint)
                } else {
                    let pc = entry.pc.clone();
                    self.entry = Some(entry);
                    Ok(pc)
                }
            }
        }
    }

    fn invalidate(&mut self) {
        self.entry = None;
    }
}
