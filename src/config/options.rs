//! Top-level run options.

use serde::Deserialize;

use crate::config::TimerConfig;
use crate::error::SimError;
use crate::preconditioner::CacheOptions;
use crate::solver::SolverHandle;

/// Per-solve parameters shared by every entry of the fallback chain.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Relative residual tolerance.
    pub tolerance: f64,
    /// Iteration cap per linear solve. Algorithmic, not wall-clock.
    pub max_iterations: usize,
    /// Restart length for GMRES.
    pub restart: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self { tolerance: 1.0e-8, max_iterations: 500, restart: 30 }
    }
}

impl SolveOptions {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(SimError::Config(format!(
                "tolerance must lie in (0, 1), got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(SimError::Config("max_iterations must be at least 1".into()));
        }
        if self.restart == 0 {
            return Err(SimError::Config("restart must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a run consumes from configuration: solver handle, cache
/// tuning, solve parameters, step control, and the simulated horizon.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub solver: SolverHandle,
    pub solve: SolveOptions,
    pub cache: CacheOptions,
    pub timer: TimerConfig,
    /// Simulated end time; the cursor yields `None` once reached.
    pub end_time: Option<f64>,
    /// Saturation bound/sum tolerance used by step validation.
    pub sat_tol: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            solver: SolverHandle::default(),
            solve: SolveOptions::default(),
            cache: CacheOptions::default(),
            timer: TimerConfig::default(),
            end_time: None,
            sat_tol: 1.0e-6,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        self.solve.validate()?;
        self.timer.validate()?;
        if let Some(end) = self.end_time {
            if !(end > 0.0) {
                return Err(SimError::Config(format!("end_time must be positive, got {end}")));
            }
        }
        if !(self.sat_tol > 0.0 && self.sat_tol < 0.1) {
            return Err(SimError::Config(format!(
                "sat_tol must lie in (0, 0.1), got {}",
                self.sat_tol
            )));
        }
        Ok(())
    }
}
