//! Step-size controller configuration.

use serde::Deserialize;

use crate::error::SimError;

/// Tuning for the adaptive step controller. Immutable once validated.
///
/// All fields are plain numbers so a run deck can carry them directly; the
/// invariants are checked once by [`TimerConfig::validate`] at construction
/// and a violation is a non-retryable configuration failure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub min_step: f64,
    pub max_step: f64,
    pub initial_step: f64,
    /// Stability limit for the explicit saturation update.
    pub max_cfl: f64,
    /// Multiplier applied after a cooled-down success streak.
    pub growth_factor: f64,
    /// Multiplier applied after a mild rejection.
    pub backoff_factor: f64,
    /// Multiplier applied after a severe rejection.
    pub aggressive_backoff_factor: f64,
    /// Successes required before the step size may grow again.
    pub growth_cooldown: usize,
    /// Exponential smoothing weight on the previous size when growing;
    /// zero disables smoothing.
    pub smoothing: f64,
    /// Consecutive rejects tolerated before the run is declared exhausted.
    pub max_consecutive_rejects: usize,
    /// Realized/limit CFL ratio beyond which a rejection is severe rather
    /// than mild.
    pub severe_cfl_factor: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            min_step: 1.0e-3,
            max_step: 30.0,
            initial_step: 0.1,
            max_cfl: 0.9,
            growth_factor: 1.25,
            backoff_factor: 0.5,
            aggressive_backoff_factor: 0.25,
            growth_cooldown: 2,
            smoothing: 0.0,
            max_consecutive_rejects: 8,
            severe_cfl_factor: 2.0,
        }
    }
}

impl TimerConfig {
    /// Check the construction invariants. Violations are fatal and never
    /// retried.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = [
            ("min_step", self.min_step),
            ("max_step", self.max_step),
            ("initial_step", self.initial_step),
            ("max_cfl", self.max_cfl),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(SimError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.min_step > self.initial_step || self.initial_step > self.max_step {
            return Err(SimError::Config(format!(
                "step bounds must satisfy min_step <= initial_step <= max_step, \
                 got {} / {} / {}",
                self.min_step, self.initial_step, self.max_step
            )));
        }
        if self.growth_factor < 1.0 {
            return Err(SimError::Config(format!(
                "growth_factor must be >= 1, got {}",
                self.growth_factor
            )));
        }
        for (name, value) in [
            ("backoff_factor", self.backoff_factor),
            ("aggressive_backoff_factor", self.aggressive_backoff_factor),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(SimError::Config(format!("{name} must lie in (0, 1), got {value}")));
            }
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(SimError::Config(format!(
                "smoothing must lie in [0, 1), got {}",
                self.smoothing
            )));
        }
        if self.max_consecutive_rejects == 0 {
            return Err(SimError::Config("max_consecutive_rejects must be at least 1".into()));
        }
        if self.severe_cfl_factor <= 1.0 {
            return Err(SimError::Config(format!(
                "severe_cfl_factor must exceed 1, got {}",
                self.severe_cfl_factor
            )));
        }
        Ok(())
    }
}
