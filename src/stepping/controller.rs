//! Adaptive step-size control.
//!
//! The controller proposes increments, grows them after cooled-down success
//! streaks, shrinks them after classified failures, and declares the run
//! exhausted when rejection makes further progress impossible. It owns all
//! of its mutable state; one controller lives exactly as long as one run.

use log::{debug, warn};

use crate::config::TimerConfig;
use crate::error::SimError;
use crate::stepping::classifier::Classification;
use crate::stepping::outcome::StepProposal;

/// Where the controller sits in its propose/observe cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Proposing,
    Solving,
    Exhausted,
}

/// Mutable per-run state, owned exclusively by the controller.
#[derive(Clone, Debug)]
pub struct ControllerState {
    pub current_step: f64,
    /// Consecutive accepted steps, for the growth cooldown.
    pub success_streak: usize,
    /// Consecutive rejects; reset on any accept.
    pub consecutive_rejects: usize,
    /// Rejects of floor-sized proposals since the last accept.
    pub floor_rejects: usize,
    /// Total rejects over the whole run.
    pub total_rejects: usize,
    /// Realized CFL of the most recent accepted step.
    pub last_cfl: Option<f64>,
}

pub struct StepController {
    cfg: TimerConfig,
    state: ControllerState,
    phase: Phase,
    time: f64,
}

impl StepController {
    /// Validates the timer configuration; a violation is fatal and not
    /// retryable.
    pub fn new(cfg: TimerConfig) -> Result<Self, SimError> {
        cfg.validate()?;
        let state = ControllerState {
            current_step: cfg.initial_step,
            success_streak: 0,
            consecutive_rejects: 0,
            floor_rejects: 0,
            total_rejects: 0,
            last_cfl: None,
        };
        Ok(Self { cfg, state, phase: Phase::Proposing, time: 0.0 })
    }

    pub fn config(&self) -> &TimerConfig {
        &self.cfg
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Simulated time advanced so far.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Exhausted
    }

    /// True when the current proposal cannot shrink any further and a
    /// floor-sized attempt has already been rejected this cycle.
    pub fn at_floor(&self) -> bool {
        self.state.current_step <= self.cfg.min_step && self.state.floor_rejects > 0
    }

    /// Propose the next increment. The very first call returns
    /// `initial_step`; later calls return the adapted size.
    pub fn propose(&mut self) -> Result<StepProposal, SimError> {
        match self.phase {
            Phase::Proposing => {
                self.phase = Phase::Solving;
                let dt = self.state.current_step;
                Ok(StepProposal { dt, target_time: self.time + dt })
            }
            Phase::Solving => Err(SimError::Config(
                "propose() called while a step is in flight".into(),
            )),
            Phase::Exhausted => Err(self.exhausted_error(Classification::Fatal)),
        }
    }

    /// Record an accepted step: advance time, reset reject counters, and
    /// grow the step size once the success streak clears the cooldown.
    pub fn record_accept(&mut self, dt: f64, realized_cfl: f64) -> Result<(), SimError> {
        self.expect_solving()?;
        self.time += dt;
        self.state.consecutive_rejects = 0;
        self.state.floor_rejects = 0;
        self.state.last_cfl = Some(realized_cfl);
        self.state.success_streak += 1;

        if self.state.success_streak >= self.cfg.growth_cooldown {
            let grown = self.state.current_step * self.cfg.growth_factor;
            // Exponential smoothing against the previous size damps
            // oscillation between growth and backoff.
            let smoothed =
                self.cfg.smoothing * self.state.current_step + (1.0 - self.cfg.smoothing) * grown;
            let next = smoothed.clamp(self.cfg.min_step, self.cfg.max_step);
            debug!(
                "step accepted (dt = {dt:.4e}, cfl = {realized_cfl:.3}); growing to {next:.4e}"
            );
            self.state.current_step = next;
            self.state.success_streak = 0;
        } else {
            debug!(
                "step accepted (dt = {dt:.4e}, cfl = {realized_cfl:.3}); streak {}/{}",
                self.state.success_streak, self.cfg.growth_cooldown
            );
        }
        self.phase = Phase::Proposing;
        Ok(())
    }

    /// Record a rejected step: shrink by the severity's backoff factor, or
    /// declare the run exhausted when the reject budget or the floor rule
    /// fires. The returned error is terminal.
    pub fn record_reject(
        &mut self,
        attempted_dt: f64,
        classification: Classification,
    ) -> Result<(), SimError> {
        self.expect_solving()?;
        self.state.consecutive_rejects += 1;
        self.state.total_rejects += 1;
        self.state.success_streak = 0;
        let was_floor = attempted_dt <= self.cfg.min_step;
        if was_floor {
            self.state.floor_rejects += 1;
        }

        // Terminal conditions: the reject budget is spent, the classifier
        // escalated to fatal, or a failure recurred at the floor size.
        let budget_spent = self.state.consecutive_rejects >= self.cfg.max_consecutive_rejects;
        let floor_recurred = self.state.floor_rejects >= 2;
        if budget_spent || floor_recurred || classification == Classification::Fatal {
            warn!(
                "run exhausted after {} consecutive rejects (floor rejects: {})",
                self.state.consecutive_rejects, self.state.floor_rejects
            );
            self.phase = Phase::Exhausted;
            return Err(self.exhausted_error(classification));
        }

        let factor = match classification {
            Classification::RetrySevere => self.cfg.aggressive_backoff_factor,
            _ => self.cfg.backoff_factor,
        };
        let next = (attempted_dt * factor).clamp(self.cfg.min_step, self.cfg.max_step);
        debug!(
            "step rejected ({classification:?}, dt = {attempted_dt:.4e}); backing off to {next:.4e}"
        );
        self.state.current_step = next;
        self.phase = Phase::Proposing;
        Ok(())
    }

    fn expect_solving(&self) -> Result<(), SimError> {
        match self.phase {
            Phase::Solving => Ok(()),
            Phase::Proposing => Err(SimError::Config(
                "outcome reported with no step in flight".into(),
            )),
            Phase::Exhausted => Err(SimError::Config(
                "outcome reported after exhaustion".into(),
            )),
        }
    }

    fn exhausted_error(&self, classification: Classification) -> SimError {
        SimError::Exhausted {
            time: self.time,
            last_dt: self.state.current_step,
            consecutive_rejects: self.state.consecutive_rejects,
            total_rejects: self.state.total_rejects,
            last_classification: classification,
        }
    }
}
