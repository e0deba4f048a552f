//! End-to-end stepping laws: growth, backoff, exhaustion, determinism.

use std::cell::Cell;

use approx::assert_abs_diff_eq;
use impes::config::{SimConfig, TimerConfig};
use impes::error::UpdateError;
use impes::matrix::CsrMatrix;
use impes::preconditioner::PreconditionerRegistry;
use impes::solver::SolverRegistry;
use impes::state::{Grid, ReservoirState};
use impes::stepping::{
    LinearSystemProvider, SaturationUpdate, SaturationUpdater, Simulation,
};
use impes::SimError;

/// Identity pressure system: the solve reproduces the current pressures.
struct IdentityProvider;

impl LinearSystemProvider for IdentityProvider {
    fn assemble(&self, state: &ReservoirState, _dt: f64) -> (CsrMatrix, Vec<f64>) {
        let n = state.n_cells();
        let a = CsrMatrix::from_triplets(n, &(0..n).map(|i| (i, i, 1.0)).collect::<Vec<_>>());
        (a, state.pressure.clone())
    }
}

/// Updater with a fixed per-cell outflux; saturations are carried through
/// unchanged, so every candidate state stays admissible.
struct ConstantFlux {
    outflux: f64,
}

impl SaturationUpdater for ConstantFlux {
    fn apply(
        &self,
        state: &ReservoirState,
        _pressure: &[f64],
        _dt: f64,
    ) -> Result<SaturationUpdate, UpdateError> {
        Ok(SaturationUpdate {
            sw: state.sw.clone(),
            so: state.so.clone(),
            outflux: vec![self.outflux; state.n_cells()],
        })
    }
}

/// Updater that always reports a hard failure.
struct AlwaysFails;

impl SaturationUpdater for AlwaysFails {
    fn apply(
        &self,
        _state: &ReservoirState,
        _pressure: &[f64],
        _dt: f64,
    ) -> Result<SaturationUpdate, UpdateError> {
        Err(UpdateError("scripted failure".into()))
    }
}

/// Grid with pore volume exactly 1 per cell, so realized CFL = dt · outflux.
fn unit_grid() -> Grid {
    Grid::uniform(2, 1, 1, 2.0, 1.0, 1.0, 0.5)
}

fn initial_state() -> ReservoirState {
    ReservoirState::uniform(2, 1.0e7, 0.3)
}

fn config(timer: TimerConfig) -> SimConfig {
    SimConfig { timer, ..SimConfig::default() }
}

fn sim<U: SaturationUpdater>(timer: TimerConfig, updater: U) -> Simulation<IdentityProvider, U> {
    Simulation::new(
        config(timer),
        &SolverRegistry::with_builtins(),
        &PreconditionerRegistry::with_builtins(),
        unit_grid(),
        IdentityProvider,
        updater,
        initial_state(),
    )
    .unwrap()
}

fn growth_timer() -> TimerConfig {
    TimerConfig {
        min_step: 0.1,
        max_step: 10.0,
        initial_step: 1.0,
        max_cfl: 1.0,
        growth_factor: 1.3,
        backoff_factor: 0.5,
        aggressive_backoff_factor: 0.25,
        growth_cooldown: 1,
        smoothing: 0.0,
        max_consecutive_rejects: 8,
        severe_cfl_factor: 2.0,
    }
}

#[test]
fn stable_system_grows_geometrically() {
    let mut sim = sim(growth_timer(), ConstantFlux { outflux: 0.001 });
    let expected = [1.0, 1.3, 1.69, 2.197, 2.8561];
    for (i, e) in expected.iter().enumerate() {
        let report = sim.step().unwrap();
        assert_eq!(report.step, i + 1);
        assert_abs_diff_eq!(report.dt, *e, epsilon = 1e-12);
        assert_eq!(report.rejects_so_far, 0);
        assert_eq!(report.solver, "cg");
    }
}

#[test]
fn growth_clamps_at_max_step_and_stays_in_bounds() {
    let timer = growth_timer();
    let (min_step, max_step, max_cfl) = (timer.min_step, timer.max_step, timer.max_cfl);
    let mut sim = sim(timer, ConstantFlux { outflux: 0.001 });
    let mut hit_max = false;
    for _ in 0..30 {
        let report = sim.step().unwrap();
        assert!(report.dt >= min_step && report.dt <= max_step, "dt = {}", report.dt);
        assert!(report.realized_cfl <= max_cfl + 1e-12);
        if (report.dt - max_step).abs() < 1e-12 {
            hit_max = true;
        }
    }
    assert!(hit_max, "growth never reached max_step");
}

#[test]
fn mild_cfl_overrun_halves_the_step() {
    // At dt = 5 the realized CFL is 1.5 (mild); the retry at dt = 2.5
    // realizes 0.75 and is accepted.
    let timer = TimerConfig { initial_step: 5.0, ..growth_timer() };
    let mut sim = sim(timer, ConstantFlux { outflux: 0.3 });
    let report = sim.step().unwrap();
    assert_abs_diff_eq!(report.dt, 2.5, epsilon = 1e-12);
    assert_eq!(report.rejects_so_far, 1);
    assert_abs_diff_eq!(report.realized_cfl, 0.75, epsilon = 1e-12);
}

#[test]
fn severe_cfl_overrun_quarters_the_step() {
    // At dt = 5 the realized CFL is 3.0, past twice the limit; the
    // aggressive factor drops straight to 1.25.
    let timer = TimerConfig { initial_step: 5.0, ..growth_timer() };
    let mut sim = sim(timer, ConstantFlux { outflux: 0.6 });
    let report = sim.step().unwrap();
    assert_abs_diff_eq!(report.dt, 1.25, epsilon = 1e-12);
    assert_eq!(report.rejects_so_far, 1);
}

#[test]
fn reject_counter_resets_after_acceptance() {
    let timer = TimerConfig { initial_step: 5.0, ..growth_timer() };
    let mut sim = sim(timer, ConstantFlux { outflux: 0.3 });
    sim.step().unwrap();
    // Second step starts from a clean reject streak; with dt now well under
    // the limit it accepts immediately and the total stays at 1.
    let report = sim.step().unwrap();
    assert_eq!(report.rejects_so_far, 1);
}

#[test]
fn always_failing_run_exhausts_after_exactly_r_rejects() {
    let timer = TimerConfig {
        min_step: 1.0e-9,
        initial_step: 1.0,
        max_consecutive_rejects: 4,
        ..growth_timer()
    };
    let mut sim = sim(timer, AlwaysFails);
    match sim.step() {
        Err(SimError::Exhausted { consecutive_rejects, total_rejects, .. }) => {
            assert_eq!(consecutive_rejects, 4);
            assert_eq!(total_rejects, 4);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn failure_recurring_at_floor_exhausts_before_the_budget() {
    let timer = TimerConfig {
        min_step: 1.0,
        initial_step: 1.0,
        max_consecutive_rejects: 100,
        ..growth_timer()
    };
    let mut sim = sim(timer, AlwaysFails);
    match sim.step() {
        Err(SimError::Exhausted { consecutive_rejects, .. }) => {
            // One free retry at the floor, then the recurrence is terminal.
            assert_eq!(consecutive_rejects, 2);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn iterator_delivers_terminal_error_once_then_ends() {
    let timer = TimerConfig {
        min_step: 1.0e-9,
        max_consecutive_rejects: 3,
        ..growth_timer()
    };
    let mut sim = sim(timer, AlwaysFails);
    assert!(matches!(sim.next(), Some(Err(SimError::Exhausted { .. }))));
    assert!(sim.next().is_none());
}

#[test]
fn iterator_stops_at_the_horizon() {
    let timer = growth_timer();
    let mut cfg = config(timer);
    cfg.end_time = Some(3.0);
    let sim = Simulation::new(
        cfg,
        &SolverRegistry::with_builtins(),
        &PreconditionerRegistry::with_builtins(),
        unit_grid(),
        IdentityProvider,
        ConstantFlux { outflux: 0.001 },
        initial_state(),
    )
    .unwrap();
    let reports: Vec<_> = sim.map(Result::unwrap).collect();
    // 1.0 + 1.3 + 1.69 passes 3.0 on the third step.
    assert_eq!(reports.len(), 3);
    assert!(reports.last().unwrap().time >= 3.0);
}

/// Updater whose flux depends on the evolving state, so the accepted-dt
/// sequence exercises growth and backoff together.
struct StateCoupledFlux;

impl SaturationUpdater for StateCoupledFlux {
    fn apply(
        &self,
        state: &ReservoirState,
        _pressure: &[f64],
        dt: f64,
    ) -> Result<SaturationUpdate, UpdateError> {
        let sw: Vec<f64> = state.sw.iter().map(|s| (s + 0.001 * dt).min(0.7)).collect();
        let so: Vec<f64> = sw.iter().map(|s| 1.0 - s).collect();
        let q = 0.12 * (1.0 + sw[0]);
        Ok(SaturationUpdate { sw, so, outflux: vec![q; state.n_cells()] })
    }
}

#[test]
fn identical_runs_accept_identical_step_sequences() {
    let run = || -> Vec<f64> {
        let mut sim = sim(growth_timer(), StateCoupledFlux);
        (0..12).map(|_| sim.step().unwrap().dt).collect()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
}

/// Updater that fails until its fuse burns down, then behaves.
struct FailsNTimes {
    fuse: Cell<usize>,
}

impl SaturationUpdater for FailsNTimes {
    fn apply(
        &self,
        state: &ReservoirState,
        _pressure: &[f64],
        _dt: f64,
    ) -> Result<SaturationUpdate, UpdateError> {
        if self.fuse.get() > 0 {
            self.fuse.set(self.fuse.get() - 1);
            return Err(UpdateError("transient failure".into()));
        }
        Ok(SaturationUpdate {
            sw: state.sw.clone(),
            so: state.so.clone(),
            outflux: vec![0.001; state.n_cells()],
        })
    }
}

#[test]
fn transient_failures_are_retried_with_cutback() {
    let timer = TimerConfig { initial_step: 4.0, ..growth_timer() };
    let mut sim = sim(timer, FailsNTimes { fuse: Cell::new(2) });
    let report = sim.step().unwrap();
    // Two severe cutbacks: 4.0 → 1.0 → 0.25.
    assert_abs_diff_eq!(report.dt, 0.25, epsilon = 1e-12);
    assert_eq!(report.rejects_so_far, 2);
    // The recovery is complete: the next step is accepted first try.
    let report = sim.step().unwrap();
    assert_eq!(report.rejects_so_far, 2);
}
