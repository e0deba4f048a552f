//! Toy waterflood: one injector, one producer, adaptive stepping.
//!
//! The discretization here is deliberately minimal (constant
//! transmissibilities, linear fractional flow) because the point of the
//! demo is the control loop, not the physics: the step size ramps up
//! while the pressure field settles and the front creeps downstream.

use impes::config::{SimConfig, TimerConfig};
use impes::error::UpdateError;
use impes::matrix::CsrMatrix;
use impes::preconditioner::PreconditionerRegistry;
use impes::solver::{SolverHandle, SolverRegistry};
use impes::state::{Grid, ReservoirState};
use impes::stepping::{
    LinearSystemProvider, SaturationUpdate, SaturationUpdater, Simulation,
};

const NX: usize = 10;
const TRANS: f64 = 2.0e-9;
const COMPRESSIBILITY: f64 = 1.0e-7;
const RATE: f64 = 1.0e-4;

/// Single-row grid, injector in cell 0, producer in the last cell.
struct TwoPointFlux {
    grid: Grid,
}

impl TwoPointFlux {
    fn accumulation(&self, i: usize, dt: f64) -> f64 {
        self.grid.pore_volume(i) * COMPRESSIBILITY / dt
    }
}

impl LinearSystemProvider for TwoPointFlux {
    fn assemble(&self, state: &ReservoirState, dt: f64) -> (CsrMatrix, Vec<f64>) {
        let n = state.n_cells();
        let mut triplets = Vec::new();
        let mut rhs = vec![0.0; n];
        for i in 0..n {
            let mut diag = self.accumulation(i, dt);
            rhs[i] = self.accumulation(i, dt) * state.pressure[i];
            if i > 0 {
                triplets.push((i, i - 1, -TRANS));
                diag += TRANS;
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -TRANS));
                diag += TRANS;
            }
            triplets.push((i, i, diag));
        }
        rhs[0] += RATE;
        rhs[n - 1] -= RATE;
        (CsrMatrix::from_triplets(n, &triplets), rhs)
    }
}

/// Explicit upwind update with linear fractional flow.
struct UpwindUpdater {
    grid: Grid,
}

impl SaturationUpdater for UpwindUpdater {
    fn apply(
        &self,
        state: &ReservoirState,
        pressure: &[f64],
        dt: f64,
    ) -> Result<SaturationUpdate, UpdateError> {
        let n = state.n_cells();
        let mut sw = state.sw.clone();
        let mut outflux = vec![0.0; n];

        // Face fluxes, upwinded on the pressure gradient.
        for i in 0..n - 1 {
            let q = TRANS * (pressure[i] - pressure[i + 1]);
            let (up, down) = if q >= 0.0 { (i, i + 1) } else { (i + 1, i) };
            let fw = state.sw[up]; // linear fractional flow
            let dv = q.abs() * dt;
            sw[up] -= fw * dv / self.grid.pore_volume(up);
            sw[down] += fw * dv / self.grid.pore_volume(down);
            outflux[up] += q.abs();
        }
        // Wells: water in at the heel, total fluid out at the toe.
        sw[0] += RATE * dt / self.grid.pore_volume(0);
        sw[n - 1] -= state.sw[n - 1] * RATE * dt / self.grid.pore_volume(n - 1);
        outflux[0] += RATE;
        outflux[n - 1] += RATE;

        let so = sw.iter().map(|s| 1.0 - s).collect();
        Ok(SaturationUpdate { sw, so, outflux })
    }
}

fn main() {
    let grid = Grid::uniform(NX, 1, 1, 10.0, 10.0, 2.0, 0.2);
    let state = ReservoirState::uniform(grid.n_cells(), 2.0e7, 0.1);

    let config = SimConfig {
        solver: SolverHandle {
            chain: vec!["cg".into(), "bicgstab".into(), "lu".into()],
            preconditioner: Some("ilu0".into()),
        },
        timer: TimerConfig {
            min_step: 1.0e-2,
            max_step: 2.0e4,
            initial_step: 1.0e2,
            max_cfl: 0.8,
            ..TimerConfig::default()
        },
        end_time: Some(5.0e5),
        ..SimConfig::default()
    };

    let solvers = SolverRegistry::with_builtins();
    let preconditioners = PreconditionerRegistry::with_builtins();
    let provider = TwoPointFlux { grid: grid.clone() };
    let updater = UpwindUpdater { grid: grid.clone() };

    let sim = Simulation::new(config, &solvers, &preconditioners, grid, provider, updater, state)
        .expect("configuration is valid");

    for result in sim {
        match result {
            Ok(report) => println!(
                "step {:>3}  t = {:>10.1}  dt = {:>9.2}  cfl = {:.3}  rejects = {}  [{}]",
                report.step, report.time, report.dt, report.realized_cfl,
                report.rejects_so_far, report.solver
            ),
            Err(err) => {
                eprintln!("run failed: {err}");
                std::process::exit(1);
            }
        }
    }
    println!("reached the horizon");
}
