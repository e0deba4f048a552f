//! Physical state advanced by the step loop.

pub mod grid;
pub use grid::Grid;

use serde::{Deserialize, Serialize};

/// Two-phase (water/oil) state on a 3D grid: one pressure and one
/// saturation pair per cell.
///
/// The step loop owns exactly one live instance plus the candidate produced
/// by an in-flight step; accepted candidates replace the live state, rejected
/// ones are dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReservoirState {
    pub pressure: Vec<f64>,
    pub sw: Vec<f64>,
    pub so: Vec<f64>,
}

impl ReservoirState {
    /// Uniform initial state.
    pub fn uniform(n_cells: usize, pressure: f64, sw: f64) -> Self {
        Self {
            pressure: vec![pressure; n_cells],
            sw: vec![sw; n_cells],
            so: vec![1.0 - sw; n_cells],
        }
    }

    pub fn n_cells(&self) -> usize {
        self.pressure.len()
    }
}
