//! Structured 3D grid geometry.

use serde::{Deserialize, Serialize};

/// Regular hexahedral grid with per-cell porosity.
///
/// The stepping core only needs cell counts and pore volumes (for the
/// realized-CFL computation); everything else about the grid belongs to the
/// discretization collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Cell dimensions, uniform across the grid.
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Porosity per cell, `nx * ny * nz` entries.
    pub porosity: Vec<f64>,
}

impl Grid {
    pub fn uniform(nx: usize, ny: usize, nz: usize, dx: f64, dy: f64, dz: f64, porosity: f64) -> Self {
        Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
            porosity: vec![porosity; nx * ny * nz],
        }
    }

    pub fn n_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    /// Pore volume of cell `i`.
    pub fn pore_volume(&self, i: usize) -> f64 {
        self.porosity[i] * self.cell_volume()
    }
}
