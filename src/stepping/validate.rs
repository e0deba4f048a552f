//! Physical validation of a candidate state.

use bitflags::bitflags;

use crate::state::ReservoirState;

bitflags! {
    /// Which physical bounds a candidate state violates.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ValidationFlags: u32 {
        /// A saturation fell outside [0, 1] beyond tolerance.
        const SAT_RANGE    = 0b0001;
        /// Phase saturations do not sum to one within tolerance.
        const SAT_SUM      = 0b0010;
        /// A pressure is non-positive or non-finite.
        const PRESSURE     = 0b0100;
    }
}

/// Bounds checks applied to every candidate state before acceptance.
///
/// The saturation updater is contractually forbidden from clamping its own
/// output, so violations surface here and reject the step rather than being
/// silently repaired.
pub struct StateValidator {
    pub sat_tol: f64,
}

impl StateValidator {
    pub fn new(sat_tol: f64) -> Self {
        Self { sat_tol }
    }

    /// Returns the set of violated bounds; empty means the state is
    /// physically admissible.
    pub fn check(&self, state: &ReservoirState) -> ValidationFlags {
        let mut flags = ValidationFlags::empty();
        let lo = -self.sat_tol;
        let hi = 1.0 + self.sat_tol;
        for (&sw, &so) in state.sw.iter().zip(&state.so) {
            if !(lo..=hi).contains(&sw) || !(lo..=hi).contains(&so) || !sw.is_finite() || !so.is_finite() {
                flags |= ValidationFlags::SAT_RANGE;
            }
            if ((sw + so) - 1.0).abs() > self.sat_tol || !(sw + so).is_finite() {
                flags |= ValidationFlags::SAT_SUM;
            }
        }
        for &p in &state.pressure {
            if !(p > 0.0) || !p.is_finite() {
                flags |= ValidationFlags::PRESSURE;
                break;
            }
        }
        flags
    }
}
