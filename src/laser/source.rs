use std::f64::consts::PI;

use glam::DVec3;

use super::path::LaserSample;
use crate::config::LaserParams;

/// Gaussian beam absorbed with Beer-Lambert decay below the top surface.
#[derive(Debug, Clone, Copy)]
pub struct HeatSource {
    peak: f64,
    inv_r2: f64,
    depth: f64,
    surface_z: f64,
}

impl HeatSource {
    pub fn new(params: &LaserParams, surface_z: f64) -> Self {
        let r2 = params.beam_radius * params.beam_radius;
        Self {
            peak: 2.0 * params.absorptivity * params.power / (PI * r2 * params.absorption_depth),
            inv_r2: 1.0 / r2,
            depth: params.absorption_depth,
            surface_z,
        }
    }

    /// Volumetric power density [W/mm^3] deposited at `x`.
    #[inline]
    pub fn density(&self, laser: &LaserSample, x: DVec3) -> f64 {
        if !laser.on {
            return 0.0;
        }
        let d2 = (x.x - laser.position.x).powi(2) + (x.y - laser.position.y).powi(2);
        let below = (self.surface_z - x.z).max(0.0);
        self.peak * (-2.0 * d2 * self.inv_r2).exp() * (-below / self.depth).exp()
    }
}
