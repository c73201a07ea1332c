//! Free energy of the multi-grain order parameters.
//!
//! The bulk density is a sum of double wells plus a cross term that penalizes
//! two orientations coexisting at one node:
//!
//! ```text
//! f(eta) = m * sum_k (eta_k^4 / 4 - eta_k^2 / 2) + m * gamma * sum_{k<l} eta_k^2 eta_l^2
//! ```
//!
//! The density is written generically over [`DualNum`] so that the hand-coded
//! driving force can be checked against automatic differentiation.

use num_dual::DualNum;

use crate::config::PhaseParams;
use crate::discretization::graph::MeshGraph;
use crate::physics::state::StateVector;

/// Order parameters are clamped to this range before evaluating the
/// double-well force, which keeps the cubic term bounded.
pub const ETA_CLAMP: (f64, f64) = (-0.5, 1.5);

pub fn free_energy_density<T: DualNum<f64>>(eta: &[T], m: f64, gamma: f64) -> T {
    let mut s2 = T::from(0.0);
    let mut s4 = T::from(0.0);
    for e in eta {
        let e2 = e.clone() * e.clone();
        s4 = s4 + e2.clone() * e2.clone();
        s2 = s2 + e2;
    }
    let well = s4.clone() * T::from(0.25) - s2.clone() * T::from(0.5);
    // sum_{k<l} a_k a_l = ((sum a)^2 - sum a^2) / 2 with a = eta^2
    let cross = (s2.clone() * s2 - s4) * T::from(0.5);
    well * T::from(m) + cross * T::from(m * gamma)
}

/// Partial derivatives of [`free_energy_density`] with respect to each
/// order parameter, written into `out`.
#[inline]
pub fn driving_force(eta: &[f64], m: f64, gamma: f64, out: &mut [f64]) {
    let (lo, hi) = ETA_CLAMP;
    let s2: f64 = eta.iter().map(|e| e.clamp(lo, hi).powi(2)).sum();
    for (o, e) in out.iter_mut().zip(eta) {
        let e = e.clamp(lo, hi);
        let e2 = e * e;
        *o = m * (e2 * e - e + 2.0 * gamma * e * (s2 - e2));
    }
}

/// Equilibrium phase indicator: 1 below the solidus, 0 above the liquidus,
/// smoothstep in between.
#[inline]
pub fn phase_equilibrium(t: f64, t_solidus: f64, t_liquidus: f64) -> f64 {
    let s = ((t - t_solidus) / (t_liquidus - t_solidus)).clamp(0.0, 1.0);
    1.0 - s * s * (3.0 - 2.0 * s)
}

/// Total grain energy: volume-weighted bulk energy plus the discrete gradient
/// energy `kappa / 2 * sum_edges w_ij |eta_i - eta_j|^2`.
pub fn total_grain_energy(graph: &MeshGraph, state: &StateVector, params: &PhaseParams) -> f64 {
    let m = params.bulk_coefficient;
    let gamma = params.interaction;
    let bulk: f64 = (0..graph.num_nodes())
        .map(|i| graph.volume(i) * free_energy_density(state.grain_fractions(i), m, gamma))
        .sum();
    let gradient: f64 = graph
        .edges()
        .iter()
        .map(|e| {
            let diff2: f64 = state
                .grain_fractions(e.a)
                .iter()
                .zip(state.grain_fractions(e.b))
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            e.weight * diff2
        })
        .sum();
    bulk + 0.5 * params.gradient_coefficient * gradient
}
