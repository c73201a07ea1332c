use nalgebra::{DMatrix, DVector};

use crate::config::SimulationConfig;
use crate::discretization::graph::MeshGraph;

/// Below this fraction no orientation is considered dominant.
pub const UNDETERMINED_GRAIN_THRESHOLD: f64 = 0.5;

/// Per-node physical state of the build.
///
/// Grain fractions are stored with one node per column so that the
/// orientation vector of a node is contiguous in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    pub temperature: DVector<f64>,
    /// 1 = solid, 0 = liquid.
    pub phase: DVector<f64>,
    pub grains: DMatrix<f64>,
    /// Set once a node has exceeded the liquidus; never cleared.
    pub melted: Vec<bool>,
    pub step: u64,
    pub time: f64,
}

impl StateVector {
    /// Ambient, fully solid, one-hot in the initial grain, nothing melted.
    pub fn initial(graph: &MeshGraph, config: &SimulationConfig) -> Self {
        let n = graph.num_nodes();
        let g = graph.num_grains();
        let mut grains = DMatrix::zeros(g, n);
        for i in 0..n {
            grains[(graph.grain(i), i)] = 1.0;
        }
        Self {
            temperature: DVector::from_element(n, config.material.t_ambient),
            phase: DVector::from_element(n, 1.0),
            grains,
            melted: vec![false; n],
            step: 0,
            time: config.start_time,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.temperature.len()
    }

    pub fn num_grains(&self) -> usize {
        self.grains.nrows()
    }

    /// Orientation fractions of node `i`.
    pub fn grain_fractions(&self, i: usize) -> &[f64] {
        let g = self.num_grains();
        &self.grains.as_slice()[i * g..(i + 1) * g]
    }

    pub fn dominant_grain(&self, i: usize) -> Option<usize> {
        let (k, v) = self
            .grain_fractions(i)
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            });
        (v >= UNDETERMINED_GRAIN_THRESHOLD).then_some(k)
    }

    pub fn melted_count(&self) -> usize {
        self.melted.iter().filter(|&&m| m).count()
    }

    /// First non-finite value as `(node, field, value)`.
    pub fn check_finite(&self) -> Option<(usize, String, f64)> {
        if let Some((i, &v)) = self
            .temperature
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
        {
            return Some((i, "temperature".to_string(), v));
        }
        if let Some((i, &v)) = self.phase.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Some((i, "zeta".to_string(), v));
        }
        let g = self.num_grains();
        self.grains
            .as_slice()
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(idx, &v)| (idx / g, format!("eta_{}", idx % g), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::polycrystal_box;
    use crate::discretization::graph::NumericalTolerances;
    use glam::DVec3;

    fn two_grain_state() -> (MeshGraph, StateVector) {
        let mut config = SimulationConfig::default();
        config.num_grains = 2;
        let seeds = [DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0)];
        let mesh = polycrystal_box([1.0, 0.5, 0.5], [4, 2, 2], &seeds);
        let graph = MeshGraph::build(&mesh, 2, &NumericalTolerances::default()).unwrap();
        let state = StateVector::initial(&graph, &config);
        (graph, state)
    }

    #[test]
    fn initial_state_is_ambient_solid_one_hot() {
        let (graph, state) = two_grain_state();
        assert_eq!(state.num_nodes(), 16);
        assert_eq!(state.num_grains(), 2);
        for i in 0..state.num_nodes() {
            assert_eq!(state.temperature[i], 300.0);
            assert_eq!(state.phase[i], 1.0);
            assert!(!state.melted[i]);
            let eta = state.grain_fractions(i);
            assert_eq!(eta.iter().sum::<f64>(), 1.0);
            assert_eq!(eta[graph.grain(i)], 1.0);
            assert_eq!(state.dominant_grain(i), Some(graph.grain(i)));
        }
        assert_eq!(state.step, 0);
        assert!(state.check_finite().is_none());
    }

    #[test]
    fn zeroed_fractions_are_undetermined() {
        let (_, mut state) = two_grain_state();
        state.grains.column_mut(3).fill(0.0);
        assert_eq!(state.dominant_grain(3), None);
    }

    #[test]
    fn check_finite_names_the_field() {
        let (_, mut state) = two_grain_state();
        state.grains[(1, 5)] = f64::NAN;
        let (node, field, value) = state.check_finite().unwrap();
        assert_eq!(node, 5);
        assert_eq!(field, "eta_1");
        assert!(value.is_nan());

        state.temperature[2] = f64::INFINITY;
        assert_eq!(state.check_finite().unwrap().1, "temperature");
    }
}
