pub mod energy;
pub mod phase_field;
pub mod state;

use crate::discretization::graph::MeshGraph;
use crate::laser::LaserSample;
use nalgebra::DMatrix;

pub use phase_field::PhaseFieldModel;
pub use state::StateVector;

/// Time derivatives of every field, plus the nodes found above the liquidus
/// during evaluation.
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub temperature: Vec<f64>,
    pub phase: Vec<f64>,
    /// One node per column, like [`StateVector::grains`].
    pub grains: DMatrix<f64>,
    pub molten: Vec<bool>,
}

impl Derivatives {
    pub fn zeros(num_nodes: usize, num_grains: usize) -> Self {
        Self {
            temperature: vec![0.0; num_nodes],
            phase: vec![0.0; num_nodes],
            grains: DMatrix::zeros(num_grains, num_nodes),
            molten: vec![false; num_nodes],
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.temperature.len()
    }
}

/// Defines the contract for any physical model driven by the explicit integrator.
pub trait PhysicsModel: Sync {
    /// Number of grain order parameters per node.
    fn num_grains(&self) -> usize;

    /// Fills `out` with the right-hand side `d(state)/dt` for the given laser state.
    /// Must read nothing but `state` and `graph`, so the result is deterministic.
    fn evaluate(
        &self,
        graph: &MeshGraph,
        state: &StateVector,
        laser: &LaserSample,
        out: &mut Derivatives,
    );

    /// Scalar energy reported with every snapshot.
    fn grain_energy(&self, _graph: &MeshGraph, _state: &StateVector) -> f64 {
        0.0
    }

    /// Discrete changes applied to `next` after the Euler update, such as
    /// seeding orientations in re-solidified nodes. `previous` is the state the
    /// derivatives were evaluated on. Returns the number of nodes changed.
    fn nucleate(
        &self,
        _graph: &MeshGraph,
        _previous: &StateVector,
        _next: &mut StateVector,
    ) -> usize {
        0
    }

    /// Largest time step the explicit update is expected to tolerate.
    fn stable_time_step(&self, _graph: &MeshGraph) -> f64 {
        f64::INFINITY
    }
}
