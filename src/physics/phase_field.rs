use rayon::prelude::*;

use super::energy::{driving_force, phase_equilibrium, total_grain_energy};
use super::{Derivatives, PhysicsModel, StateVector};
use crate::config::{MaterialParams, PhaseParams, SimulationConfig};
use crate::discretization::graph::MeshGraph;
use crate::laser::{HeatSource, LaserSample};
use crate::numerics::explicit::stable_time_step;

/// Stefan-Boltzmann constant in W/(mm^2 K^4).
pub const STEFAN_BOLTZMANN: f64 = 5.670374419e-14;

/// Coupled heat, solid/liquid and grain-growth model.
#[derive(Debug, Clone)]
pub struct PhaseFieldModel {
    pub material: MaterialParams,
    pub phase: PhaseParams,
    source: HeatSource,
    num_grains: usize,
}

impl PhaseFieldModel {
    pub fn new(config: &SimulationConfig, graph: &MeshGraph) -> Self {
        Self {
            material: config.material.clone(),
            phase: config.phase.clone(),
            source: HeatSource::new(&config.laser, graph.surface_z()),
            num_grains: graph.num_grains(),
        }
    }

    /// Convective and radiative loss through the top face, per unit volume.
    #[inline]
    fn surface_loss(&self, graph: &MeshGraph, i: usize, t: f64) -> f64 {
        let a_top = graph.top_area(i);
        if a_top <= 0.0 {
            return 0.0;
        }
        let m = &self.material;
        let ta = m.t_ambient;
        let flux = m.h_conv * (t - ta) + m.emissivity * STEFAN_BOLTZMANN * (t.powi(4) - ta.powi(4));
        a_top / graph.volume(i) * flux
    }

    /// Allen-Cahn rate of node `i`, written into `deta`.
    ///
    /// Only solid, hot nodes evolve, and only solid neighbors contribute to
    /// the Laplacian.
    #[inline]
    fn grain_rate(
        &self,
        graph: &MeshGraph,
        i: usize,
        temperature: f64,
        zeta: &[f64],
        eta: &[f64],
        deta: &mut [f64],
    ) {
        let p = &self.phase;
        let g = self.num_grains;
        if zeta[i] < p.solid_gate || temperature < p.activation_temperature {
            deta.fill(0.0);
            return;
        }
        let own = &eta[i * g..(i + 1) * g];
        driving_force(own, p.bulk_coefficient, p.interaction, deta);

        let scale = p.gradient_coefficient / graph.volume(i);
        for (j, w) in graph.neighbors(i) {
            if zeta[j] < p.solid_gate {
                continue;
            }
            let other = &eta[j * g..(j + 1) * g];
            for ((d, a), b) in deta.iter_mut().zip(own).zip(other) {
                *d -= scale * w * (b - a);
            }
        }
        for d in deta.iter_mut() {
            *d *= -p.grain_mobility;
        }
    }

    /// Orientation a re-solidified node grows from: the dominant grain with
    /// the largest total edge weight among its solid neighbors. Ties go to the
    /// lower grain index.
    fn epitaxial_grain(&self, graph: &MeshGraph, state: &StateVector, i: usize) -> Option<usize> {
        let mut weights = vec![0.0; self.num_grains];
        for (j, w) in graph.neighbors(i) {
            if state.phase[j] < self.phase.solid_gate {
                continue;
            }
            if let Some(k) = state.dominant_grain(j) {
                weights[k] += w;
            }
        }
        weights
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, w)| w > 0.0)
            .fold(None, |best: Option<(usize, f64)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            })
            .map(|(k, _)| k)
    }
}

impl PhysicsModel for PhaseFieldModel {
    fn num_grains(&self) -> usize {
        self.num_grains
    }

    fn evaluate(
        &self,
        graph: &MeshGraph,
        state: &StateVector,
        laser: &LaserSample,
        out: &mut Derivatives,
    ) {
        let m = &self.material;
        let g = self.num_grains;
        let alpha = m.diffusivity();
        let rho_cp = m.heat_capacity();
        let latent = m.latent_heat / m.specific_heat;
        let mobility = self.phase.phase_mobility;

        let temps = state.temperature.as_slice();
        let zeta = state.phase.as_slice();
        let eta = state.grains.as_slice();

        out.temperature
            .par_iter_mut()
            .zip(out.phase.par_iter_mut())
            .zip(out.grains.as_mut_slice().par_chunks_mut(g))
            .zip(out.molten.par_iter_mut())
            .enumerate()
            .for_each(|(i, (((d_temp, d_zeta), d_eta), molten))| {
                let t = temps[i];
                let rate = mobility * (phase_equilibrium(t, m.t_solidus, m.t_liquidus) - zeta[i]);

                let q = self.source.density(laser, graph.position(i))
                    - self.surface_loss(graph, i, t);
                *d_temp = alpha * graph.laplacian_at(i, |j| temps[j]) + q / rho_cp + latent * rate;
                *d_zeta = rate;
                *molten = t > m.t_liquidus;

                self.grain_rate(graph, i, t, zeta, eta, d_eta);
            });
    }

    /// Melted nodes that are solid again but carry no dominant orientation
    /// take the grain of their solid neighbors. Nodes without such a neighbor
    /// are retried on later steps as the solid front closes in.
    fn nucleate(&self, graph: &MeshGraph, previous: &StateVector, next: &mut StateVector) -> usize {
        let gate = self.phase.solid_gate;
        let mut seeded = 0;
        for i in 0..next.num_nodes() {
            if !next.melted[i]
                || next.phase[i] < gate
                || previous.temperature[i] > self.material.t_liquidus
                || next.dominant_grain(i).is_some()
            {
                continue;
            }
            if let Some(k) = self.epitaxial_grain(graph, previous, i) {
                let mut column = next.grains.column_mut(i);
                column.fill(0.0);
                column[k] = 1.0;
                seeded += 1;
            }
        }
        seeded
    }

    fn grain_energy(&self, graph: &MeshGraph, state: &StateVector) -> f64 {
        total_grain_energy(graph, state, &self.phase)
    }

    fn stable_time_step(&self, graph: &MeshGraph) -> f64 {
        stable_time_step(graph, &self.material, &self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::polycrystal_box;
    use crate::discretization::graph::NumericalTolerances;
    use glam::{DVec2, DVec3};

    const OFF: LaserSample = LaserSample {
        position: DVec2::ZERO,
        on: false,
    };

    fn setup(num_grains: usize) -> (SimulationConfig, MeshGraph) {
        let mut config = SimulationConfig::default();
        config.num_grains = num_grains;
        config.domain = [0.4, 0.2, 0.1];
        config.grid = [8, 4, 2];
        let seeds: Vec<DVec3> = (0..num_grains)
            .map(|k| DVec3::new(0.4 * k as f64 / num_grains as f64, 0.1, 0.05))
            .collect();
        let mesh = polycrystal_box(config.domain, config.grid, &seeds);
        let graph = MeshGraph::build(&mesh, num_grains, &NumericalTolerances::default()).unwrap();
        (config, graph)
    }

    #[test]
    fn ambient_state_is_stationary() {
        let (config, graph) = setup(3);
        let model = PhaseFieldModel::new(&config, &graph);
        let state = StateVector::initial(&graph, &config);
        let mut d = Derivatives::zeros(graph.num_nodes(), 3);
        model.evaluate(&graph, &state, &OFF, &mut d);

        assert!(d.temperature.iter().all(|&v| v == 0.0));
        assert!(d.phase.iter().all(|&v| v == 0.0));
        assert!(d.grains.iter().all(|&v| v == 0.0));
        assert!(d.molten.iter().all(|&m| !m));
    }

    #[test]
    fn laser_heats_the_surface_under_the_beam() {
        let (config, graph) = setup(2);
        let model = PhaseFieldModel::new(&config, &graph);
        let state = StateVector::initial(&graph, &config);
        let mut d = Derivatives::zeros(graph.num_nodes(), 2);
        let laser = LaserSample {
            position: DVec2::new(0.2, 0.1),
            on: true,
        };
        model.evaluate(&graph, &state, &laser, &mut d);

        let hottest = (0..graph.num_nodes())
            .max_by(|&a, &b| d.temperature[a].total_cmp(&d.temperature[b]))
            .unwrap();
        assert!(d.temperature[hottest] > 0.0);
        assert!(graph.top_area(hottest) > 0.0);
        assert!(d.temperature.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn hot_surface_loses_heat() {
        let (config, graph) = setup(1);
        let model = PhaseFieldModel::new(&config, &graph);
        let mut state = StateVector::initial(&graph, &config);
        state.temperature.fill(1000.0);
        let mut d = Derivatives::zeros(graph.num_nodes(), 1);
        model.evaluate(&graph, &state, &OFF, &mut d);
        for i in 0..graph.num_nodes() {
            if graph.top_area(i) > 0.0 {
                assert!(d.temperature[i] < 0.0);
            } else {
                assert_eq!(d.temperature[i], 0.0);
            }
        }
    }

    #[test]
    fn melting_absorbs_latent_heat() {
        let (config, graph) = setup(1);
        let model = PhaseFieldModel::new(&config, &graph);
        let mut state = StateVector::initial(&graph, &config);
        state.temperature.fill(2000.0);
        let mut d = Derivatives::zeros(graph.num_nodes(), 1);
        model.evaluate(&graph, &state, &OFF, &mut d);
        let interior = (0..graph.num_nodes())
            .find(|&i| graph.top_area(i) == 0.0)
            .unwrap();
        assert!(d.phase[interior] < 0.0);
        assert!(d.temperature[interior] < 0.0);
        assert!(d.molten.iter().all(|&m| m));
    }

    #[test]
    fn grain_term_is_gated_by_phase_and_temperature() {
        let (config, graph) = setup(2);
        let model = PhaseFieldModel::new(&config, &graph);
        let mut state = StateVector::initial(&graph, &config);
        state.grains.fill(0.3);

        let mut d = Derivatives::zeros(graph.num_nodes(), 2);
        model.evaluate(&graph, &state, &OFF, &mut d);
        assert!(d.grains.iter().all(|&v| v == 0.0), "cold nodes must not evolve");

        state.temperature.fill(1200.0);
        model.evaluate(&graph, &state, &OFF, &mut d);
        assert!(d.grains.iter().all(|&v| v > 0.0), "hot mixed nodes grow toward the well");

        state.phase.fill(0.0);
        model.evaluate(&graph, &state, &OFF, &mut d);
        assert!(d.grains.iter().all(|&v| v == 0.0), "liquid nodes must not evolve");
    }

    #[test]
    fn resolidified_node_takes_the_grain_of_its_solid_neighbors() {
        let (config, graph) = setup(2);
        let model = PhaseFieldModel::new(&config, &graph);
        let node = 0;
        let mut previous = StateVector::initial(&graph, &config);
        for (j, _) in graph.neighbors(node) {
            previous.grains.column_mut(j).fill(0.0);
            previous.grains[(1, j)] = 1.0;
        }
        previous.grains.column_mut(node).fill(0.0);
        previous.melted[node] = true;
        previous.phase[node] = 0.4;

        let mut next = previous.clone();
        next.phase[node] = 0.6;
        assert_eq!(model.nucleate(&graph, &previous, &mut next), 1);
        assert_eq!(next.grain_fractions(node), &[0.0, 1.0]);

        // Already seeded: nothing left to do.
        assert_eq!(model.nucleate(&graph, &previous, &mut next), 0);
    }

    #[test]
    fn nucleation_waits_for_solid_neighbors_and_cooling() {
        let (config, graph) = setup(2);
        let model = PhaseFieldModel::new(&config, &graph);
        let node = 0;
        let mut previous = StateVector::initial(&graph, &config);
        previous.grains.column_mut(node).fill(0.0);
        previous.melted[node] = true;

        // Every neighbor still liquid.
        for (j, _) in graph.neighbors(node) {
            previous.phase[j] = 0.0;
        }
        let mut next = previous.clone();
        assert_eq!(model.nucleate(&graph, &previous, &mut next), 0);
        assert_eq!(next.dominant_grain(node), None);

        // Solid neighbors, but the node was above the liquidus this step.
        previous.phase.fill(1.0);
        previous.temperature[node] = 2000.0;
        let mut next = previous.clone();
        assert_eq!(model.nucleate(&graph, &previous, &mut next), 0);

        // Never melted: an empty node is left alone.
        previous.temperature[node] = config.material.t_ambient;
        previous.melted[node] = false;
        let mut next = previous.clone();
        assert_eq!(model.nucleate(&graph, &previous, &mut next), 0);
        assert_eq!(next.dominant_grain(node), None);
    }
}
