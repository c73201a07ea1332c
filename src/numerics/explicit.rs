use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{MaterialParams, PhaseParams, SimulationConfig, SnapshotFailurePolicy};
use crate::discretization::graph::MeshGraph;
use crate::error::SimError;
use crate::laser::PathSchedule;
use crate::numerics::timing;
use crate::physics::{Derivatives, PhysicsModel, StateVector};
use crate::processing::snapshot::{Snapshot, SnapshotSink};

/// Diagnostics gathered at one reporting step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotRecord {
    pub step: u64,
    pub time: f64,
    pub max_temperature: f64,
    pub melted_nodes: usize,
    pub grain_energy: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Steps taken by this run, not counting steps before a restart.
    pub steps: u64,
    pub final_time: f64,
    pub snapshots_written: usize,
    pub failed_snapshots: usize,
    pub melted_nodes: usize,
    pub elapsed: Duration,
    pub history: Vec<SnapshotRecord>,
}

/// Conservative step bound: the inverse of the fastest of the diffusion,
/// phase-relaxation and grain-growth rates.
///
/// Each rate bounds the magnitude of the corresponding Jacobian eigenvalues;
/// forward Euler is stable up to twice the returned value.
pub fn stable_time_step(graph: &MeshGraph, material: &MaterialParams, phase: &PhaseParams) -> f64 {
    let spread = graph.max_diffusion_rate();
    let diffusion = material.diffusivity() * spread;
    // latent heat feeds the melt rate back into temperature across the mushy zone
    let mushy_slope = 1.5 / (material.t_liquidus - material.t_solidus);
    let relaxation =
        phase.phase_mobility * (1.0 + material.latent_heat / material.specific_heat * mushy_slope);
    // curvature of the clamped double well plus the cross term, and the
    // gradient term's share of the graph spectrum
    let grains = phase.grain_mobility
        * (2.0 * phase.bulk_coefficient * (1.0 + phase.interaction)
            + 2.0 * phase.gradient_coefficient * spread);
    let fastest = diffusion.max(relaxation).max(grains);
    if fastest > 0.0 {
        1.0 / fastest
    } else {
        f64::INFINITY
    }
}

/// Forward Euler driver with a double-buffered state.
#[derive(Debug, Clone)]
pub struct ExplicitIntegrator {
    pub dt: f64,
    pub t_start: f64,
    /// Defaults to the end of the laser schedule.
    pub t_end: Option<f64>,
    pub report_interval: u64,
    pub snapshot_failure: SnapshotFailurePolicy,
    derivatives: Option<Derivatives>,
    scratch: Option<StateVector>,
}

impl ExplicitIntegrator {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            dt: config.time_step,
            t_start: config.start_time,
            t_end: config.end_time,
            report_interval: config.report_interval.max(1),
            snapshot_failure: config.snapshot_failure,
            derivatives: None,
            scratch: None,
        }
    }

    pub fn run<M, S>(
        &mut self,
        model: &M,
        graph: &MeshGraph,
        schedule: &PathSchedule,
        state: &mut StateVector,
        sink: &mut S,
    ) -> Result<RunReport, SimError>
    where
        M: PhysicsModel,
        S: SnapshotSink + ?Sized,
    {
        let started = Instant::now();
        timing::reset_timing();
        let t_end = self.t_end.unwrap_or_else(|| schedule.t_max());
        let tolerance = 1e-9 * self.dt;

        let limit = model.stable_time_step(graph);
        if self.dt > limit {
            warn!(
                "time step {:.3e} s exceeds the explicit stability estimate {:.3e} s",
                self.dt, limit
            );
        }
        info!(
            "Starting explicit run: t = {:.6e} -> {:.6e} s, dt = {:.3e} s, {} nodes, {} grains",
            state.time,
            t_end,
            self.dt,
            state.num_nodes(),
            state.num_grains()
        );

        let mut report = RunReport::default();
        let first_step = state.step;
        let mut last_reported = state.step;
        if state.step == 0 {
            self.emit(model, graph, state, sink, &mut report)?;
        }

        while state.time < t_end - tolerance {
            self.step(model, graph, schedule, state)?;
            if state.step % self.report_interval == 0 {
                self.emit(model, graph, state, sink, &mut report)?;
                last_reported = state.step;
            }
        }
        if last_reported != state.step {
            self.emit(model, graph, state, sink, &mut report)?;
        }

        report.steps = state.step - first_step;
        report.final_time = state.time;
        report.melted_nodes = state.melted_count();
        report.elapsed = started.elapsed();
        info!(
            "Finished after {} steps at t = {:.6e} s: {} nodes melted, {} snapshots ({} failed) in {:.2?}",
            report.steps,
            report.final_time,
            report.melted_nodes,
            report.snapshots_written,
            report.failed_snapshots,
            report.elapsed
        );
        Ok(report)
    }

    /// Advance `state` by one time step.
    ///
    /// On divergence `state` is left untouched and the error names the first
    /// non-finite value of the rejected update.
    pub fn step<M: PhysicsModel>(
        &mut self,
        model: &M,
        graph: &MeshGraph,
        schedule: &PathSchedule,
        state: &mut StateVector,
    ) -> Result<(), SimError> {
        let n = state.num_nodes();
        let g = state.num_grains();
        let dt = self.dt;
        let laser = schedule.position_at(state.time);

        let derivatives = match self.derivatives.take() {
            Some(d) if d.num_nodes() == n && d.grains.nrows() == g => d,
            _ => Derivatives::zeros(n, g),
        };
        let derivatives = self.derivatives.insert(derivatives);
        timing::record_rhs(|| model.evaluate(graph, state, &laser, &mut *derivatives));

        let mut next = match self.scratch.take() {
            Some(s) if s.num_nodes() == n && s.num_grains() == g => s,
            _ => state.clone(),
        };

        for ((out, &t), &d) in next
            .temperature
            .iter_mut()
            .zip(state.temperature.iter())
            .zip(&derivatives.temperature)
        {
            *out = t + dt * d;
        }
        for ((out, &z), &d) in next
            .phase
            .iter_mut()
            .zip(state.phase.iter())
            .zip(&derivatives.phase)
        {
            *out = (z + dt * d).clamp(0.0, 1.0);
        }
        for ((out, &e), &d) in next
            .grains
            .as_mut_slice()
            .iter_mut()
            .zip(state.grains.as_slice())
            .zip(derivatives.grains.as_slice())
        {
            *out = e + dt * d;
        }
        for i in 0..n {
            let molten = derivatives.molten[i];
            next.melted[i] = state.melted[i] || molten;
            if molten {
                next.grains.column_mut(i).fill(0.0);
            }
        }
        let seeded = model.nucleate(graph, state, &mut next);
        next.step = state.step + 1;
        next.time = self.t_start + next.step as f64 * dt;

        if let Some((node, field, value)) = next.check_finite() {
            let (step, time) = (next.step, next.time);
            self.scratch = Some(next);
            return Err(SimError::NumericalDivergence {
                step,
                time,
                node,
                field,
                value,
            });
        }

        debug!(
            "step {} t = {:.6e} laser = ({:.4}, {:.4}) {}, {} nodes seeded",
            next.step,
            next.time,
            laser.position.x,
            laser.position.y,
            if laser.on { "on" } else { "off" },
            seeded
        );
        std::mem::swap(state, &mut next);
        self.scratch = Some(next);
        Ok(())
    }

    fn emit<M, S>(
        &self,
        model: &M,
        graph: &MeshGraph,
        state: &StateVector,
        sink: &mut S,
        report: &mut RunReport,
    ) -> Result<(), SimError>
    where
        M: PhysicsModel,
        S: SnapshotSink + ?Sized,
    {
        let grain_energy = model.grain_energy(graph, state);
        let record = SnapshotRecord {
            step: state.step,
            time: state.time,
            max_temperature: state.temperature.max(),
            melted_nodes: state.melted_count(),
            grain_energy,
        };
        report.history.push(record);

        let snapshot = Snapshot {
            graph,
            state,
            grain_energy,
        };
        match timing::record_snapshot(|| sink.write(&snapshot)) {
            Ok(()) => {
                report.snapshots_written += 1;
                info!(
                    "snapshot step {} t = {:.6e} s: T_max = {:.1} K, {} melted, grain energy {:.6e}",
                    record.step, record.time, record.max_temperature, record.melted_nodes, grain_energy
                );
                Ok(())
            }
            Err(source) => {
                let path = sink.target(state.step);
                match self.snapshot_failure {
                    SnapshotFailurePolicy::Abort => Err(SimError::Io { path, source }),
                    SnapshotFailurePolicy::Continue => {
                        warn!("failed to write snapshot {}: {}", path.display(), source);
                        report.failed_snapshots += 1;
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::polycrystal_box;
    use crate::discretization::graph::NumericalTolerances;
    use crate::laser::PathSample;
    use crate::physics::PhaseFieldModel;
    use glam::{DVec2, DVec3};
    use std::io;

    fn setup() -> (SimulationConfig, MeshGraph) {
        let mut config = SimulationConfig::default();
        config.num_grains = 2;
        config.domain = [0.2, 0.1, 0.05];
        config.grid = [4, 2, 1];
        config.report_interval = 4;
        let seeds = [DVec3::new(0.0, 0.0, 0.0), DVec3::new(0.2, 0.1, 0.0)];
        let mesh = polycrystal_box(config.domain, config.grid, &seeds);
        let graph = MeshGraph::build(&mesh, 2, &NumericalTolerances::default()).unwrap();
        (config, graph)
    }

    fn idle_schedule(t_end: f64) -> PathSchedule {
        PathSchedule::new(vec![
            PathSample {
                time: 0.0,
                position: DVec2::ZERO,
                on: false,
            },
            PathSample {
                time: t_end,
                position: DVec2::ZERO,
                on: false,
            },
        ])
        .unwrap()
    }

    fn recorder(steps: &mut Vec<u64>) -> impl FnMut(&Snapshot<'_>) -> io::Result<()> + '_ {
        move |s| {
            steps.push(s.state.step);
            Ok(())
        }
    }

    #[test]
    fn time_is_computed_from_the_step_count() {
        let (config, graph) = setup();
        let model = PhaseFieldModel::new(&config, &graph);
        let schedule = idle_schedule(1.0);
        let mut integrator = ExplicitIntegrator::new(&config);
        let mut state = StateVector::initial(&graph, &config);
        for _ in 0..1000 {
            integrator.step(&model, &graph, &schedule, &mut state).unwrap();
        }
        assert_eq!(state.step, 1000);
        assert_eq!(state.time, 1000.0 * config.time_step);
    }

    #[test]
    fn snapshots_at_start_interval_and_end() {
        let (mut config, graph) = setup();
        config.end_time = Some(10.0 * config.time_step);
        let model = PhaseFieldModel::new(&config, &graph);
        let schedule = idle_schedule(1.0);
        let mut integrator = ExplicitIntegrator::new(&config);
        let mut state = StateVector::initial(&graph, &config);

        let mut steps = Vec::new();
        let mut sink = recorder(&mut steps);
        let report = integrator
            .run(&model, &graph, &schedule, &mut state, &mut sink)
            .unwrap();
        drop(sink);
        assert_eq!(steps, vec![0, 4, 8, 10]);
        assert_eq!(report.steps, 10);
        assert_eq!(report.snapshots_written, 4);
        assert_eq!(report.history.len(), 4);
        assert_eq!(report.melted_nodes, 0);
    }

    #[test]
    fn final_snapshot_is_not_duplicated() {
        let (mut config, graph) = setup();
        config.end_time = Some(8.0 * config.time_step);
        let model = PhaseFieldModel::new(&config, &graph);
        let schedule = idle_schedule(1.0);
        let mut integrator = ExplicitIntegrator::new(&config);
        let mut state = StateVector::initial(&graph, &config);

        let mut steps = Vec::new();
        let mut sink = recorder(&mut steps);
        integrator
            .run(&model, &graph, &schedule, &mut state, &mut sink)
            .unwrap();
        drop(sink);
        assert_eq!(steps, vec![0, 4, 8]);
    }

    #[test]
    fn end_time_defaults_to_the_schedule() {
        let (config, graph) = setup();
        let model = PhaseFieldModel::new(&config, &graph);
        let schedule = idle_schedule(6.0 * config.time_step);
        let mut integrator = ExplicitIntegrator::new(&config);
        let mut state = StateVector::initial(&graph, &config);
        let mut steps = Vec::new();
        let report = integrator
            .run(&model, &graph, &schedule, &mut state, &mut recorder(&mut steps))
            .unwrap();
        assert_eq!(report.steps, 6);
        assert_eq!(steps, vec![0, 4, 6]);
    }

    #[test]
    fn stability_bound_is_positive_and_finite() {
        let (config, graph) = setup();
        let dt = stable_time_step(&graph, &config.material, &config.phase);
        assert!(dt.is_finite() && dt > 0.0);
        assert!(config.time_step < dt);
        let model = PhaseFieldModel::new(&config, &graph);
        assert_eq!(model.stable_time_step(&graph), dt);
    }
}
