use std::fs;

use glam::{DVec2, DVec3};

use amgrain::config::SimulationConfig;
use amgrain::discretization::generator::polycrystal_box;
use amgrain::discretization::graph::{MeshGraph, NumericalTolerances};
use amgrain::laser::{PathSample, PathSchedule};
use amgrain::numerics::ExplicitIntegrator;
use amgrain::physics::{PhaseFieldModel, StateVector};
use amgrain::processing::CsvSnapshotWriter;
use amgrain::processing::snapshot::{read_header, restore_snapshot};

fn problem() -> (SimulationConfig, MeshGraph, PathSchedule) {
    let mut config = SimulationConfig::default();
    config.domain = [0.2, 0.1, 0.05];
    config.grid = [10, 5, 3];
    config.num_grains = 3;
    config.report_interval = 25;
    config.end_time = Some(100.0 * config.time_step);
    config.phase.grain_mobility = 1e5;
    config.phase.activation_temperature = 350.0;

    let seeds = [
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(0.1, 0.1, 0.05),
        DVec3::new(0.2, 0.0, 0.0),
    ];
    let mesh = polycrystal_box(config.domain, config.grid, &seeds);
    let graph = MeshGraph::build(&mesh, 3, &NumericalTolerances::default()).unwrap();
    let schedule = PathSchedule::new(vec![
        PathSample {
            time: 0.0,
            position: DVec2::new(0.05, 0.05),
            on: true,
        },
        PathSample {
            time: 1e-5,
            position: DVec2::new(0.15, 0.05),
            on: false,
        },
        PathSample {
            time: 1e-3,
            position: DVec2::new(0.15, 0.05),
            on: false,
        },
    ])
    .unwrap();
    (config, graph, schedule)
}

#[test]
fn restart_from_snapshot_matches_uninterrupted_run() {
    let (config, graph, schedule) = problem();
    let model = PhaseFieldModel::new(&config, &graph);
    let dir = tempfile::tempdir().unwrap();
    let full_dir = dir.path().join("full");
    let resumed_dir = dir.path().join("resumed");

    let mut full = StateVector::initial(&graph, &config);
    let report = ExplicitIntegrator::new(&config)
        .run(
            &model,
            &graph,
            &schedule,
            &mut full,
            &mut CsvSnapshotWriter::new(&full_dir),
        )
        .unwrap();
    assert_eq!(report.steps, 100);
    assert_eq!(report.snapshots_written, 5);
    assert!(full.temperature.max() > config.material.t_ambient);

    let checkpoint = full_dir.join("snapshot_00000050.csv");
    assert_eq!(read_header(&checkpoint).unwrap().step, 50);
    let mut resumed = restore_snapshot(&checkpoint, &graph).unwrap();
    assert_eq!(resumed.step, 50);

    let report = ExplicitIntegrator::new(&config)
        .run(
            &model,
            &graph,
            &schedule,
            &mut resumed,
            &mut CsvSnapshotWriter::new(&resumed_dir),
        )
        .unwrap();
    assert_eq!(report.steps, 50);
    assert_eq!(report.snapshots_written, 2);
    assert_eq!(resumed, full);

    // The resumed run does not rewrite its starting snapshot.
    assert!(!resumed_dir.join("snapshot_00000050.csv").exists());
    let a = fs::read_to_string(full_dir.join("snapshot_00000100.csv")).unwrap();
    let b = fs::read_to_string(resumed_dir.join("snapshot_00000100.csv")).unwrap();
    assert_eq!(a, b);
}
