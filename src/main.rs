use std::fs;
use std::path::PathBuf;

use amgrain::config::SimulationConfig;
use amgrain::discretization::generator::{polycrystal_box, random_grain_seeds};
use amgrain::discretization::graph::{MeshGraph, NumericalTolerances};
use amgrain::discretization::reader::read_geometry;
use amgrain::laser::PathSchedule;
use amgrain::numerics::timing;
use amgrain::numerics::{ExplicitIntegrator, RunReport};
use amgrain::physics::{PhaseFieldModel, StateVector};
use amgrain::processing::csv_writer;
use amgrain::processing::snapshot::restore_snapshot;
use amgrain::processing::{CsvSnapshotWriter, RunSummary};
use anyhow::{Context, bail};
use clap::Parser;
use log::info;

/// Grain structure evolution under a scanning laser.
#[derive(Parser, Debug)]
#[command(name = "amgrain")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Phase-field microstructure simulation for laser powder-bed fusion", long_about = None)]
struct Cli {
    /// JSON configuration; defaults are used for missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Laser path file (time x y on), overrides `path_file`
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Polycrystal geometry file, overrides `geometry_file`
    #[arg(short, long)]
    geometry: Option<PathBuf>,

    /// Output directory, overrides `output_dir`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG is used when absent
    #[arg(short, long)]
    log_level: Option<String>,

    /// Continue from a snapshot file
    #[arg(long)]
    restart: Option<PathBuf>,
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.format_timestamp_millis().init();
}

fn load_config(cli: &Cli) -> anyhow::Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(path) = &cli.path {
        config.path_file = Some(path.clone());
    }
    if let Some(path) = &cli.geometry {
        config.geometry_file = Some(path.clone());
    }
    if let Some(dir) = &cli.output {
        config.output_dir = dir.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_graph(config: &SimulationConfig) -> anyhow::Result<MeshGraph> {
    let mesh = match &config.geometry_file {
        Some(path) => {
            info!("Reading geometry from {}", path.display());
            read_geometry(path)?
        }
        None => {
            info!(
                "Generating {}x{}x{} polycrystal with {} grains (seed {})",
                config.grid[0], config.grid[1], config.grid[2], config.num_grains, config.seed
            );
            let seeds = random_grain_seeds(config.num_grains, config.domain, config.seed);
            polycrystal_box(config.domain, config.grid, &seeds)
        }
    };
    let graph = MeshGraph::build(&mesh, config.num_grains, &NumericalTolerances::default())
        .context("building the mesh graph")?;
    info!(
        "Mesh graph: {} nodes, {} edges, top surface at z = {:.4} mm",
        graph.num_nodes(),
        graph.num_edges(),
        graph.surface_z()
    );
    Ok(graph)
}

fn save_history(path: PathBuf, report: &RunReport) -> anyhow::Result<()> {
    let h = &report.history;
    csv_writer::write_csv(
        &path,
        &["step", "time", "max_T", "melted_nodes", "grain_energy"],
        &[
            h.iter().map(|r| r.step as f64).collect(),
            h.iter().map(|r| r.time).collect(),
            h.iter().map(|r| r.max_temperature).collect(),
            h.iter().map(|r| r.melted_nodes as f64).collect(),
            h.iter().map(|r| r.grain_energy).collect(),
        ],
    )
    .with_context(|| format!("writing {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = load_config(&cli)?;
    info!("Case `{}`", config.case);

    let Some(path_file) = &config.path_file else {
        bail!("no laser path given; pass --path or set `path_file` in the config");
    };
    let schedule = PathSchedule::from_file(path_file)
        .with_context(|| format!("loading laser path {}", path_file.display()))?;
    info!(
        "Laser path: {} samples from t = {:.6e} to {:.6e} s",
        schedule.len(),
        schedule.t_min(),
        schedule.t_max()
    );

    let graph = load_graph(&config)?;
    let mut state = match &cli.restart {
        Some(path) => {
            let state = restore_snapshot(path, &graph)
                .with_context(|| format!("restarting from {}", path.display()))?;
            info!("Restarting at step {} (t = {:.6e} s)", state.step, state.time);
            state
        }
        None => StateVector::initial(&graph, &config),
    };

    let output = config.output_dir.clone();
    fs::create_dir_all(&output)
        .with_context(|| format!("creating output directory {}", output.display()))?;
    fs::write(output.join("config.json"), serde_json::to_string_pretty(&config)?)
        .context("writing config.json")?;

    let mut summary = RunSummary::from_problem(&config, &graph, &schedule);
    let model = PhaseFieldModel::new(&config, &graph);
    let mut integrator = ExplicitIntegrator::new(&config);
    let mut writer = CsvSnapshotWriter::new(&output);

    let report = integrator.run(&model, &graph, &schedule, &mut state, &mut writer)?;

    save_history(output.join("history.csv"), &report)?;
    let stats = timing::finalize_timing(report.elapsed);
    stats.print_summary();
    summary.add_run_report(&report);
    summary.add_timing(&stats);

    let summary_path = output.join("summary.txt");
    summary
        .write_to_file(&summary_path)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    summary.log().context("rendering run summary")?;
    info!("Summary saved to {}", summary_path.display());
    Ok(())
}
