use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::config::SimulationConfig;
use crate::discretization::graph::MeshGraph;
use crate::laser::PathSchedule;
use crate::numerics::explicit::{RunReport, stable_time_step};
use crate::numerics::timing::TimingStats;

pub struct RunSummary {
    pub case: String,

    // Mesh info
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_grains: usize,
    pub top_nodes: usize,
    pub extent_min: [f64; 3],
    pub extent_max: [f64; 3],
    pub min_spacing: f64,
    pub max_spacing: f64,
    pub avg_volume: f64,

    // Time stepping
    pub time_step: f64,
    pub stable_time_step: f64,
    pub diffusivity: f64,

    // Laser path
    pub path_samples: usize,
    pub path_span: (f64, f64),

    // Filled in after the run
    pub steps: Option<u64>,
    pub final_time: Option<f64>,
    pub snapshots_written: Option<usize>,
    pub failed_snapshots: Option<usize>,
    pub melted_nodes: Option<usize>,
    pub final_grain_energy: Option<f64>,
    pub wall_time: Option<f64>,
    pub timing: Vec<String>,
}

impl RunSummary {
    pub fn from_problem(config: &SimulationConfig, graph: &MeshGraph, schedule: &PathSchedule) -> Self {
        let mut extent_min = [f64::INFINITY; 3];
        let mut extent_max = [f64::NEG_INFINITY; 3];
        for p in graph.positions() {
            for (axis, v) in p.to_array().into_iter().enumerate() {
                extent_min[axis] = extent_min[axis].min(v);
                extent_max[axis] = extent_max[axis].max(v);
            }
        }
        let n = graph.num_nodes();
        let avg_volume = (0..n).map(|i| graph.volume(i)).sum::<f64>() / n.max(1) as f64;

        Self {
            case: config.case.clone(),
            num_nodes: n,
            num_edges: graph.num_edges(),
            num_grains: graph.num_grains(),
            top_nodes: (0..n).filter(|&i| graph.top_area(i) > 0.0).count(),
            extent_min,
            extent_max,
            min_spacing: graph.min_spacing(),
            max_spacing: graph.max_spacing(),
            avg_volume,
            time_step: config.time_step,
            stable_time_step: stable_time_step(graph, &config.material, &config.phase),
            diffusivity: config.material.diffusivity(),
            path_samples: schedule.len(),
            path_span: (schedule.t_min(), schedule.t_max()),
            steps: None,
            final_time: None,
            snapshots_written: None,
            failed_snapshots: None,
            melted_nodes: None,
            final_grain_energy: None,
            wall_time: None,
            timing: Vec::new(),
        }
    }

    pub fn add_run_report(&mut self, report: &RunReport) {
        self.steps = Some(report.steps);
        self.final_time = Some(report.final_time);
        self.snapshots_written = Some(report.snapshots_written);
        self.failed_snapshots = Some(report.failed_snapshots);
        self.melted_nodes = Some(report.melted_nodes);
        self.final_grain_energy = report.history.last().map(|r| r.grain_energy);
        self.wall_time = Some(report.elapsed.as_secs_f64());
    }

    pub fn add_timing(&mut self, stats: &TimingStats) {
        self.timing = stats.summary_lines();
    }

    pub fn render(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_report(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn write_report<W: Write>(&self, s: &mut W) -> io::Result<()> {
        writeln!(s, "{}", "=".repeat(60))?;
        writeln!(s, "AM MICROSTRUCTURE RUN SUMMARY: {}", self.case)?;
        writeln!(s, "{}", "=".repeat(60))?;
        writeln!(s)?;

        writeln!(s, "MESH STATISTICS")?;
        writeln!(s, "{}", "-".repeat(60))?;
        writeln!(s, "Number of nodes:     {}", self.num_nodes)?;
        writeln!(s, "Number of edges:     {}", self.num_edges)?;
        writeln!(s, "Top-surface nodes:   {}", self.top_nodes)?;
        writeln!(s, "Grain orientations:  {}", self.num_grains)?;
        writeln!(
            s,
            "Centroid extent:     [{:.4}, {:.4}, {:.4}] to [{:.4}, {:.4}, {:.4}] mm",
            self.extent_min[0],
            self.extent_min[1],
            self.extent_min[2],
            self.extent_max[0],
            self.extent_max[1],
            self.extent_max[2]
        )?;
        writeln!(s, "Min node spacing:    {:.6e} mm", self.min_spacing)?;
        writeln!(s, "Max node spacing:    {:.6e} mm", self.max_spacing)?;
        writeln!(s, "Avg cell volume:     {:.6e} mm^3", self.avg_volume)?;
        writeln!(s)?;

        writeln!(s, "TIME STEPPING")?;
        writeln!(s, "{}", "-".repeat(60))?;
        writeln!(s, "Thermal diffusivity: {:.6e} mm^2/s", self.diffusivity)?;
        writeln!(s, "Time step:           {:.6e} s", self.time_step)?;
        writeln!(
            s,
            "Stability estimate:  {:.6e} s  (dt = {:.3} x estimate)",
            self.stable_time_step,
            self.time_step / self.stable_time_step
        )?;
        writeln!(
            s,
            "Laser path:          {} samples, t = {:.6e} to {:.6e} s",
            self.path_samples, self.path_span.0, self.path_span.1
        )?;
        writeln!(s)?;

        if let (Some(steps), Some(t)) = (self.steps, self.final_time) {
            writeln!(s, "RUN")?;
            writeln!(s, "{}", "-".repeat(60))?;
            writeln!(s, "Steps:               {}", steps)?;
            writeln!(s, "Final time:          {:.6e} s", t)?;
            if let Some(m) = self.melted_nodes {
                writeln!(
                    s,
                    "Melted nodes:        {} ({:.2}%)",
                    m,
                    100.0 * m as f64 / self.num_nodes.max(1) as f64
                )?;
            }
            if let (Some(ok), Some(failed)) = (self.snapshots_written, self.failed_snapshots) {
                writeln!(s, "Snapshots:           {} written, {} failed", ok, failed)?;
            }
            if let Some(e) = self.final_grain_energy {
                writeln!(s, "Final grain energy:  {:.6e}", e)?;
            }
            if let Some(w) = self.wall_time {
                writeln!(s, "Wall time:           {:.3} s", w)?;
            }
            writeln!(s)?;
        }

        if !self.timing.is_empty() {
            writeln!(s, "TIMING")?;
            writeln!(s, "{}", "-".repeat(60))?;
            for line in &self.timing {
                writeln!(s, "{}", line)?;
            }
            writeln!(s)?;
        }

        writeln!(s, "{}", "=".repeat(60))
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_report(&mut file)?;
        file.flush()
    }

    pub fn log(&self) -> io::Result<()> {
        for line in self.render()?.lines().filter(|l| !l.is_empty()) {
            info!("{}", line);
        }
        Ok(())
    }
}
