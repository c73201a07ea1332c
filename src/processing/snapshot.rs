//! Snapshot files: one CSV per reporting step, lossless so a run can be
//! restarted from any of them.
//!
//! ```text
//! # {"step":1000,"time":0.0002,"num_nodes":2500,"num_grains":20,"grain_energy":-0.0025}
//! node,x,y,z,T,zeta,grain,melt,grad_T,eta_0,...,eta_19
//! 0,1e-2,1e-2,1e-2,3e2,1e0,7,0,0e0,0e0,...
//! ```

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::csv_writer::{format_float, write_row};
use crate::discretization::graph::MeshGraph;
use crate::error::LoadError;
use crate::physics::StateVector;

/// State handed to a [`SnapshotSink`] at a reporting step.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub graph: &'a MeshGraph,
    pub state: &'a StateVector,
    pub grain_energy: f64,
}

/// Metadata stored in the first line of every snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub step: u64,
    pub time: f64,
    pub num_nodes: usize,
    pub num_grains: usize,
    pub grain_energy: f64,
}

/// Receives snapshots from the integrator.
pub trait SnapshotSink {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> io::Result<()>;

    /// Where the snapshot for `step` ends up, used in error reports.
    fn target(&self, step: u64) -> PathBuf {
        PathBuf::from(format!("<snapshot {}>", step))
    }
}

impl<F> SnapshotSink for F
where
    F: FnMut(&Snapshot<'_>) -> io::Result<()>,
{
    fn write(&mut self, snapshot: &Snapshot<'_>) -> io::Result<()> {
        self(snapshot)
    }
}

pub fn snapshot_file_name(step: u64) -> String {
    format!("snapshot_{:08}.csv", step)
}

/// Writes `snapshot_{step:08}.csv` files into a directory.
#[derive(Debug, Clone)]
pub struct CsvSnapshotWriter {
    dir: PathBuf,
}

impl CsvSnapshotWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotSink for CsvSnapshotWriter {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.target(snapshot.state.step);
        // A file only appears under its final name once it is complete.
        let partial = path.with_extension("csv.partial");
        write_snapshot(&partial, snapshot)?;
        fs::rename(&partial, &path)
    }

    fn target(&self, step: u64) -> PathBuf {
        self.dir.join(snapshot_file_name(step))
    }
}

pub fn write_snapshot<P: AsRef<Path>>(path: P, snapshot: &Snapshot<'_>) -> io::Result<()> {
    let Snapshot {
        graph,
        state,
        grain_energy,
    } = *snapshot;
    let n = state.num_nodes();
    let g = state.num_grains();
    if graph.num_nodes() != n {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("state has {} nodes, mesh has {}", n, graph.num_nodes()),
        ));
    }

    let header = SnapshotHeader {
        step: state.step,
        time: state.time,
        num_nodes: n,
        num_grains: g,
        grain_energy,
    };
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# {}", serde_json::to_string(&header)?)?;

    let mut columns: Vec<String> = ["node", "x", "y", "z", "T", "zeta", "grain", "melt", "grad_T"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    columns.extend((0..g).map(|k| format!("eta_{}", k)));
    write_row(&mut out, &columns)?;

    let grad_t = graph.gradient(state.temperature.as_slice());
    let mut row = Vec::with_capacity(columns.len());
    for i in 0..n {
        row.clear();
        let x = graph.position(i);
        row.push(i.to_string());
        row.extend([x.x, x.y, x.z].map(format_float));
        row.push(format_float(state.temperature[i]));
        row.push(format_float(state.phase[i]));
        row.push(match state.dominant_grain(i) {
            Some(k) => k.to_string(),
            None => "-1".to_string(),
        });
        row.push(if state.melted[i] { "1" } else { "0" }.to_string());
        row.push(format_float(grad_t[i].length()));
        row.extend(state.grain_fractions(i).iter().map(|&v| format_float(v)));
        write_row(&mut out, &row)?;
    }
    out.flush()
}

/// Read the metadata line of a snapshot.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<SnapshotHeader, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_header(&first, path)
}

fn parse_header(line: &str, path: &Path) -> Result<SnapshotHeader, LoadError> {
    let json = line
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| LoadError::Parse {
            path: path.to_path_buf(),
            line: 1,
            message: "missing `#` metadata header".to_string(),
        })?;
    serde_json::from_str(json.trim()).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        line: 1,
        message: format!("invalid metadata: {}", e),
    })
}

/// Restore the full state stored in a snapshot file.
pub fn read_snapshot<P: AsRef<Path>>(path: P, num_grains: usize) -> Result<StateVector, LoadError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mismatch = |message: String| LoadError::SnapshotMismatch {
        path: path.to_path_buf(),
        message,
    };

    let mut lines = text.lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => parse_header(line, path)?,
        None => return Err(mismatch("file is empty".to_string())),
    };
    if header.num_grains != num_grains {
        return Err(mismatch(format!(
            "snapshot has {} grains, expected {}",
            header.num_grains, num_grains
        )));
    }
    let (n, g) = (header.num_nodes, header.num_grains);
    // column header line
    lines.next();

    let mut temperature = DVector::zeros(n);
    let mut phase = DVector::zeros(n);
    let mut grains = DMatrix::zeros(g, n);
    let mut melted = vec![false; n];
    let mut rows = 0;

    for (line_idx, raw) in lines {
        let line = line_idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let parse_err = |message: String| LoadError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };
        let cols: Vec<&str> = raw.split(',').collect();
        if cols.len() != 9 + g {
            return Err(parse_err(format!(
                "expected {} columns, found {}",
                9 + g,
                cols.len()
            )));
        }
        let node: usize = cols[0]
            .parse()
            .map_err(|_| parse_err(format!("invalid node index `{}`", cols[0])))?;
        if node != rows || node >= n {
            return Err(parse_err(format!("unexpected node index {}", node)));
        }
        let float = |s: &str| {
            s.parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .ok_or_else(|| parse_err(format!("invalid number `{}`", s)))
        };
        temperature[node] = float(cols[4])?;
        phase[node] = float(cols[5])?;
        melted[node] = match cols[7] {
            "0" => false,
            "1" => true,
            other => return Err(parse_err(format!("invalid melt flag `{}`", other))),
        };
        for (k, col) in cols[9..].iter().enumerate() {
            grains[(k, node)] = float(col)?;
        }
        rows += 1;
    }
    if rows != n {
        return Err(mismatch(format!("header announces {} nodes, found {}", n, rows)));
    }

    Ok(StateVector {
        temperature,
        phase,
        grains,
        melted,
        step: header.step,
        time: header.time,
    })
}

/// [`read_snapshot`] plus a check that the state fits `graph`.
pub fn restore_snapshot<P: AsRef<Path>>(path: P, graph: &MeshGraph) -> Result<StateVector, LoadError> {
    let path = path.as_ref();
    let state = read_snapshot(path, graph.num_grains())?;
    if state.num_nodes() != graph.num_nodes() {
        return Err(LoadError::SnapshotMismatch {
            path: path.to_path_buf(),
            message: format!(
                "snapshot has {} nodes, mesh has {}",
                state.num_nodes(),
                graph.num_nodes()
            ),
        });
    }
    Ok(state)
}
