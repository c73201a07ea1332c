use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading input data (laser path, geometry, snapshots).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("laser path {path} contains no samples")]
    EmptySchedule { path: PathBuf },
    #[error("{path}:{line}: time {time} does not increase (previous sample at {previous})")]
    NonMonotonicTime {
        path: PathBuf,
        line: usize,
        previous: f64,
        time: f64,
    },
    #[error("mesh contains no cells")]
    EmptyMesh,
    #[error("face {face} references cell {cell}, but the mesh has only {num_cells} cells")]
    DanglingEdge {
        face: usize,
        cell: usize,
        num_cells: usize,
    },
    #[error("face {face} connects cell {cell} to itself")]
    SelfLoop { face: usize, cell: usize },
    #[error("cell {cell} has invalid volume {volume}")]
    InvalidVolume { cell: usize, volume: f64 },
    #[error("cell {cell} has grain {grain}, but only {num_grains} grains are configured")]
    GrainOutOfRange {
        cell: usize,
        grain: usize,
        num_grains: usize,
    },
    #[error("node {node} has no neighbors")]
    IsolatedNode { node: usize },
    #[error("snapshot {path} does not match the mesh: {message}")]
    SnapshotMismatch { path: PathBuf, message: String },
}

/// Inconsistent or out-of-range configuration, detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "numerical divergence at step {step} (t = {time:.6e}): field `{field}` is {value} at node {node}"
    )]
    NumericalDivergence {
        step: u64,
        time: f64,
        node: usize,
        field: String,
        value: f64,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
