pub mod explicit;
pub mod timing;

pub use explicit::{ExplicitIntegrator, RunReport, SnapshotRecord, stable_time_step};
