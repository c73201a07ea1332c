pub mod csv_writer;
pub mod snapshot;
pub mod summary;

pub use snapshot::{CsvSnapshotWriter, Snapshot, SnapshotSink};
pub use summary::RunSummary;
