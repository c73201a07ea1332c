pub mod path;
pub mod source;

pub use path::{LaserSample, PathSample, PathSchedule};
pub use source::HeatSource;
