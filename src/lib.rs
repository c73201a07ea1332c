//! Phase-field simulation of grain structure evolution under a moving laser.
//!
//! A polycrystal is discretized as a graph of finite-volume cells. Temperature,
//! a solid/liquid indicator and one order parameter per grain orientation are
//! advanced with forward Euler while a laser follows a scan path.

pub mod config;
pub mod discretization;
pub mod error;
pub mod laser;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use config::SimulationConfig;
pub use error::{ConfigError, LoadError, SimError};
