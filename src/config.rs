use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What to do when a snapshot cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFailurePolicy {
    #[default]
    Abort,
    /// Log the failure and keep stepping.
    Continue,
}

/// Thermophysical properties of the alloy (mm, s, K, W, kg).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialParams {
    pub t_ambient: f64,
    pub t_solidus: f64,
    pub t_liquidus: f64,
    /// [kg/mm^3]
    pub density: f64,
    /// [J/(kg K)]
    pub specific_heat: f64,
    /// [W/(mm K)]
    pub conductivity: f64,
    /// [J/kg]
    pub latent_heat: f64,
    /// Convective film coefficient of the top surface [W/(mm^2 K)].
    pub h_conv: f64,
    pub emissivity: f64,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            t_ambient: 300.0,
            t_solidus: 1648.0,
            t_liquidus: 1673.0,
            density: 8.0e-6,
            specific_heat: 500.0,
            conductivity: 0.02,
            latent_heat: 2.7e5,
            h_conv: 1e-5,
            emissivity: 0.3,
        }
    }
}

impl MaterialParams {
    /// Thermal diffusivity k / (rho c_p) [mm^2/s].
    pub fn diffusivity(&self) -> f64 {
        self.conductivity / (self.density * self.specific_heat)
    }

    /// Volumetric heat capacity rho c_p [J/(mm^3 K)].
    pub fn heat_capacity(&self) -> f64 {
        self.density * self.specific_heat
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserParams {
    /// [W]
    pub power: f64,
    /// 1/e^2 radius of the Gaussian spot [mm].
    pub beam_radius: f64,
    pub absorptivity: f64,
    /// Beer-Lambert penetration depth below the top surface [mm].
    pub absorption_depth: f64,
}

impl Default for LaserParams {
    fn default() -> Self {
        Self {
            power: 80.0,
            beam_radius: 0.03,
            absorptivity: 0.4,
            absorption_depth: 0.01,
        }
    }
}

/// Phase-field coefficients for the melt indicator and the grain order parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseParams {
    /// Relaxation rate of the phase indicator towards equilibrium [1/s].
    pub phase_mobility: f64,
    /// Allen-Cahn mobility L_g of the grain order parameters [1/s].
    pub grain_mobility: f64,
    /// Height m of the double well.
    pub bulk_coefficient: f64,
    /// Cross-term strength gamma penalizing overlapping grains.
    pub interaction: f64,
    /// Gradient energy coefficient kappa [mm^2].
    pub gradient_coefficient: f64,
    /// Minimum phase indicator at which a node counts as solid.
    pub solid_gate: f64,
    /// Below this temperature grain boundaries do not move.
    pub activation_temperature: f64,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            phase_mobility: 1e5,
            grain_mobility: 1e3,
            bulk_coefficient: 1.0,
            interaction: 1.5,
            gradient_coefficient: 1e-5,
            solid_gate: 0.5,
            activation_temperature: 1000.0,
        }
    }
}

/// Immutable run configuration, built once and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub case: String,
    /// Domain length, width and height [mm].
    pub domain: [f64; 3],
    /// Cells per axis for the generated polycrystal.
    pub grid: [usize; 3],
    pub num_grains: usize,
    /// Seed for the generated grain centers.
    pub seed: u64,
    pub time_step: f64,
    pub start_time: f64,
    /// Defaults to the last sample of the laser path.
    pub end_time: Option<f64>,
    /// Steps between two snapshots.
    pub report_interval: u64,
    pub snapshot_failure: SnapshotFailurePolicy,
    pub path_file: Option<PathBuf>,
    pub geometry_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub material: MaterialParams,
    pub laser: LaserParams,
    pub phase: PhaseParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            case: "fd_example".to_string(),
            domain: [1.0, 0.2, 0.1],
            grid: [50, 10, 5],
            num_grains: 20,
            seed: 1,
            time_step: 2e-7,
            start_time: 0.0,
            end_time: None,
            report_interval: 1000,
            snapshot_failure: SnapshotFailurePolicy::Abort,
            path_file: None,
            geometry_file: None,
            output_dir: PathBuf::from("output"),
            material: MaterialParams::default(),
            laser: LaserParams::default(),
            phase: PhaseParams::default(),
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be finite and positive",
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be finite and non-negative",
        })
    }
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("domain.length", self.domain[0]),
            ("domain.width", self.domain[1]),
            ("domain.height", self.domain[2]),
        ] {
            positive(name, value)?;
        }
        for (name, cells) in [
            ("grid.x", self.grid[0]),
            ("grid.y", self.grid[1]),
            ("grid.z", self.grid[2]),
        ] {
            if cells == 0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    value: 0.0,
                    reason: "at least one cell per axis is required",
                });
            }
        }
        if self.num_grains == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "num_grains",
                value: 0.0,
                reason: "at least one grain orientation is required",
            });
        }
        if self.report_interval == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "report_interval",
                value: 0.0,
                reason: "must be at least one step",
            });
        }
        positive("time_step", self.time_step)?;
        if !self.start_time.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "start_time",
                value: self.start_time,
                reason: "must be finite",
            });
        }
        if let Some(end) = self.end_time {
            if !(end.is_finite() && end >= self.start_time) {
                return Err(ConfigError::InvalidParameter {
                    name: "end_time",
                    value: end,
                    reason: "must be finite and not before start_time",
                });
            }
        }

        let m = &self.material;
        positive("material.t_ambient", m.t_ambient)?;
        positive("material.t_solidus", m.t_solidus)?;
        positive("material.t_liquidus", m.t_liquidus)?;
        if m.t_solidus >= m.t_liquidus {
            return Err(ConfigError::InvalidParameter {
                name: "material.t_solidus",
                value: m.t_solidus,
                reason: "must be below t_liquidus",
            });
        }
        positive("material.density", m.density)?;
        positive("material.specific_heat", m.specific_heat)?;
        positive("material.conductivity", m.conductivity)?;
        non_negative("material.latent_heat", m.latent_heat)?;
        non_negative("material.h_conv", m.h_conv)?;
        if !(0.0..=1.0).contains(&m.emissivity) {
            return Err(ConfigError::InvalidParameter {
                name: "material.emissivity",
                value: m.emissivity,
                reason: "must lie in [0, 1]",
            });
        }

        let l = &self.laser;
        non_negative("laser.power", l.power)?;
        positive("laser.beam_radius", l.beam_radius)?;
        positive("laser.absorption_depth", l.absorption_depth)?;
        if !(0.0..=1.0).contains(&l.absorptivity) {
            return Err(ConfigError::InvalidParameter {
                name: "laser.absorptivity",
                value: l.absorptivity,
                reason: "must lie in [0, 1]",
            });
        }

        let p = &self.phase;
        non_negative("phase.phase_mobility", p.phase_mobility)?;
        non_negative("phase.grain_mobility", p.grain_mobility)?;
        non_negative("phase.bulk_coefficient", p.bulk_coefficient)?;
        non_negative("phase.interaction", p.interaction)?;
        non_negative("phase.gradient_coefficient", p.gradient_coefficient)?;
        non_negative("phase.activation_temperature", p.activation_temperature)?;
        if !(p.solid_gate > 0.0 && p.solid_gate <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "phase.solid_gate",
                value: p.solid_gate,
                reason: "must lie in (0, 1]",
            });
        }
        Ok(())
    }
}
