use std::fs;
use std::path::{Path, PathBuf};

use glam::DVec2;

use crate::error::LoadError;

/// One line of the scan schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub time: f64,
    pub position: DVec2,
    pub on: bool,
}

/// Laser state at an arbitrary time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserSample {
    pub position: DVec2,
    pub on: bool,
}

/// Piecewise-linear laser scan path with piecewise-constant power switching.
#[derive(Debug, Clone)]
pub struct PathSchedule {
    samples: Vec<PathSample>,
}

impl PathSchedule {
    /// Validate a schedule built in memory.
    pub fn new(samples: Vec<PathSample>) -> Result<Self, LoadError> {
        let origin = PathBuf::from("<memory>");
        if samples.is_empty() {
            return Err(LoadError::EmptySchedule { path: origin });
        }
        for (i, sample) in samples.iter().enumerate() {
            let values = [sample.time, sample.position.x, sample.position.y];
            if let Some((value, name)) = values
                .into_iter()
                .zip(["time", "x", "y"])
                .find(|(v, _)| !v.is_finite())
            {
                return Err(LoadError::Parse {
                    path: origin,
                    line: i + 1,
                    message: format!("invalid {} `{}`", name, value),
                });
            }
        }
        for (i, pair) in samples.windows(2).enumerate() {
            if !(pair[1].time > pair[0].time) {
                return Err(LoadError::NonMonotonicTime {
                    path: origin,
                    line: i + 2,
                    previous: pair[0].time,
                    time: pair[1].time,
                });
            }
        }
        Ok(Self { samples })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse `time x y on` lines; blank lines and `#` comments are skipped.
    pub fn parse(text: &str, path: &Path) -> Result<Self, LoadError> {
        let mut samples: Vec<PathSample> = Vec::new();

        for (line_idx, raw) in text.lines().enumerate() {
            let line = line_idx + 1;
            let content = raw.trim();
            if content.is_empty() || content.starts_with('#') {
                continue;
            }
            let parse_err = |message: String| LoadError::Parse {
                path: path.to_path_buf(),
                line,
                message,
            };

            let cols: Vec<&str> = content.split_whitespace().collect();
            if cols.len() != 4 {
                return Err(parse_err(format!(
                    "expected 4 columns (time x y on), found {}",
                    cols.len()
                )));
            }
            let mut values = [0.0; 4];
            for (v, (col, name)) in values
                .iter_mut()
                .zip(cols.iter().zip(["time", "x", "y", "on"]))
            {
                *v = col
                    .parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .ok_or_else(|| parse_err(format!("invalid {} `{}`", name, col)))?;
            }
            let on = match values[3] {
                v if v == 0.0 => false,
                v if v == 1.0 => true,
                _ => {
                    return Err(parse_err(format!(
                        "laser flag must be 0 or 1, found `{}`",
                        cols[3]
                    )));
                }
            };

            if let Some(prev) = samples.last() {
                if !(values[0] > prev.time) {
                    return Err(LoadError::NonMonotonicTime {
                        path: path.to_path_buf(),
                        line,
                        previous: prev.time,
                        time: values[0],
                    });
                }
            }
            samples.push(PathSample {
                time: values[0],
                position: DVec2::new(values[1], values[2]),
                on,
            });
        }

        if samples.is_empty() {
            return Err(LoadError::EmptySchedule {
                path: path.to_path_buf(),
            });
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[PathSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn t_min(&self) -> f64 {
        self.samples[0].time
    }

    pub fn t_max(&self) -> f64 {
        self.samples[self.samples.len() - 1].time
    }

    /// Interpolated laser position and on/off state at time `t`.
    ///
    /// Outside `[t_min, t_max]` the laser is off and parked at the nearest end.
    pub fn position_at(&self, t: f64) -> LaserSample {
        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];
        if t < first.time {
            return LaserSample {
                position: first.position,
                on: false,
            };
        }
        if t > last.time {
            return LaserSample {
                position: last.position,
                on: false,
            };
        }

        // Index of the last sample with time <= t.
        let k = self.samples.partition_point(|s| s.time <= t) - 1;
        let current = &self.samples[k];
        let position = match self.samples.get(k + 1) {
            Some(next) => {
                let frac = (t - current.time) / (next.time - current.time);
                current.position.lerp(next.position, frac)
            }
            None => current.position,
        };
        LaserSample {
            position,
            on: current.on,
        }
    }
}
