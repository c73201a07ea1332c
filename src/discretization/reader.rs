use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::mesh::{Cell, Face, Mesh};
use crate::error::LoadError;

/// Read a polycrystal geometry file.
///
/// The format is line oriented; `#` starts a comment.
///
/// ```text
/// cell <id> <x> <y> <z> <volume> <grain>
/// face <a> <b|-> <area> <cx> <cy> <cz>
/// ```
///
/// Cell ids must appear in order starting from zero. A `-` in place of the
/// second cell marks a boundary face.
pub fn read_geometry<P: AsRef<Path>>(path: P) -> Result<Mesh, LoadError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_geometry(&text, path)
}

pub fn parse_geometry(text: &str, path: &Path) -> Result<Mesh, LoadError> {
    let mut mesh = Mesh::default();

    for (line_idx, raw) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let parse_err = |message: String| LoadError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };
        let cols: Vec<&str> = content.split_whitespace().collect();

        match cols[0] {
            "cell" => {
                if cols.len() != 7 {
                    return Err(parse_err(format!(
                        "expected 6 values after `cell`, found {}",
                        cols.len() - 1
                    )));
                }
                let id: usize = field(cols[1], "cell id").map_err(&parse_err)?;
                if id != mesh.cells.len() {
                    return Err(parse_err(format!(
                        "cell id {} out of order (expected {})",
                        id,
                        mesh.cells.len()
                    )));
                }
                mesh.cells.push(Cell {
                    id,
                    centroid: [
                        float(cols[2], "x").map_err(&parse_err)?,
                        float(cols[3], "y").map_err(&parse_err)?,
                        float(cols[4], "z").map_err(&parse_err)?,
                    ],
                    volume: float(cols[5], "volume").map_err(&parse_err)?,
                    grain: field(cols[6], "grain").map_err(&parse_err)?,
                });
            }
            "face" => {
                if cols.len() != 7 {
                    return Err(parse_err(format!(
                        "expected 6 values after `face`, found {}",
                        cols.len() - 1
                    )));
                }
                let a: usize = field(cols[1], "cell index").map_err(&parse_err)?;
                let b = match cols[2] {
                    "-" => None,
                    s => Some(field::<usize>(s, "cell index").map_err(&parse_err)?),
                };
                mesh.faces.push(Face {
                    area: float(cols[3], "area").map_err(&parse_err)?,
                    neighbor_cell_ids: (a, b),
                    centroid: [
                        float(cols[4], "cx").map_err(&parse_err)?,
                        float(cols[5], "cy").map_err(&parse_err)?,
                        float(cols[6], "cz").map_err(&parse_err)?,
                    ],
                });
            }
            other => return Err(parse_err(format!("unknown record `{}`", other))),
        }
    }

    Ok(mesh)
}

fn field<T: FromStr>(s: &str, what: &str) -> Result<T, String> {
    s.parse()
        .map_err(|_| format!("invalid {} `{}`", what, s))
}

fn float(s: &str, what: &str) -> Result<f64, String> {
    let v: f64 = field(s, what)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{} `{}` is not finite", what, s))
    }
}
