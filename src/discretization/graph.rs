use std::collections::HashMap;

use glam::DVec3;
use rayon::prelude::*;

use super::mesh::Mesh;
use crate::error::LoadError;

#[derive(Clone, Copy, Debug)]
pub struct NumericalTolerances {
    pub min_distance: f64,
    pub min_face_area: f64,
    /// Relative tolerance for deciding whether a boundary face lies on the top plane.
    pub top_plane_rel: f64,
}

impl Default for NumericalTolerances {
    fn default() -> Self {
        Self {
            min_distance: 1e-14,
            min_face_area: 1e-20,
            top_plane_rel: 1e-6,
        }
    }
}

/// An undirected connection between two nodes.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    pub area: f64,
    pub distance: f64,
    /// Geometric scale factor area / distance.
    pub weight: f64,
}

#[derive(Clone, Copy, Debug)]
struct Link {
    node: usize,
    weight: f64,
    area: f64,
}

/// Node/edge structure used for the discrete differential operators.
///
/// Adjacency is stored in CSR form: the neighbors of node `i` are
/// `links[offsets[i]..offsets[i + 1]]`. Every edge appears once in each
/// direction with the same weight.
#[derive(Debug, Clone)]
pub struct MeshGraph {
    positions: Vec<DVec3>,
    volumes: Vec<f64>,
    grains: Vec<usize>,
    top_areas: Vec<f64>,
    offsets: Vec<usize>,
    links: Vec<Link>,
    edges: Vec<Edge>,
    num_grains: usize,
    surface_z: f64,
}

#[inline]
fn raw_distance(p1: [f64; 3], p2: [f64; 3]) -> f64 {
    (0..=2).map(|i| (p2[i] - p1[i]).powi(2)).sum::<f64>().sqrt()
}

impl MeshGraph {
    /// Validate the raw geometry and derive the graph.
    pub fn build(
        mesh: &Mesh,
        num_grains: usize,
        tolerances: &NumericalTolerances,
    ) -> Result<Self, LoadError> {
        let n = mesh.cells.len();
        if n == 0 {
            return Err(LoadError::EmptyMesh);
        }

        for (i, cell) in mesh.cells.iter().enumerate() {
            if !(cell.volume.is_finite() && cell.volume > 0.0) {
                return Err(LoadError::InvalidVolume {
                    cell: i,
                    volume: cell.volume,
                });
            }
            if cell.grain >= num_grains {
                return Err(LoadError::GrainOutOfRange {
                    cell: i,
                    grain: cell.grain,
                    num_grains,
                });
            }
        }

        let check = |face: usize, cell: usize| {
            if cell < n {
                Ok(())
            } else {
                Err(LoadError::DanglingEdge {
                    face,
                    cell,
                    num_cells: n,
                })
            }
        };

        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut boundary: Vec<(usize, f64, f64)> = Vec::new();

        for (face_idx, face) in mesh.faces.iter().enumerate() {
            match face.neighbor_cell_ids {
                (k, Some(l)) => {
                    check(face_idx, k)?;
                    check(face_idx, l)?;
                    if k == l {
                        return Err(LoadError::SelfLoop {
                            face: face_idx,
                            cell: k,
                        });
                    }
                    if face.area < tolerances.min_face_area {
                        continue;
                    }

                    let d = raw_distance(mesh.cells[k].centroid, mesh.cells[l].centroid);
                    let distance = d.max(tolerances.min_distance);
                    if d < tolerances.min_distance {
                        log::warn!(
                            "Clamped distance {:.3e} -> {:.3e} between cells {} and {}",
                            d,
                            distance,
                            k,
                            l
                        );
                    }

                    let key = (k.min(l), k.max(l));
                    match edge_index.get(&key) {
                        Some(&e) => {
                            // Split interfaces between the same pair act in parallel.
                            edges[e].area += face.area;
                            edges[e].weight += face.area / distance;
                        }
                        None => {
                            edge_index.insert(key, edges.len());
                            edges.push(Edge {
                                a: key.0,
                                b: key.1,
                                area: face.area,
                                distance,
                                weight: face.area / distance,
                            });
                        }
                    }
                }
                (k, None) => {
                    check(face_idx, k)?;
                    boundary.push((k, face.area, face.centroid[2]));
                }
            }
        }

        let surface_z = if boundary.is_empty() {
            mesh.cells
                .iter()
                .map(|c| c.centroid[2])
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            boundary
                .iter()
                .map(|&(_, _, z)| z)
                .fold(f64::NEG_INFINITY, f64::max)
        };
        let plane_tol = tolerances.top_plane_rel * surface_z.abs().max(1.0);
        let mut top_areas = vec![0.0; n];
        for &(k, area, z) in &boundary {
            if z >= surface_z - plane_tol {
                top_areas[k] += area;
            }
        }

        let mut degree = vec![0usize; n];
        for e in &edges {
            degree[e.a] += 1;
            degree[e.b] += 1;
        }
        if let Some(node) = degree.iter().position(|&d| d == 0) {
            return Err(LoadError::IsolatedNode { node });
        }

        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        for d in &degree {
            offsets.push(offsets[offsets.len() - 1] + d);
        }
        let mut cursor = offsets[..n].to_vec();
        let mut links = vec![
            Link {
                node: 0,
                weight: 0.0,
                area: 0.0,
            };
            offsets[n]
        ];
        for e in &edges {
            links[cursor[e.a]] = Link {
                node: e.b,
                weight: e.weight,
                area: e.area,
            };
            cursor[e.a] += 1;
            links[cursor[e.b]] = Link {
                node: e.a,
                weight: e.weight,
                area: e.area,
            };
            cursor[e.b] += 1;
        }

        Ok(Self {
            positions: mesh
                .cells
                .iter()
                .map(|c| DVec3::from_array(c.centroid))
                .collect(),
            volumes: mesh.cells.iter().map(|c| c.volume).collect(),
            grains: mesh.cells.iter().map(|c| c.grain).collect(),
            top_areas,
            offsets,
            links,
            edges,
            num_grains,
            surface_z,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.positions.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_grains(&self) -> usize {
        self.num_grains
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn position(&self, i: usize) -> DVec3 {
        self.positions[i]
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn volume(&self, i: usize) -> f64 {
        self.volumes[i]
    }

    pub fn grain(&self, i: usize) -> usize {
        self.grains[i]
    }

    /// Area of the free top surface exposed by node `i` (zero for interior nodes).
    pub fn top_area(&self, i: usize) -> f64 {
        self.top_areas[i]
    }

    /// Height of the top surface the laser shines on.
    pub fn surface_z(&self) -> f64 {
        self.surface_z
    }

    pub fn degree(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Neighbors of node `i` with their edge weights.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.links[self.offsets[i]..self.offsets[i + 1]]
            .iter()
            .map(|l| (l.node, l.weight))
    }

    /// Discrete Laplacian at node `i` of the field sampled by `f`.
    #[inline]
    pub fn laplacian_at(&self, i: usize, f: impl Fn(usize) -> f64) -> f64 {
        let fi = f(i);
        let sum: f64 = self
            .neighbors(i)
            .map(|(j, w)| w * (f(j) - fi))
            .sum();
        sum / self.volumes[i]
    }

    pub fn laplacian(&self, field: &[f64]) -> Vec<f64> {
        (0..self.num_nodes())
            .into_par_iter()
            .map(|i| self.laplacian_at(i, |j| field[j]))
            .collect()
    }

    /// Green-Gauss gradient in difference form.
    pub fn gradient(&self, field: &[f64]) -> Vec<DVec3> {
        (0..self.num_nodes())
            .into_par_iter()
            .map(|i| {
                let xi = self.positions[i];
                let sum = self.links[self.offsets[i]..self.offsets[i + 1]]
                    .iter()
                    .fold(DVec3::ZERO, |acc, l| {
                        let n = (self.positions[l.node] - xi).normalize_or_zero();
                        acc + n * (l.area * 0.5 * (field[l.node] - field[i]))
                    });
                sum / self.volumes[i]
            })
            .collect()
    }

    /// Largest `sum_j w_ij / V_i`; the diffusion stability bound scales with its inverse.
    pub fn max_diffusion_rate(&self) -> f64 {
        (0..self.num_nodes())
            .map(|i| self.neighbors(i).map(|(_, w)| w).sum::<f64>() / self.volumes[i])
            .fold(0.0, f64::max)
    }

    pub fn min_spacing(&self) -> f64 {
        self.edges
            .iter()
            .map(|e| e.distance)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_spacing(&self) -> f64 {
        self.edges.iter().map(|e| e.distance).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::{Cell, Face};

    fn cell(id: usize, x: f64, grain: usize) -> Cell {
        Cell {
            id,
            volume: 1.0,
            centroid: [x, 0.0, 0.0],
            grain,
        }
    }

    fn face(a: usize, b: Option<usize>, x: f64) -> Face {
        Face {
            area: 1.0,
            neighbor_cell_ids: (a, b),
            centroid: [x, 0.0, 0.5],
        }
    }

    fn line(n: usize) -> Mesh {
        Mesh {
            cells: (0..n).map(|i| cell(i, i as f64, 0)).collect(),
            faces: (1..n)
                .map(|i| face(i - 1, Some(i), i as f64 - 0.5))
                .collect(),
        }
    }

    #[test]
    fn adjacency_is_symmetric() {
        let graph = MeshGraph::build(&line(4), 1, &NumericalTolerances::default()).unwrap();
        assert_eq!(graph.num_edges(), 3);
        for i in 0..graph.num_nodes() {
            assert!(graph.degree(i) >= 1);
            for (j, w) in graph.neighbors(i) {
                let back: Vec<f64> = graph
                    .neighbors(j)
                    .filter(|&(k, _)| k == i)
                    .map(|(_, w)| w)
                    .collect();
                assert_eq!(back, vec![w]);
            }
        }
    }

    #[test]
    fn laplacian_of_linear_field_vanishes_inside() {
        let graph = MeshGraph::build(&line(5), 1, &NumericalTolerances::default()).unwrap();
        let field: Vec<f64> = (0..5).map(|i| 2.0 * i as f64 + 1.0).collect();
        let lap = graph.laplacian(&field);
        for v in &lap[1..4] {
            assert!(v.abs() < 1e-12);
        }
        // Insulated ends see only one neighbor.
        assert!((lap[0] - 2.0).abs() < 1e-12);
        assert!((lap[4] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn gradient_of_linear_field_inside() {
        let graph = MeshGraph::build(&line(5), 1, &NumericalTolerances::default()).unwrap();
        let field: Vec<f64> = (0..5).map(|i| 3.0 * i as f64).collect();
        let grad = graph.gradient(&field);
        assert!((grad[2].x - 3.0).abs() < 1e-12);
        assert!(grad[2].y.abs() < 1e-12);
    }

    #[test]
    fn duplicate_faces_are_merged() {
        let mut mesh = line(2);
        mesh.faces.push(face(1, Some(0), 0.5));
        let graph = MeshGraph::build(&mesh, 1, &NumericalTolerances::default()).unwrap();
        assert_eq!(graph.num_edges(), 1);
        assert!((graph.edges()[0].weight - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dangling_face_is_rejected() {
        let mut mesh = line(3);
        mesh.faces.push(face(2, Some(7), 2.5));
        assert!(matches!(
            MeshGraph::build(&mesh, 1, &NumericalTolerances::default()),
            Err(LoadError::DanglingEdge { cell: 7, .. })
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut mesh = line(3);
        mesh.faces.push(face(1, Some(1), 1.0));
        assert!(matches!(
            MeshGraph::build(&mesh, 1, &NumericalTolerances::default()),
            Err(LoadError::SelfLoop { cell: 1, .. })
        ));
    }

    #[test]
    fn single_node_is_isolated() {
        let mesh = Mesh {
            cells: vec![cell(0, 0.0, 0)],
            faces: vec![face(0, None, 0.0)],
        };
        assert!(matches!(
            MeshGraph::build(&mesh, 1, &NumericalTolerances::default()),
            Err(LoadError::IsolatedNode { node: 0 })
        ));
    }

    #[test]
    fn degenerate_face_can_isolate_a_node() {
        let mut mesh = line(3);
        mesh.faces[1].area = 0.0;
        assert!(matches!(
            MeshGraph::build(&mesh, 1, &NumericalTolerances::default()),
            Err(LoadError::IsolatedNode { node: 2 })
        ));
    }

    #[test]
    fn grain_out_of_range_is_rejected() {
        let mut mesh = line(2);
        mesh.cells[1].grain = 3;
        assert!(matches!(
            MeshGraph::build(&mesh, 2, &NumericalTolerances::default()),
            Err(LoadError::GrainOutOfRange { grain: 3, .. })
        ));
    }

    #[test]
    fn empty_mesh_is_rejected() {
        assert!(matches!(
            MeshGraph::build(&Mesh::default(), 1, &NumericalTolerances::default()),
            Err(LoadError::EmptyMesh)
        ));
    }

    #[test]
    fn top_area_collects_faces_on_the_upper_plane() {
        let mut mesh = line(2);
        mesh.faces.push(Face {
            area: 0.25,
            neighbor_cell_ids: (0, None),
            centroid: [0.0, 0.0, 0.5],
        });
        mesh.faces.push(Face {
            area: 0.25,
            neighbor_cell_ids: (1, None),
            centroid: [1.0, 0.0, -0.5],
        });
        let graph = MeshGraph::build(&mesh, 1, &NumericalTolerances::default()).unwrap();
        assert_eq!(graph.surface_z(), 0.5);
        assert_eq!(graph.top_area(0), 0.25);
        assert_eq!(graph.top_area(1), 0.0);
    }
}
