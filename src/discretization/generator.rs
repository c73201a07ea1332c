use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::mesh::{Cell, Face, Mesh};

/// Cell centers of a regular grid over `[0, domain[0]] x [0, domain[1]] x [0, domain[2]]`.
pub fn create_regular_3d_grid(domain: [f64; 3], cells: [usize; 3]) -> Vec<DVec3> {
    let [nx, ny, nz] = cells;
    let dx = domain[0] / nx as f64;
    let dy = domain[1] / ny as f64;
    let dz = domain[2] / nz as f64;

    let mut points = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                points.push(DVec3::new(
                    (i as f64 + 0.5) * dx,
                    (j as f64 + 0.5) * dy,
                    (k as f64 + 0.5) * dz,
                ));
            }
        }
    }
    points
}

/// Build a hexahedral finite-volume mesh of the box, all cells in grain 0.
///
/// Every cell face is emitted once: interior faces connect the two adjacent
/// cells, the six sides of the box become boundary faces.
pub fn create_hex_mesh(domain: [f64; 3], cells: [usize; 3]) -> Mesh {
    let [nx, ny, nz] = cells;
    let h = [
        domain[0] / nx as f64,
        domain[1] / ny as f64,
        domain[2] / nz as f64,
    ];
    let volume = h[0] * h[1] * h[2];
    let areas = [h[1] * h[2], h[0] * h[2], h[0] * h[1]];
    let id = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);

    let centers = create_regular_3d_grid(domain, cells);
    let mesh_cells: Vec<Cell> = centers
        .iter()
        .enumerate()
        .map(|(id, c)| Cell {
            id,
            volume,
            centroid: c.to_array(),
            grain: 0,
        })
        .collect();

    let mut faces = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let here = id(i, j, k);
                let c = centers[here];
                let idx = [i, j, k];
                let dims = [nx, ny, nz];
                for axis in 0..3 {
                    let mut offset = DVec3::ZERO;
                    offset[axis] = 0.5 * h[axis];

                    if idx[axis] == 0 {
                        faces.push(Face {
                            area: areas[axis],
                            neighbor_cell_ids: (here, None),
                            centroid: (c - offset).to_array(),
                        });
                    }
                    let upper = if idx[axis] + 1 < dims[axis] {
                        let mut n = idx;
                        n[axis] += 1;
                        Some(id(n[0], n[1], n[2]))
                    } else {
                        None
                    };
                    faces.push(Face {
                        area: areas[axis],
                        neighbor_cell_ids: (here, upper),
                        centroid: (c + offset).to_array(),
                    });
                }
            }
        }
    }

    Mesh {
        cells: mesh_cells,
        faces,
    }
}

/// Uniformly distributed grain centers, reproducible through `seed`.
pub fn random_grain_seeds(num_grains: usize, domain: [f64; 3], seed: u64) -> Vec<DVec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_grains)
        .map(|_| {
            DVec3::new(
                rng.gen_range(0.0..domain[0]),
                rng.gen_range(0.0..domain[1]),
                rng.gen_range(0.0..domain[2]),
            )
        })
        .collect()
}

/// Give every cell the orientation of its nearest seed, i.e. a Voronoi
/// tessellation of the seeds sampled at the cell centroids.
pub fn assign_grains(mesh: &mut Mesh, seeds: &[DVec3]) {
    if seeds.is_empty() {
        return;
    }
    for cell in &mut mesh.cells {
        let c = DVec3::from_array(cell.centroid);
        cell.grain = seeds
            .iter()
            .enumerate()
            .map(|(g, s)| (g, c.distance_squared(*s)))
            .fold((0, f64::INFINITY), |best, cur| {
                if cur.1 < best.1 { cur } else { best }
            })
            .0;
    }
}

/// Convenience wrapper producing a hexahedral polycrystal of the box.
pub fn polycrystal_box(domain: [f64; 3], cells: [usize; 3], seeds: &[DVec3]) -> Mesh {
    let mut mesh = create_hex_mesh(domain, cells);
    assign_grains(&mut mesh, seeds);
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::graph::{MeshGraph, NumericalTolerances};

    #[test]
    fn hex_mesh_face_counts() {
        let mesh = create_hex_mesh([2.0, 1.0, 1.0], [2, 1, 1]);
        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.num_interior_faces(), 1);
        assert_eq!(mesh.faces.len(), 11);
        let total: f64 = mesh.cells.iter().map(|c| c.volume).sum();
        assert!((total - 2.0).abs() < 1e-12);
    }

    #[test]
    fn generated_polycrystal_builds_a_valid_graph() {
        let domain = [1.0, 0.5, 0.25];
        let seeds = random_grain_seeds(5, domain, 7);
        let mesh = polycrystal_box(domain, [8, 4, 2], &seeds);
        let graph = MeshGraph::build(&mesh, 5, &NumericalTolerances::default()).unwrap();
        assert_eq!(graph.num_nodes(), 64);
        // 7*4*2 + 8*3*2 + 8*4*1
        assert_eq!(graph.num_edges(), 56 + 48 + 32);
        assert!((graph.surface_z() - 0.25).abs() < 1e-12);
        let top: f64 = (0..graph.num_nodes()).map(|i| graph.top_area(i)).sum();
        assert!((top - 0.5).abs() < 1e-12);
        for i in 0..graph.num_nodes() {
            assert!(graph.degree(i) >= 3);
            assert!(graph.grain(i) < 5);
        }
    }

    #[test]
    fn seeds_are_reproducible() {
        let a = random_grain_seeds(3, [1.0, 1.0, 1.0], 42);
        let b = random_grain_seeds(3, [1.0, 1.0, 1.0], 42);
        assert_eq!(a, b);
    }

    #[test]
    fn nearest_seed_wins() {
        let mut mesh = create_hex_mesh([2.0, 1.0, 1.0], [2, 1, 1]);
        assign_grains(
            &mut mesh,
            &[DVec3::new(1.9, 0.5, 0.5), DVec3::new(0.1, 0.5, 0.5)],
        );
        assert_eq!(mesh.cells[0].grain, 1);
        assert_eq!(mesh.cells[1].grain, 0);
    }
}
