/// Raw polycrystal geometry as delivered by the tessellation step.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub cells: Vec<Cell>,
    pub faces: Vec<Face>,
}

/// A single control volume carrying one grain orientation.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: usize,
    pub volume: f64,
    pub centroid: [f64; 3],
    /// Index of the orientation this cell starts out in.
    pub grain: usize,
}

/// An interface between two cells.
#[derive(Debug, Clone)]
pub struct Face {
    pub area: f64,
    /// Tuple of (cell1_id, optional cell2_id). `None` indicates a boundary face.
    pub neighbor_cell_ids: (usize, Option<usize>),
    pub centroid: [f64; 3],
}

impl Mesh {
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of faces shared by two cells.
    pub fn num_interior_faces(&self) -> usize {
        self.faces
            .iter()
            .filter(|f| f.neighbor_cell_ids.1.is_some())
            .count()
    }
}
