use crate::renderer::vertex::{flat, Vertex};

/// CPU-side geometry; the renderer uploads it on first draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub label: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(label: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            label: label.into(),
            vertices,
            indices,
        }
    }

    /// Unit quad centred on the origin, spanning [-0.5, 0.5] in x and y.
    pub fn quad() -> Self {
        let vertices = vec![
            flat([-0.5, -0.5, 0.0], [0.0, 1.0]),
            flat([0.5, -0.5, 0.0], [1.0, 1.0]),
            flat([0.5, 0.5, 0.0], [1.0, 0.0]),
            flat([-0.5, 0.5, 0.0], [0.0, 0.0]),
        ];
        Self::new("quad", vertices, vec![0, 2, 1, 0, 3, 2])
    }

    /// Unit quad whose uvs address a circular mask; the diamond mask pipeline
    /// discards everything outside the circle. `Geometry::Diamond` scales it.
    pub fn diamond() -> Self {
        let Self {
            vertices, indices, ..
        } = Self::quad();
        Self::new("diamond", vertices, indices)
    }

    /// `columns` x `rows` independent cells covering [-0.5, 0.5]², one quad per
    /// cell so the pointalism shader can move each cell on its own.
    ///
    /// All four corners of a cell carry the uv of the cell centre; the shader
    /// samples one colour per cell and recovers the centre position from it.
    pub fn grid(columns: u32, rows: u32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let mut vertices = Vec::with_capacity((columns * rows * 4) as usize);
        let mut indices = Vec::with_capacity((columns * rows * 6) as usize);

        let cell_w = 1.0 / columns as f32;
        let cell_h = 1.0 / rows as f32;

        for row in 0..rows {
            for column in 0..columns {
                let u0 = column as f32 * cell_w;
                let v0 = row as f32 * cell_h;
                let (u1, v1) = (u0 + cell_w, v0 + cell_h);
                let centre = [u0 + cell_w * 0.5, v0 + cell_h * 0.5];
                let base = vertices.len() as u32;

                vertices.push(flat([u0 - 0.5, 0.5 - v1, 0.0], centre));
                vertices.push(flat([u1 - 0.5, 0.5 - v1, 0.0], centre));
                vertices.push(flat([u1 - 0.5, 0.5 - v0, 0.0], centre));
                vertices.push(flat([u0 - 0.5, 0.5 - v0, 0.0], centre));

                indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
            }
        }

        Self::new("pointalism-grid", vertices, indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_two_triangles() {
        let quad = Mesh::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.index_count(), 6);
    }

    #[test]
    fn grid_has_one_quad_per_cell() {
        let grid = Mesh::grid(4, 3);
        assert_eq!(grid.vertices.len(), 4 * 3 * 4);
        assert_eq!(grid.index_count(), 4 * 3 * 6);
        assert!(grid
            .indices
            .iter()
            .all(|&i| (i as usize) < grid.vertices.len()));
    }

    #[test]
    fn grid_cells_share_centre_uv() {
        let grid = Mesh::grid(2, 1);
        let first: Vec<_> = grid.vertices[..4].iter().map(|v| v.uv).collect();
        assert!(first.iter().all(|uv| *uv == [0.25, 0.5]));
        assert_eq!(grid.vertices[4].uv, [0.75, 0.5]);
    }

    #[test]
    fn grid_covers_unit_square() {
        let grid = Mesh::grid(2, 2);
        let (min, max) = grid.vertices.iter().fold(
            (f32::MAX, f32::MIN),
            |(lo, hi), v| (lo.min(v.pos[0]), hi.max(v.pos[0])),
        );
        assert_eq!(min, -0.5);
        assert_eq!(max, 0.5);
    }

    #[test]
    fn diamond_is_a_unit_quad() {
        let diamond = Mesh::diamond();
        assert_eq!(diamond.label, "diamond");
        assert!(diamond
            .vertices
            .iter()
            .all(|v| v.pos[0].abs() == 0.5 && v.pos[1].abs() == 0.5));
    }
}
