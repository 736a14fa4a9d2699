//! Sparse index of cells that may contribute geometry.
//!
//! Cells are the unit boxes between 2x2x2 neighbouring samples, so a field
//! of `n` samples per axis has `n - 1` cells per axis. A cell is a candidate
//! when any of its eight corner samples is non-zero. Candidates are listed
//! in generation order: x fastest, then y, then z.

use std::time::Instant;

use crate::core::types::UVec3;
use crate::math::CellBounds;

use super::field::ScalarField;

/// Candidate cells of one field, computed in a single pass.
#[derive(Clone, Debug)]
pub struct CandidateIndex {
    cell_dims: UVec3,
    /// Linear cell indices into the cell grid
    cells: Vec<u64>,
}

impl CandidateIndex {
    pub fn build(field: &dyn ScalarField) -> Self {
        let start = Instant::now();
        let dims = field.dims();
        let cell_dims = dims.saturating_sub(UVec3::ONE);
        let mut cells = Vec::new();

        // Per-sample occupancy of the two z-slices spanned by one row of cells
        let slice = dims.x as usize * dims.y as usize;
        let occupied = |z: u32| -> Vec<bool> {
            let mut out = Vec::with_capacity(slice);
            for y in 0..dims.y {
                for x in 0..dims.x {
                    out.push(field.value(x, y, z) != 0);
                }
            }
            out
        };

        if cell_dims.cmpgt(UVec3::ZERO).all() {
            let mut lower = occupied(0);
            for z in 0..cell_dims.z {
                let upper = occupied(z + 1);
                for y in 0..cell_dims.y {
                    for x in 0..cell_dims.x {
                        let hit = [(0, 0), (1, 0), (0, 1), (1, 1)].iter().any(|(dx, dy)| {
                            let i = (y + dy) as usize * dims.x as usize + (x + dx) as usize;
                            lower[i] || upper[i]
                        });
                        if hit {
                            cells.push(linear_index(cell_dims, x, y, z));
                        }
                    }
                }
                lower = upper;
            }
        }

        log::info!(
            "Candidate index: {} of {} cells in {}x{}x{} field ({:.1}ms)",
            cells.len(),
            cell_dims.x as u64 * cell_dims.y as u64 * cell_dims.z as u64,
            dims.x,
            dims.y,
            dims.z,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Self { cell_dims, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells per axis
    pub fn cell_dims(&self) -> UVec3 {
        self.cell_dims
    }

    /// Lowest sample of the `ordinal`-th candidate
    pub fn cell(&self, ordinal: usize) -> Option<UVec3> {
        let index = *self.cells.get(ordinal)?;
        let row = u64::from(self.cell_dims.x);
        let plane = row * u64::from(self.cell_dims.y);
        let z = index / plane;
        let rem = index % plane;
        Some(UVec3::new((rem % row) as u32, (rem / row) as u32, z as u32))
    }

    pub fn bounds(&self, ordinal: usize) -> Option<CellBounds> {
        self.cell(ordinal).map(CellBounds::unit)
    }
}

/// x fastest, then y, then z; wide enough for any `u32` grid.
fn linear_index(cell_dims: UVec3, x: u32, y: u32, z: u32) -> u64 {
    let row = u64::from(cell_dims.x);
    let plane = row * u64::from(cell_dims.y);
    u64::from(x) + row * u64::from(y) + plane * u64::from(z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reveal::field::VoxelGrid;

    #[test]
    fn test_single_interior_sample_touches_eight_cells() {
        let mut grid = VoxelGrid::new(UVec3::splat(10));
        grid.set(4, 5, 6, 255);
        let index = CandidateIndex::build(&grid);

        assert_eq!(index.cell_dims(), UVec3::splat(9));
        assert_eq!(index.len(), 8);
        for k in 0..index.len() {
            let bounds = index.bounds(k).unwrap();
            assert!(bounds.touches_sample(UVec3::new(4, 5, 6)));
        }
        assert_eq!(index.cell(0), Some(UVec3::new(3, 4, 5)));
        assert_eq!(index.cell(1), Some(UVec3::new(4, 4, 5)));
        assert_eq!(index.cell(7), Some(UVec3::new(4, 5, 6)));
        assert_eq!(index.cell(8), None);
    }

    #[test]
    fn test_corner_sample_touches_one_cell() {
        let mut grid = VoxelGrid::new(UVec3::splat(10));
        grid.set(9, 9, 9, 1);
        let index = CandidateIndex::build(&grid);
        assert_eq!(index.len(), 1);
        assert_eq!(index.cell(0), Some(UVec3::splat(8)));
    }

    #[test]
    fn test_empty_and_degenerate_fields() {
        let empty = CandidateIndex::build(&VoxelGrid::new(UVec3::splat(10)));
        assert!(empty.is_empty());

        let mut flat = VoxelGrid::new(UVec3::new(10, 10, 1));
        flat.set(3, 3, 0, 255);
        let index = CandidateIndex::build(&flat);
        assert!(index.is_empty());
        assert_eq!(index.cell_dims(), UVec3::new(9, 9, 0));
    }

    #[test]
    fn test_generation_order_is_x_fastest() {
        let grid = VoxelGrid::sphere(12, 12, 12).unwrap();
        let index = CandidateIndex::build(&grid);
        let linear: Vec<u32> = (0..index.len())
            .map(|k| {
                let c = index.cell(k).unwrap();
                c.x + 11 * (c.y + 11 * c.z)
            })
            .collect();
        assert!(linear.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cell_lookup_beyond_u32_range() {
        let cell_dims = UVec3::new(70_000, 70_000, 4);
        let far = UVec3::new(69_999, 12_345, 3);
        let linear = linear_index(cell_dims, far.x, far.y, far.z);
        assert!(linear > u64::from(u32::MAX));

        let index = CandidateIndex {
            cell_dims,
            cells: vec![0, linear],
        };
        assert_eq!(index.cell(0), Some(UVec3::ZERO));
        assert_eq!(index.cell(1), Some(far));
        assert_eq!(index.cell(2), None);
    }
}
