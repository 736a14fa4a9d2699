//! Scalar fields sampled by the mesh revealer

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3};

/// Smallest edge length accepted by the sphere generator
pub const MIN_SPHERE_EDGE: u32 = 10;

/// Sample value written for occupied voxels
pub const SOLID: u8 = 255;

/// Read-only 3D grid of samples.
///
/// Shared with the revealer's worker thread for the revealer's lifetime.
pub trait ScalarField: Send + Sync {
    fn x_len(&self) -> u32;
    fn y_len(&self) -> u32;
    fn z_len(&self) -> u32;

    /// Sample at integer coordinates inside the grid
    fn value(&self, x: u32, y: u32, z: u32) -> i32;

    fn dims(&self) -> UVec3 {
        UVec3::new(self.x_len(), self.y_len(), self.z_len())
    }

    fn sample(&self, p: UVec3) -> i32 {
        self.value(p.x, p.y, p.z)
    }
}

/// Dense byte grid, x fastest then y then z.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    dims: UVec3,
    data: Vec<u8>,
}

impl VoxelGrid {
    /// Empty grid of the given size
    pub fn new(dims: UVec3) -> Self {
        let len = dims.x as usize * dims.y as usize * dims.z as usize;
        Self {
            dims,
            data: vec![0; len],
        }
    }

    /// Wrap raw samples. `data.len()` must equal the grid volume.
    pub fn from_vec(dims: UVec3, data: Vec<u8>) -> Result<Self> {
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if data.len() != expected {
            return Err(Error::InvalidField(format!(
                "{}x{}x{} grid needs {} samples, got {}",
                dims.x,
                dims.y,
                dims.z,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Solid sphere with a 10% margin to the smallest edge.
    ///
    /// Every sample whose normalized squared distance `(d² - r²) / r²` is
    /// below 0.1 is set to [`SOLID`].
    pub fn sphere(x_len: u32, y_len: u32, z_len: u32) -> Result<Self> {
        if x_len < MIN_SPHERE_EDGE || y_len < MIN_SPHERE_EDGE || z_len < MIN_SPHERE_EDGE {
            return Err(Error::InvalidField(format!(
                "sphere dimensions {}x{}x{} below minimum of {}",
                x_len, y_len, z_len, MIN_SPHERE_EDGE
            )));
        }

        let mut grid = Self::new(UVec3::new(x_len, y_len, z_len));
        let min_edge = x_len.min(y_len).min(z_len) as f32;
        let radius = min_edge * 0.9 / 2.0;
        let radius_sq = radius * radius;
        let center = Vec3::new(x_len as f32, y_len as f32, z_len as f32) / 2.0;

        for z in 0..z_len {
            for y in 0..y_len {
                for x in 0..x_len {
                    let d = Vec3::new(x as f32, y as f32, z as f32).distance_squared(center);
                    if (d - radius_sq) / radius_sq < 0.1 {
                        grid.set(x, y, z, SOLID);
                    }
                }
            }
        }
        Ok(grid)
    }

    #[inline]
    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        x as usize + self.dims.x as usize * (y as usize + z as usize * self.dims.y as usize)
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> u8 {
        self.data[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, value: u8) {
        let i = self.index(x, y, z);
        self.data[i] = value;
    }

    /// Number of samples that are not zero
    pub fn occupied(&self) -> usize {
        self.data.iter().filter(|v| **v != 0).count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ScalarField for VoxelGrid {
    fn x_len(&self) -> u32 {
        self.dims.x
    }

    fn y_len(&self) -> u32 {
        self.dims.y
    }

    fn z_len(&self) -> u32 {
        self.dims.z
    }

    fn value(&self, x: u32, y: u32, z: u32) -> i32 {
        self.get(x, y, z) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_x_fastest() {
        let mut grid = VoxelGrid::new(UVec3::new(3, 4, 5));
        grid.set(1, 2, 3, 7);
        assert_eq!(grid.as_bytes()[1 + 3 * (2 + 3 * 4)], 7);
        assert_eq!(grid.value(1, 2, 3), 7);
        assert_eq!(grid.sample(UVec3::new(1, 2, 3)), 7);
        assert_eq!(grid.dims(), UVec3::new(3, 4, 5));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(VoxelGrid::from_vec(UVec3::splat(2), vec![0; 8]).is_ok());
        assert!(matches!(
            VoxelGrid::from_vec(UVec3::splat(2), vec![0; 7]),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn test_sphere_rejects_small_grids() {
        assert!(matches!(VoxelGrid::sphere(9, 20, 20), Err(Error::InvalidField(_))));
        assert!(matches!(VoxelGrid::sphere(20, 20, 9), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_sphere_is_solid_with_margin() {
        let grid = VoxelGrid::sphere(20, 20, 20).unwrap();
        assert_eq!(grid.get(10, 10, 10), SOLID);
        assert_eq!(grid.get(0, 0, 0), 0);
        assert_eq!(grid.get(19, 19, 19), 0);
        // radius 9 around center 10
        assert_eq!(grid.get(10, 10, 19), SOLID);
        assert_eq!(grid.get(10, 10, 1), SOLID);
        assert_eq!(grid.get(10, 10, 0), 0);
        assert!(grid.occupied() > 0);
        assert!(grid.occupied() < 20 * 20 * 20);
    }
}
