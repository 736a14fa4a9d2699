//! Axis-aligned bounding boxes over the sample grid

use crate::core::types::{UVec3, Vec3};

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }
}

impl From<CellBounds> for Aabb {
    fn from(cell: CellBounds) -> Self {
        Aabb::new(cell.min.as_vec3(), cell.max.as_vec3())
    }
}

/// Integer bounds of one grid cell: the box spanned by 2x2x2 neighbouring samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellBounds {
    pub min: UVec3,
    pub max: UVec3,
}

impl CellBounds {
    /// The unit cell whose lowest sample is `origin`
    pub fn unit(origin: UVec3) -> Self {
        Self {
            min: origin,
            max: origin + UVec3::ONE,
        }
    }

    /// Sample coordinate of corner `index` (bit 0=x, bit 1=y, bit 2=z)
    pub fn corner(&self, index: u8) -> UVec3 {
        UVec3::new(
            if index & 1 != 0 { self.max.x } else { self.min.x },
            if index & 2 != 0 { self.max.y } else { self.min.y },
            if index & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    /// All eight corner samples
    pub fn corners(&self) -> [UVec3; 8] {
        std::array::from_fn(|i| self.corner(i as u8))
    }

    /// Check whether a sample lies on this cell's box
    pub fn touches_sample(&self, sample: UVec3) -> bool {
        sample.cmpge(self.min).all() && sample.cmple(self.max).all()
    }
}
