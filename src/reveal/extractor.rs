//! Isosurface extraction seam and mesh vertex layout

use bytemuck::{Pod, Zeroable};

use crate::core::types::Vec3;
use crate::math::{Aabb, CellBounds};

use super::field::ScalarField;

/// Vertices per triangle; the revealer counts in triangles.
pub const VERTICES_PER_PRIMITIVE: usize = 3;

/// Position-only vertex, laid out for direct upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Turns one cell of a scalar field into triangles.
///
/// Must be pure: the revealer calls it exactly once per candidate cell, on
/// its worker thread, and relies on the vertex count being a multiple of
/// [`VERTICES_PER_PRIMITIVE`].
pub trait IsosurfaceExtractor: Send + Sync {
    fn polygonize(&self, field: &dyn ScalarField, iso_level: i32, cell: CellBounds) -> Vec<MeshVertex>;
}

impl<F> IsosurfaceExtractor for F
where
    F: Fn(&dyn ScalarField, i32, CellBounds) -> Vec<MeshVertex> + Send + Sync,
{
    fn polygonize(&self, field: &dyn ScalarField, iso_level: i32, cell: CellBounds) -> Vec<MeshVertex> {
        self(field, iso_level, cell)
    }
}

/// Coarse preview extractor: one small triangle at the center of every
/// cell whose corners lie on both sides of the iso level.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossingMarker;

impl CrossingMarker {
    /// Corner mask, bit set for corners at or above `iso_level`
    pub fn corner_mask(field: &dyn ScalarField, iso_level: i32, cell: CellBounds) -> u8 {
        cell.corners()
            .iter()
            .enumerate()
            .filter(|(_, c)| field.sample(**c) >= iso_level)
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }
}

impl IsosurfaceExtractor for CrossingMarker {
    fn polygonize(&self, field: &dyn ScalarField, iso_level: i32, cell: CellBounds) -> Vec<MeshVertex> {
        let mask = Self::corner_mask(field, iso_level, cell);
        if mask == 0 || mask == 0xFF {
            return Vec::new();
        }

        let center = Aabb::from(cell).center();
        let r = 0.25;
        vec![
            MeshVertex::new(center + Vec3::new(-r, -r, 0.0)),
            MeshVertex::new(center + Vec3::new(r, -r, 0.0)),
            MeshVertex::new(center + Vec3::new(0.0, r, 0.0)),
        ]
    }
}
