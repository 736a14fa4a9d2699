//! Grid and bounding-volume helpers

pub mod aabb;

pub use aabb::{Aabb, CellBounds};
