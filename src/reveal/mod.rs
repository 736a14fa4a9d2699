//! Incremental isosurface reveal over a scalar field

pub mod candidates;
pub mod config;
pub mod extractor;
pub mod field;
pub mod revealer;
pub mod stepper;

pub use candidates::CandidateIndex;
pub use config::RevealerConfig;
pub use extractor::{CrossingMarker, IsosurfaceExtractor, MeshVertex, VERTICES_PER_PRIMITIVE};
pub use field::{ScalarField, VoxelGrid};
pub use revealer::{MeshRevealer, MeshSink, MeshView, VertexBuffer};
pub use stepper::RevealStepper;
