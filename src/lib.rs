//! Marchscape - deferred scene graph scheduling and incremental isosurface reveal

pub mod core;
pub mod math;
pub mod worker;
pub mod scene;
pub mod reveal;
