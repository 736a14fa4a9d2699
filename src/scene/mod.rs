//! Scene graph with deferred registration and background initialization

pub mod entity;
pub mod graph;
pub mod loading;
pub mod node;
pub(crate) mod scheduler;

pub use entity::{Entity, InitContext, UpdateContext};
pub use graph::SceneGraph;
pub use loading::{LoadingProgress, add_async_with_loading_screen, add_loading_screen};
pub use node::{NodeState, SceneNode, SceneNodeId};
