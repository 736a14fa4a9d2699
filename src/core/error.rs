//! Error types for marchscape

use thiserror::Error;

use crate::scene::SceneNodeId;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("node {node:?} already has parent {parent:?}")]
    AlreadyParented {
        node: SceneNodeId,
        parent: SceneNodeId,
    },

    #[error("node {node:?} is not committed to its parent yet")]
    NotRegistered { node: SceneNodeId },

    #[error("node {node:?} is not initialized")]
    NotInitialized { node: SceneNodeId },

    #[error("adding {node:?} under {parent:?} would create a cycle")]
    WouldCycle {
        node: SceneNodeId,
        parent: SceneNodeId,
    },

    #[error("unknown scene node {0:?}")]
    UnknownNode(SceneNodeId),

    #[error("no scene root above node {node:?}")]
    NoSchedulingRoot { node: SceneNodeId },

    #[error("node {node:?} is still attached or initializing")]
    NodeAttached { node: SceneNodeId },

    #[error("initialization of {node:?} failed: {reason}")]
    Initialization { node: SceneNodeId, reason: String },

    #[error("mesh revealer is busy")]
    RevealerBusy,

    #[error("worker stopped: {0}")]
    WorkerStopped(String),

    #[error("progress {0} is outside 0..=100")]
    ProgressOutOfRange(i32),

    #[error("invalid scalar field: {0}")]
    InvalidField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
