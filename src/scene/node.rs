//! Scene graph node types
//!
//! Core types for the scene graph arena: node IDs, lifecycle states,
//! the lock-guarded staging lists and the node record itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::progress::ProgressReporter;

use super::entity::Entity;
use super::scheduler::Scheduler;

/// Unique identifier for a scene graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneNodeId(pub u64);

/// Where a node is in its attach/detach lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// No parent.
    Detached,
    /// Parent set, initialization running on the root's worker.
    Initializing,
    /// Waiting in the parent's pending-add list.
    PendingAdd,
    /// In the parent's committed children.
    Committed,
    /// Waiting in the parent's pending-remove list.
    PendingRemove,
    /// Initialization failed; the node is never committed.
    Failed(String),
}

/// Pending-add and pending-remove lists, each behind its own lock.
#[derive(Default)]
pub(crate) struct Staging {
    pending_add: Mutex<Vec<SceneNodeId>>,
    pending_remove: Mutex<Vec<SceneNodeId>>,
}

impl Staging {
    fn lock(list: &Mutex<Vec<SceneNodeId>>) -> MutexGuard<'_, Vec<SceneNodeId>> {
        list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stage_add(&self, id: SceneNodeId) {
        Self::lock(&self.pending_add).push(id);
    }

    pub(crate) fn stage_remove(&self, id: SceneNodeId) {
        Self::lock(&self.pending_remove).push(id);
    }

    pub(crate) fn take_adds(&self) -> Vec<SceneNodeId> {
        std::mem::take(&mut *Self::lock(&self.pending_add))
    }

    pub(crate) fn take_removes(&self) -> Vec<SceneNodeId> {
        std::mem::take(&mut *Self::lock(&self.pending_remove))
    }

    pub(crate) fn pending_adds(&self) -> usize {
        Self::lock(&self.pending_add).len()
    }

    pub(crate) fn pending_removes(&self) -> usize {
        Self::lock(&self.pending_remove).len()
    }
}

/// Behaviour slot of a node.
pub(crate) enum EntitySlot {
    /// Grouping node or scene root with no behaviour of its own.
    Empty,
    /// Behaviour lives in the node.
    Resident(Box<dyn Entity>),
    /// Behaviour is on the worker thread being initialized.
    Away,
}

/// A single node in the scene graph.
pub struct SceneNode {
    pub(crate) id: SceneNodeId,
    pub(crate) name: String,
    pub(crate) visible: bool,
    pub(crate) enabled: bool,
    pub(crate) initialized: Arc<AtomicBool>,
    pub(crate) parent: Option<SceneNodeId>,
    pub(crate) children: Vec<SceneNodeId>,
    pub(crate) staging: Staging,
    pub(crate) entity: EntitySlot,
    pub(crate) progress: ProgressReporter,
    /// Present on scene roots only.
    pub(crate) scheduler: Option<Scheduler>,
    pub(crate) state: NodeState,
}

impl SceneNode {
    pub(crate) fn new(id: SceneNodeId, name: impl Into<String>, entity: EntitySlot) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            enabled: true,
            initialized: Arc::new(AtomicBool::new(false)),
            parent: None,
            children: Vec::new(),
            staging: Staging::default(),
            entity,
            progress: ProgressReporter::new(),
            scheduler: None,
            state: NodeState::Detached,
        }
    }

    pub fn id(&self) -> SceneNodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<SceneNodeId> {
        self.parent
    }

    /// Committed children in update/draw order.
    pub fn children(&self) -> &[SceneNodeId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// One-way flag, set once initialization succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_scene_root(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("state", &self.state)
            .field("initialized", &self.is_initialized())
            .field("root", &self.is_scene_root())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_node_id_equality() {
        let a = SceneNodeId(1);
        let b = SceneNodeId(1);
        let c = SceneNodeId(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scene_node_new() {
        let node = SceneNode::new(SceneNodeId(0), "root", EntitySlot::Empty);
        assert_eq!(node.id(), SceneNodeId(0));
        assert_eq!(node.name(), "root");
        assert!(node.parent().is_none());
        assert!(node.children().is_empty());
        assert!(node.is_visible());
        assert!(node.is_enabled());
        assert!(!node.is_initialized());
        assert!(!node.is_scene_root());
        assert_eq!(node.state(), &NodeState::Detached);
    }

    #[test]
    fn test_staging_preserves_order() {
        let staging = Staging::default();
        staging.stage_add(SceneNodeId(3));
        staging.stage_add(SceneNodeId(1));
        staging.stage_remove(SceneNodeId(2));
        assert_eq!(staging.pending_adds(), 2);
        assert_eq!(staging.pending_removes(), 1);

        assert_eq!(staging.take_adds(), vec![SceneNodeId(3), SceneNodeId(1)]);
        assert_eq!(staging.take_removes(), vec![SceneNodeId(2)]);
        assert_eq!(staging.pending_adds(), 0);
        assert_eq!(staging.pending_removes(), 0);
    }

    #[test]
    fn test_initialized_is_shared() {
        let node = SceneNode::new(SceneNodeId(7), "lazy", EntitySlot::Away);
        let flag = node.initialized.clone();
        std::thread::spawn(move || flag.store(true, Ordering::SeqCst))
            .join()
            .unwrap();
        assert!(node.is_initialized());
    }
}
