//! Scene graph: an arena of nodes with deferred registration.
//!
//! Nodes are stored by [`SceneNodeId`]; each node records its parent id and
//! its committed children. Adding and removing children never touches the
//! committed list directly: requests land in the parent's staging lists and
//! are flushed at the start of the parent's next `update`.
//!
//! Nodes that are not initialized when added are shipped to the worker
//! thread of the nearest scene root above the parent. The root drains the
//! finished initializations once per tick, in submission order, and stages
//! them for addition. Entities that were already initialized are staged
//! immediately instead. The two kinds therefore form independently ordered
//! streams: order is guaranteed within each kind, not across them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::error::Error;
use crate::core::progress::ProgressReporter;
use crate::core::time::Tick;
use crate::core::types::Result;

use super::entity::{Entity, InitContext, SceneCommand, UpdateContext};
use super::node::{EntitySlot, NodeState, SceneNode, SceneNodeId};
use super::scheduler::{InitCompletion, InitJob, Scheduler};

/// Arena holding every node, attached or not.
pub struct SceneGraph {
    nodes: HashMap<SceneNodeId, SceneNode>,
    next_id: u64,
}

impl SceneGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 0,
        }
    }

    /// Allocate a fresh node ID.
    fn alloc_id(&mut self) -> SceneNodeId {
        let id = SceneNodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn node_mut(&mut self, id: SceneNodeId) -> Result<&mut SceneNode> {
        self.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))
    }

    // --- Construction ---

    /// Create a scene root: an initialized node owning its own worker thread.
    pub fn insert_root(&mut self, name: impl Into<String>) -> Result<SceneNodeId> {
        let id = self.alloc_id();
        let name = name.into();
        let scheduler = Scheduler::new(&format!("{}-init", name))?;

        let mut node = SceneNode::new(id, name, EntitySlot::Empty);
        node.scheduler = Some(scheduler);
        node.mark_initialized();
        log::debug!("Created scene root '{}' ({:?})", node.name, id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Create an initialized grouping node without behaviour.
    pub fn insert_group(&mut self, name: impl Into<String>) -> SceneNodeId {
        let id = self.alloc_id();
        let node = SceneNode::new(id, name, EntitySlot::Empty);
        node.mark_initialized();
        self.nodes.insert(id, node);
        id
    }

    /// Create a detached, not yet initialized node.
    pub fn insert(&mut self, entity: impl Entity) -> SceneNodeId {
        self.insert_boxed(Box::new(entity))
    }

    pub fn insert_boxed(&mut self, entity: Box<dyn Entity>) -> SceneNodeId {
        let id = self.alloc_id();
        let node = SceneNode::new(id, entity.name(), EntitySlot::Resident(entity));
        self.nodes.insert(id, node);
        id
    }

    /// Create a detached node whose entity needs no initialization.
    pub fn insert_initialized(&mut self, entity: impl Entity) -> SceneNodeId {
        let id = self.insert(entity);
        if let Some(node) = self.nodes.get(&id) {
            node.mark_initialized();
        }
        id
    }

    /// Run `initialize` on the calling thread. Children spawned by the
    /// entity are initialized the same way and staged beneath it.
    pub fn initialize(&mut self, id: SceneNodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.is_initialized() {
            return Ok(());
        }
        let mut entity = match std::mem::replace(&mut node.entity, EntitySlot::Empty) {
            EntitySlot::Resident(entity) => entity,
            EntitySlot::Empty => {
                node.mark_initialized();
                node.progress.set_progress(100)?;
                return Ok(());
            }
            EntitySlot::Away => {
                node.entity = EntitySlot::Away;
                return Err(Error::NodeAttached { node: id });
            }
        };

        let mut ctx = InitContext::new(id, node.progress.clone());
        let result = entity.initialize(&mut ctx);
        node.entity = EntitySlot::Resident(entity);
        result?;
        node.mark_initialized();
        ctx.progress().set_progress(100)?;

        for child in ctx.take_children() {
            let child_id = self.insert_boxed(child);
            self.initialize(child_id)?;
            self.add_async(id, child_id)?;
        }
        Ok(())
    }

    // --- Attach / detach ---

    /// Parent `child` under `parent`.
    ///
    /// The parent reference is set right away. An initialized child is
    /// staged for the next flush; otherwise it is initialized on the worker
    /// of the nearest scene root first. Fails without side effects if the
    /// child already has a parent.
    pub fn add_async(&mut self, parent: SceneNodeId, child: SceneNodeId) -> Result<()> {
        if !self.nodes.contains_key(&parent) {
            return Err(Error::UnknownNode(parent));
        }
        let node = self.nodes.get(&child).ok_or(Error::UnknownNode(child))?;
        if let Some(existing) = node.parent {
            log::warn!("Rejected add of {:?}: already parented to {:?}", child, existing);
            return Err(Error::AlreadyParented {
                node: child,
                parent: existing,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::WouldCycle { node: child, parent });
        }

        if node.is_initialized() {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent = Some(parent);
                node.state = NodeState::PendingAdd;
            }
            if let Some(parent_node) = self.nodes.get(&parent) {
                parent_node.staging.stage_add(child);
            }
            log::debug!("Staged {:?} for addition under {:?}", child, parent);
            return Ok(());
        }

        let root = self
            .find_scheduling_root(parent)
            .ok_or(Error::NoSchedulingRoot { node: child })?;

        let node = self.node_mut(child)?;
        let entity = match std::mem::replace(&mut node.entity, EntitySlot::Away) {
            EntitySlot::Resident(entity) => entity,
            other => {
                node.entity = other;
                return Err(Error::NodeAttached { node: child });
            }
        };
        node.parent = Some(parent);
        node.state = NodeState::Initializing;
        let job = InitJob {
            node: child,
            entity,
            ctx: InitContext::new(child, node.progress.clone()),
            initialized: node.initialized.clone(),
        };

        let submitted = match self.nodes.get(&root).and_then(|r| r.scheduler.as_ref()) {
            Some(scheduler) => scheduler.submit(job),
            None => Err(Error::NoSchedulingRoot { node: child }),
        };
        if let Err(err) = submitted {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.state = NodeState::Failed(err.to_string());
            }
            return Err(err);
        }
        log::debug!("Queued {:?} for background initialization on root {:?}", child, root);
        Ok(())
    }

    /// Stage `child` for removal from `parent` at the parent's next flush.
    pub fn remove_async(&mut self, parent: SceneNodeId, child: SceneNodeId) -> Result<()> {
        let parent_node = self.nodes.get(&parent).ok_or(Error::UnknownNode(parent))?;
        parent_node.staging.stage_remove(child);

        if let Some(node) = self.nodes.get_mut(&child) {
            if node.parent == Some(parent)
                && matches!(node.state, NodeState::Committed | NodeState::PendingAdd)
            {
                node.state = NodeState::PendingRemove;
            }
        }
        log::debug!("Staged {:?} for removal from {:?}", child, parent);
        Ok(())
    }

    /// Move a committed, initialized node to `new_parent` without waiting a
    /// tick between the removal and the add.
    pub fn change_parent(&mut self, node: SceneNodeId, new_parent: SceneNodeId) -> Result<()> {
        if !self.nodes.contains_key(&new_parent) {
            return Err(Error::UnknownNode(new_parent));
        }
        let current = self.nodes.get(&node).ok_or(Error::UnknownNode(node))?;
        if !current.is_initialized() {
            return Err(Error::NotInitialized { node });
        }
        let old_parent = current.parent.ok_or(Error::NotRegistered { node })?;
        if !self.is_registered(old_parent, node, false) {
            log::warn!("Rejected reparent of {:?}: not committed to {:?} yet", node, old_parent);
            return Err(Error::NotRegistered { node });
        }
        if old_parent == new_parent {
            return Ok(());
        }
        if self.is_ancestor_or_self(node, new_parent) {
            return Err(Error::WouldCycle { node, parent: new_parent });
        }

        // The old parent's flush only clears parent references that still point at it
        if let Some(old) = self.nodes.get(&old_parent) {
            old.staging.stage_remove(node);
        }
        if let Some(current) = self.nodes.get_mut(&node) {
            current.parent = None;
        }
        self.add_async(new_parent, node)
    }

    /// Drop a detached node together with its committed subtree.
    pub fn despawn(&mut self, id: SceneNodeId) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(Error::UnknownNode(id))?;
        if node.parent.is_some() || matches!(node.entity, EntitySlot::Away) {
            return Err(Error::NodeAttached { node: id });
        }
        self.despawn_subtree(id);
        Ok(())
    }

    fn despawn_subtree(&mut self, id: SceneNodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        let mut owned = node.children.clone();
        owned.extend(node.staging.take_adds());
        for child in owned {
            let still_ours = self.nodes.get(&child).is_some_and(|c| c.parent == Some(id));
            if still_ours {
                self.despawn_subtree(child);
            }
        }
        log::debug!("Despawned '{}' ({:?})", node.name, id);
    }

    // --- Queries ---

    /// Whether `node` is in the committed children of `parent` (or anywhere
    /// below it when `recursive`). Works on snapshots of the child lists.
    pub fn is_registered(&self, parent: SceneNodeId, node: SceneNodeId, recursive: bool) -> bool {
        let children = match self.nodes.get(&parent) {
            Some(p) => p.children.clone(),
            None => return false,
        };
        if children.contains(&node) {
            return true;
        }
        recursive && children.iter().any(|c| self.is_registered(*c, node, true))
    }

    /// Nearest scene root at or above `id`. Nested roots end the walk.
    pub fn find_scheduling_root(&self, id: SceneNodeId) -> Option<SceneNodeId> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.nodes.get(&cur)?;
            if node.is_scene_root() {
                return Some(cur);
            }
            current = node.parent;
        }
        None
    }

    /// True if `ancestor` is `node` or one of its parents.
    fn is_ancestor_or_self(&self, ancestor: SceneNodeId, node: SceneNodeId) -> bool {
        let mut current = Some(node);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.nodes.get(&cur).and_then(|n| n.parent);
        }
        false
    }

    pub fn get(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: SceneNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn parent(&self, id: SceneNodeId) -> Option<SceneNodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Committed children of a node.
    pub fn children(&self, id: SceneNodeId) -> Vec<SceneNodeId> {
        self.nodes.get(&id).map(|n| n.children.clone()).unwrap_or_default()
    }

    /// Adds and removes waiting for the node's next flush
    pub fn staged(&self, id: SceneNodeId) -> (usize, usize) {
        self.nodes
            .get(&id)
            .map(|n| (n.staging.pending_adds(), n.staging.pending_removes()))
            .unwrap_or_default()
    }

    pub fn state(&self, id: SceneNodeId) -> Option<NodeState> {
        self.nodes.get(&id).map(|n| n.state.clone())
    }

    pub fn is_initialized(&self, id: SceneNodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.is_initialized())
    }

    pub fn name(&self, id: SceneNodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name())
    }

    /// Total number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes whose background initialization failed.
    pub fn failed_nodes(&self) -> Vec<SceneNodeId> {
        let mut failed: Vec<_> = self
            .nodes
            .values()
            .filter(|n| matches!(n.state, NodeState::Failed(_)))
            .map(|n| n.id)
            .collect();
        failed.sort();
        failed
    }

    pub fn set_visible(&mut self, id: SceneNodeId, visible: bool) -> Result<()> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: SceneNodeId, enabled: bool) -> Result<()> {
        self.node_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Forward the initialize progress of `id` into `reporter`.
    pub fn capture_initialize_progress(
        &self,
        id: SceneNodeId,
        reporter: ProgressReporter,
    ) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(Error::UnknownNode(id))?;
        node.progress.forward_to(reporter);
        Ok(())
    }

    /// Background initializations queued or running on all roots.
    pub fn pending_initializations(&self) -> usize {
        self.nodes
            .values()
            .filter_map(|n| n.scheduler.as_ref())
            .map(|s| s.in_flight())
            .sum()
    }

    /// Block until every root worker is idle or `timeout` passes.
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self
                .nodes
                .values()
                .filter_map(|n| n.scheduler.as_ref())
                .all(|s| s.is_idle());
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // --- Frame loop ---

    /// Per-frame update of `id` and its enabled committed children.
    ///
    /// Order per node: drain finished initializations (scene roots), run the
    /// entity's own update, flush staged adds then removes, recurse.
    pub fn update(&mut self, id: SceneNodeId, tick: &Tick) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if !node.enabled {
            return;
        }
        if node.is_scene_root() {
            self.drain_initialized(id);
        }
        self.update_entity(id, tick);
        self.flush(id);

        for child in self.children(id) {
            let enabled = self.nodes.get(&child).is_some_and(|c| c.enabled);
            if enabled {
                self.update(child, tick);
            }
        }
    }

    /// Draw `id` and then its visible committed children.
    pub fn draw(&mut self, id: SceneNodeId, tick: &Tick) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if !node.visible {
            return;
        }
        if let EntitySlot::Resident(entity) = &mut node.entity {
            entity.draw(tick);
        }

        for child in self.children(id) {
            let visible = self.nodes.get(&child).is_some_and(|c| c.visible);
            if visible {
                self.draw(child, tick);
            }
        }
    }

    /// Stage every initialization the root's worker finished since last tick.
    fn drain_initialized(&mut self, root: SceneNodeId) {
        let completions = match self.nodes.get_mut(&root).and_then(|n| n.scheduler.as_mut()) {
            Some(scheduler) => scheduler.drain(),
            None => return,
        };

        for InitCompletion { job, outcome } in completions {
            let InitJob {
                node: id,
                entity,
                mut ctx,
                ..
            } = job;
            let Some(node) = self.nodes.get_mut(&id) else {
                log::warn!("Initialized node {:?} no longer exists", id);
                continue;
            };
            node.entity = EntitySlot::Resident(entity);

            if let Err(err) = outcome {
                let reason = Error::Initialization {
                    node: id,
                    reason: err.to_string(),
                };
                log::error!("{} ('{}')", reason, node.name);
                node.state = NodeState::Failed(err.to_string());
                continue;
            }

            // Removed and re-added elsewhere while the worker ran: already staged
            if node.state != NodeState::Initializing {
                log::debug!("Initialized {:?}, left as {:?}", id, node.state);
            } else {
                match node.parent {
                    Some(parent) => {
                        node.state = NodeState::PendingAdd;
                        if let Some(parent_node) = self.nodes.get(&parent) {
                            parent_node.staging.stage_add(id);
                        }
                        log::debug!("Initialized {:?}, staged under {:?}", id, parent);
                    }
                    None => node.state = NodeState::Detached,
                }
            }

            for child in ctx.take_children() {
                let child_id = self.insert_boxed(child);
                if let Err(err) = self.add_async(id, child_id) {
                    log::warn!("Could not add child spawned by {:?}: {}", id, err);
                }
            }
        }
    }

    fn update_entity(&mut self, id: SceneNodeId, tick: &Tick) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let mut entity = match std::mem::replace(&mut node.entity, EntitySlot::Empty) {
            EntitySlot::Resident(entity) => entity,
            other => {
                node.entity = other;
                return;
            }
        };

        let mut ctx = UpdateContext::new(id, node.parent);
        entity.update(&mut ctx, tick);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.entity = EntitySlot::Resident(entity);
        }
        self.apply_commands(id, ctx.into_commands());
    }

    fn apply_commands(&mut self, id: SceneNodeId, commands: Vec<SceneCommand>) {
        for command in commands {
            let result = match command {
                SceneCommand::AddChild(entity) => {
                    let child = self.insert_boxed(entity);
                    self.add_async(id, child)
                }
                SceneCommand::RemoveChild(child) => self.remove_async(id, child),
                SceneCommand::RemoveSelf => match self.parent(id) {
                    Some(parent) => self.remove_async(parent, id),
                    None => Ok(()),
                },
            };
            if let Err(err) = result {
                log::warn!("Scene command from {:?} rejected: {}", id, err);
            }
        }
    }

    /// Move staged adds into the committed list, then apply staged removes.
    fn flush(&mut self, id: SceneNodeId) {
        let (added, removed) = match self.nodes.get(&id) {
            Some(node) => (node.staging.take_adds(), node.staging.take_removes()),
            None => return,
        };
        if added.is_empty() && removed.is_empty() {
            return;
        }

        let mut committed = Vec::with_capacity(added.len());
        for child in added {
            if let Some(node) = self.nodes.get_mut(&child) {
                if node.parent == Some(id) {
                    if node.state == NodeState::PendingAdd {
                        node.state = NodeState::Committed;
                    }
                    committed.push(child);
                }
            }
        }

        let mut detached = Vec::new();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children.extend(committed.iter().copied());
            for child in &removed {
                if let Some(pos) = node.children.iter().position(|c| c == child) {
                    node.children.remove(pos);
                }
            }
        }
        for child in &removed {
            if let Some(node) = self.nodes.get_mut(child) {
                if node.parent == Some(id) {
                    node.parent = None;
                    node.state = NodeState::Detached;
                    detached.push(*child);
                }
            }
        }

        log::debug!(
            "Flushed {:?}: +{} committed, -{} detached",
            id,
            committed.len(),
            detached.len()
        );
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
