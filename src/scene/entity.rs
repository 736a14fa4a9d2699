//! Behaviour attached to scene nodes.

use crate::core::progress::ProgressReporter;
use crate::core::time::Tick;
use crate::core::types::Result;

use super::node::SceneNodeId;

/// Per-node behaviour with an initialize/update/draw lifecycle.
///
/// `initialize` may be slow: when a node is added before it is initialized,
/// the call runs on the worker thread of the nearest scene root.
pub trait Entity: Send + 'static {
    /// Display name, the short type name unless overridden.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    fn initialize(&mut self, _ctx: &mut InitContext) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut UpdateContext, _tick: &Tick) {}

    fn draw(&mut self, _tick: &Tick) {}
}

/// `a::b::Foo<c::Bar>` -> `Foo<c::Bar>`
pub(crate) fn short_type_name(full: &str) -> String {
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    full[start..].to_string()
}

/// Handed to [`Entity::initialize`].
pub struct InitContext {
    node: SceneNodeId,
    progress: ProgressReporter,
    children: Vec<Box<dyn Entity>>,
}

impl InitContext {
    pub(crate) fn new(node: SceneNodeId, progress: ProgressReporter) -> Self {
        Self {
            node,
            progress,
            children: Vec::new(),
        }
    }

    /// Node being initialized
    pub fn node(&self) -> SceneNodeId {
        self.node
    }

    /// Report initialization progress (0-100) to observers of this node.
    pub fn report_progress(&self, progress: i32) -> Result<()> {
        self.progress.set_progress(progress)
    }

    /// Spawn a child that is added beneath this node once it is initialized.
    pub fn add_child(&mut self, child: impl Entity) {
        self.children.push(Box::new(child));
    }

    pub(crate) fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub(crate) fn take_children(&mut self) -> Vec<Box<dyn Entity>> {
        std::mem::take(&mut self.children)
    }
}

/// Graph change requested by an entity during its update.
pub(crate) enum SceneCommand {
    AddChild(Box<dyn Entity>),
    RemoveChild(SceneNodeId),
    RemoveSelf,
}

/// Handed to [`Entity::update`]. Requests are applied once the update returns.
pub struct UpdateContext {
    node: SceneNodeId,
    parent: Option<SceneNodeId>,
    commands: Vec<SceneCommand>,
}

impl UpdateContext {
    pub(crate) fn new(node: SceneNodeId, parent: Option<SceneNodeId>) -> Self {
        Self {
            node,
            parent,
            commands: Vec::new(),
        }
    }

    /// Node being updated
    pub fn node(&self) -> SceneNodeId {
        self.node
    }

    pub fn parent(&self) -> Option<SceneNodeId> {
        self.parent
    }

    /// Add a new child beneath this node (deferred like any add).
    pub fn add_child(&mut self, child: impl Entity) {
        self.commands.push(SceneCommand::AddChild(Box::new(child)));
    }

    /// Schedule removal of a committed child.
    pub fn remove_child(&mut self, child: SceneNodeId) {
        self.commands.push(SceneCommand::RemoveChild(child));
    }

    /// Schedule removal of this node from its parent.
    pub fn remove_self(&mut self) {
        self.commands.push(SceneCommand::RemoveSelf);
    }

    pub(crate) fn into_commands(self) -> Vec<SceneCommand> {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    impl Entity for Probe {}

    #[test]
    fn test_default_name_is_short_type_name() {
        assert_eq!(Probe.name(), "Probe");
    }

    #[test]
    fn test_short_type_name_keeps_generics() {
        assert_eq!(short_type_name("a::b::Foo<c::Bar>"), "Foo<c::Bar>");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_update_context_collects_commands() {
        let mut ctx = UpdateContext::new(SceneNodeId(2), Some(SceneNodeId(1)));
        ctx.add_child(Probe);
        ctx.remove_child(SceneNodeId(5));
        ctx.remove_self();

        assert_eq!(ctx.node(), SceneNodeId(2));
        assert_eq!(ctx.parent(), Some(SceneNodeId(1)));
        let commands = ctx.into_commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[1], SceneCommand::RemoveChild(SceneNodeId(5))));
        assert!(matches!(commands[2], SceneCommand::RemoveSelf));
    }

    #[test]
    fn test_init_context_progress_and_children() {
        let progress = ProgressReporter::new();
        let mut ctx = InitContext::new(SceneNodeId(4), progress.clone());
        ctx.report_progress(40).unwrap();
        ctx.add_child(Probe);

        assert_eq!(progress.value(), 40);
        assert_eq!(ctx.take_children().len(), 1);
        assert!(ctx.take_children().is_empty());
    }
}
