//! Loading screen shown while a sibling initializes in the background

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::core::progress::ProgressReporter;
use crate::core::time::Tick;
use crate::core::types::Result;

use super::entity::{Entity, UpdateContext};
use super::graph::SceneGraph;
use super::node::SceneNodeId;

/// Width of the textual progress bar in characters
const BAR_WIDTH: usize = 20;

/// Progress bar entity. Removes itself from its parent once it saw 100.
pub struct LoadingProgress {
    percent: Arc<AtomicU8>,
    removal_requested: bool,
}

impl LoadingProgress {
    /// The entity plus the reporter that feeds it.
    pub fn new() -> (Self, ProgressReporter) {
        let percent = Arc::new(AtomicU8::new(0));
        let reporter = ProgressReporter::new();
        let sink = percent.clone();
        reporter.subscribe(move |value: u8| sink.store(value, Ordering::SeqCst));
        (
            Self {
                percent,
                removal_requested: false,
            },
            reporter,
        )
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    pub fn fraction(&self) -> f32 {
        self.percent() as f32 / 100.0
    }

    /// `[#####...............]  25%`
    pub fn bar(&self) -> String {
        let filled = (self.fraction() * BAR_WIDTH as f32).round() as usize;
        format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled.min(BAR_WIDTH)),
            ".".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
            self.percent()
        )
    }
}

impl Entity for LoadingProgress {
    fn name(&self) -> String {
        "LoadingProgress".to_string()
    }

    fn update(&mut self, ctx: &mut UpdateContext, _tick: &Tick) {
        if self.percent() == 100 && !self.removal_requested {
            self.removal_requested = true;
            ctx.remove_self();
            log::info!("Loading finished, removing loading screen {:?}", ctx.node());
        }
    }

    fn draw(&mut self, _tick: &Tick) {
        log::trace!("Loading {}", self.bar());
    }
}

/// Add a loading screen under `parent` and return the reporter driving it.
pub fn add_loading_screen(
    graph: &mut SceneGraph,
    parent: SceneNodeId,
) -> Result<(SceneNodeId, ProgressReporter)> {
    let (screen, reporter) = LoadingProgress::new();
    let id = graph.insert_initialized(screen);
    graph.add_async(parent, id)?;
    Ok((id, reporter))
}

/// Add `entity` under `parent` with a loading screen that follows its
/// initialization progress and disappears when it completes.
pub fn add_async_with_loading_screen(
    graph: &mut SceneGraph,
    parent: SceneNodeId,
    entity: impl Entity,
) -> Result<SceneNodeId> {
    let (screen, reporter) = add_loading_screen(graph, parent)?;
    let id = graph.insert(entity);
    graph.capture_initialize_progress(id, reporter)?;
    if let Err(err) = graph.add_async(parent, id) {
        graph.remove_async(parent, screen)?;
        return Err(err);
    }
    Ok(id)
}
