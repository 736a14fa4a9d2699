//! Frame-driven stepping through a mesh reveal

use std::sync::Arc;

use crate::core::time::Tick;
use crate::core::types::{Result, UVec3};
use crate::scene::{Entity, UpdateContext};

use super::revealer::{MeshRevealer, MeshSink};

/// Requests more cells from a [`MeshRevealer`] every tick.
///
/// Ticks where the revealer is still busy are skipped, so the visible pace
/// is bounded by extraction speed.
pub struct RevealStepper<S: MeshSink> {
    revealer: Arc<MeshRevealer<S>>,
    cells_per_tick: usize,
    paused: bool,
    /// Cells requested so far, may run past the candidate count
    requested: usize,
    highlighted: Option<UVec3>,
}

impl<S: MeshSink> RevealStepper<S> {
    pub fn new(revealer: Arc<MeshRevealer<S>>) -> Self {
        Self {
            revealer,
            cells_per_tick: 1,
            paused: false,
            requested: 0,
            highlighted: None,
        }
    }

    pub fn with_cells_per_tick(mut self, cells: usize) -> Self {
        self.cells_per_tick = cells.max(1);
        self
    }

    pub fn cells_per_tick(&self) -> usize {
        self.cells_per_tick
    }

    /// Double the pace
    pub fn faster(&mut self) {
        self.cells_per_tick = self.cells_per_tick.saturating_mul(2);
    }

    /// Halve the pace, never below one cell per tick
    pub fn slower(&mut self) {
        self.cells_per_tick = (self.cells_per_tick / 2).max(1);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Request a single cell regardless of pause. Returns whether a request
    /// was issued.
    pub fn step(&mut self) -> Result<bool> {
        if self.revealer.is_busy() || self.is_finished() {
            return Ok(false);
        }
        self.revealer.request(1)?;
        self.requested += 1;
        Ok(true)
    }

    /// All candidate cells have been requested
    pub fn is_finished(&self) -> bool {
        self.requested >= self.revealer.candidate_count()
    }

    pub fn requested_cells(&self) -> usize {
        self.requested
    }

    /// Cell that the next request starts at, as of the last draw
    pub fn highlighted(&self) -> Option<UVec3> {
        self.highlighted
    }

    pub fn revealer(&self) -> &Arc<MeshRevealer<S>> {
        &self.revealer
    }
}

impl<S: MeshSink> Entity for RevealStepper<S> {
    fn name(&self) -> String {
        "RevealStepper".to_string()
    }

    fn update(&mut self, _ctx: &mut UpdateContext, _tick: &Tick) {
        if self.paused || self.revealer.is_busy() || self.is_finished() {
            return;
        }
        match self.revealer.request(self.cells_per_tick) {
            Ok(()) => self.requested = self.requested.saturating_add(self.cells_per_tick),
            Err(err) => log::warn!("Reveal step skipped: {}", err),
        }
    }

    fn draw(&mut self, _tick: &Tick) {
        self.highlighted = self.revealer.cell_for_ordinal(self.requested);
    }
}
